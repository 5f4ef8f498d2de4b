use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use chat_relay::api::{AppState, relay_routes};
use chat_relay::chat::ChatRelay;
use chat_relay::config::RelayConfig;
use chat_relay::contact::ContactRelay;
use chat_relay::llm::create_upstream;
use chat_relay::mail::create_mailer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // A missing .env file is fine; the process environment still applies.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded .env");
    }

    let config = RelayConfig::from_env().context("invalid configuration")?;

    let upstream = create_upstream(&config.upstream).context("failed to create Gemini client")?;
    let mailer = create_mailer(config.smtp.as_ref()).context("failed to create SMTP transport")?;

    let state = AppState {
        chat: Arc::new(ChatRelay::new(upstream, config.chat.clone())),
        contact: Arc::new(ContactRelay::new(
            mailer,
            config.contact_recipient.clone(),
        )),
    };

    eprintln!("💬 Chat Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Chat:    POST http://0.0.0.0:{}{}", config.port, config.chat_path);
    eprintln!("   Contact: POST http://0.0.0.0:{}/send", config.port);
    eprintln!("   Model:   {}", config.upstream.model);
    eprintln!(
        "   Rate limit: {} requests / {}s per IP{}\n",
        config.rate_limit.max_requests,
        config.rate_limit.window.as_secs(),
        if config.rate_limit.trust_forwarded { " (X-Forwarded-For trusted)" } else { "" }
    );

    let app = relay_routes(state, &config);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Chat relay listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
