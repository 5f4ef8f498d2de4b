//! HTTP surface: router, CORS, method and path fallbacks, health check.

pub mod chat;
pub mod contact;
pub mod rate_limit;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, Method, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::chat::ChatRelay;
use crate::config::{CorsOrigins, RelayConfig};
use crate::contact::ContactRelay;
use crate::error::ApiError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatRelay>,
    pub contact: Arc<ContactRelay>,
}

/// Build the relay router: chat and contact routes behind the rate limiter,
/// plus health and fallbacks, all wrapped in tracing and CORS.
pub fn relay_routes(state: AppState, config: &RelayConfig) -> Router {
    let rate_limit = rate_limit::IpRateLimit::new(&config.rate_limit);
    // Outside a runtime (e.g. building the router in a plain test) there is
    // nothing to prune yet.
    if tokio::runtime::Handle::try_current().is_ok() {
        rate_limit::spawn_limiter_cleanup(&rate_limit.limiter, config.rate_limit.window);
    }

    let relay = Router::new()
        .route(
            &config.chat_path,
            post(chat::relay_chat).fallback(method_not_allowed),
        )
        .route(
            "/send",
            post(contact::send_contact).fallback(method_not_allowed),
        )
        .route_layer(middleware::from_fn_with_state(
            rate_limit,
            rate_limit::ip_rate_limit,
        ));

    Router::new()
        .merge(relay)
        .route("/health", get(health))
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config.cors_origins)),
        )
        .with_state(state)
}

/// CORS policy. OPTIONS requests are answered here, before routing.
pub fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    let allow_origin = match origins {
        CorsOrigins::Any => AllowOrigin::any(),
        CorsOrigins::List(list) => {
            let list = list.clone();
            AllowOrigin::predicate(move |origin: &HeaderValue, _| {
                origin
                    .to_str()
                    .map(|origin| is_origin_allowed(&list, origin))
                    .unwrap_or(false)
            })
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// Local development hosts on any port, or an exact allow-list match.
pub fn is_origin_allowed(allowed: &[String], origin: &str) -> bool {
    is_local_origin(origin) || allowed.iter().any(|o| o.eq_ignore_ascii_case(origin))
}

fn is_local_origin(origin: &str) -> bool {
    let Some((scheme, rest)) = origin.split_once("://") else {
        return false;
    };
    if scheme != "http" && scheme != "https" {
        return false;
    }
    let host = rest.split(['/', ':']).next().unwrap_or_default();
    host.eq_ignore_ascii_case("localhost") || host == "127.0.0.1"
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "chat-relay",
        "chat_configured": state.chat.is_configured(),
        "mail_configured": state.contact.is_configured(),
    }))
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}
