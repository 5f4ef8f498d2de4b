//! Outbound mail.

pub mod smtp;

pub use smtp::SmtpMailer;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::SmtpConfig;
use crate::error::MailError;

/// A fully composed message ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

/// Anything that can deliver an [`OutgoingMail`].
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// Create the SMTP transport, or `None` when SMTP is not configured.
pub fn create_mailer(config: Option<&SmtpConfig>) -> Result<Option<Arc<dyn MailTransport>>, MailError> {
    let Some(config) = config else {
        tracing::warn!("SMTP_HOST not set; contact submissions will be refused");
        return Ok(None);
    };

    let mailer = SmtpMailer::new(config)?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        secure = config.secure,
        "SMTP transport configured"
    );
    Ok(Some(Arc::new(mailer)))
}
