//! SMTP delivery via lettre.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use super::{MailTransport, OutgoingMail};
use crate::config::SmtpConfig;
use crate::error::MailError;

/// SMTP transport built once at start-up.
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let from = parse_mailbox(&config.from_address)?;

        let builder = if config.secure {
            SmtpTransport::relay(&config.host)
        } else {
            SmtpTransport::starttls_relay(&config.host)
        }
        .map_err(|e| MailError::Config(format!("SMTP relay error: {e}")))?
        .port(config.port);

        let builder = if config.username.is_empty() {
            builder
        } else {
            builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.expose_secret().to_string(),
            ))
        };

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let message = build_message(&self.from, mail)?;
        let transport = self.transport.clone();

        // lettre's SmtpTransport is blocking.
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| MailError::SendFailed(format!("send task failed: {e}")))?
            .map_err(|e| MailError::SendFailed(e.to_string()))?;

        tracing::info!(to = %mail.to, subject = %mail.subject, "Email sent");
        Ok(())
    }
}

/// Build a multipart/alternative message with text and HTML bodies.
pub fn build_message(from: &Mailbox, mail: &OutgoingMail) -> Result<Message, MailError> {
    let mut builder = Message::builder()
        .from(from.clone())
        .to(parse_mailbox(&mail.to)?)
        .subject(mail.subject.as_str());

    if let Some(reply_to) = &mail.reply_to {
        match reply_to.parse::<Mailbox>() {
            Ok(mailbox) => builder = builder.reply_to(mailbox),
            Err(e) => tracing::debug!(reply_to = %reply_to, error = %e, "Skipping unparsable Reply-To"),
        }
    }

    builder
        .multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(mail.text_body.clone()),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(mail.html_body.clone()),
                ),
        )
        .map_err(|e| MailError::Build(e.to_string()))
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|e: lettre::address::AddressError| MailError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn sample_mail() -> OutgoingMail {
        OutgoingMail {
            to: "owner@example.com".into(),
            reply_to: Some("jane@client.org".into()),
            subject: "Website contact from Jane".into(),
            text_body: "Name: Jane".into(),
            html_body: "<p><strong>Name:</strong> Jane</p>".into(),
        }
    }

    fn from() -> Mailbox {
        "site@example.com".parse().unwrap()
    }

    #[test]
    fn message_carries_headers_and_both_bodies() {
        let message = build_message(&from(), &sample_mail()).unwrap();
        let formatted = String::from_utf8(message.formatted()).unwrap();

        assert!(formatted.contains("To: owner@example.com"));
        assert!(formatted.contains("Reply-To: jane@client.org"));
        assert!(formatted.contains("Subject: Website contact from Jane"));
        assert!(formatted.contains("multipart/alternative"));
        assert!(formatted.contains("text/plain"));
        assert!(formatted.contains("text/html"));
    }

    #[test]
    fn unparsable_reply_to_is_skipped() {
        let mail = OutgoingMail {
            reply_to: Some("not an address".into()),
            ..sample_mail()
        };
        let message = build_message(&from(), &mail).unwrap();
        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(!formatted.contains("Reply-To"));
    }

    #[test]
    fn invalid_recipient_is_an_address_error() {
        let mail = OutgoingMail {
            to: "nobody".into(),
            ..sample_mail()
        };
        assert!(matches!(
            build_message(&from(), &mail),
            Err(MailError::Address { .. })
        ));
    }

    #[test]
    fn mailer_rejects_bad_sender() {
        let config = SmtpConfig {
            host: "smtp.example.com".into(),
            port: 587,
            secure: false,
            username: String::new(),
            password: SecretString::from(String::new()),
            from_address: "not-an-address".into(),
        };
        assert!(matches!(
            SmtpMailer::new(&config),
            Err(MailError::Address { .. })
        ));
    }
}
