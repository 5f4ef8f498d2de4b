//! Contact-form relay: validate a submission and mail it to the site owner.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info};

use crate::error::ContactError;
use crate::guard::{ContactSubmission, parse_contact_submission};
use crate::mail::{MailTransport, OutgoingMail};

pub struct ContactRelay {
    mailer: Option<Arc<dyn MailTransport>>,
    recipient: Option<String>,
}

impl ContactRelay {
    pub fn new(mailer: Option<Arc<dyn MailTransport>>, recipient: Option<String>) -> Self {
        Self { mailer, recipient }
    }

    pub fn is_configured(&self) -> bool {
        self.mailer.is_some() && self.recipient.is_some()
    }

    pub async fn handle(&self, body: &Value) -> Result<(), ContactError> {
        let submission =
            parse_contact_submission(body).map_err(|fields| ContactError::Invalid { fields })?;

        let (Some(mailer), Some(recipient)) = (&self.mailer, &self.recipient) else {
            error!("SMTP not configured; refusing contact submission");
            return Err(ContactError::NotConfigured);
        };

        let mail = compose(&submission, recipient);
        mailer.send(&mail).await.map_err(|e| {
            error!(error = %e, "sendMail failed");
            ContactError::SendFailed(e)
        })?;

        info!(from = %submission.email, "Contact submission relayed");
        Ok(())
    }
}

/// Build the owner notification for a submission.
pub fn compose(submission: &ContactSubmission, recipient: &str) -> OutgoingMail {
    let ContactSubmission {
        name,
        email,
        phone,
        message,
    } = submission;

    let text_body =
        format!("Name: {name}\nEmail: {email}\nPhone: {phone}\n\nMessage:\n{message}");

    let html_message = escape_html(message)
        .replace("\r\n", "\n")
        .replace('\n', "<br/>");
    let html_body = format!(
        "<p><strong>Name:</strong> {}</p><p><strong>Email:</strong> {}</p>\
         <p><strong>Phone:</strong> {}</p><p><strong>Message:</strong></p><p>{}</p>",
        escape_html(name),
        escape_html(email),
        escape_html(phone),
        html_message
    );

    OutgoingMail {
        to: recipient.to_string(),
        reply_to: Some(email.trim().to_string()),
        subject: format!("Website contact from {}", name.trim()),
        text_body,
        html_body,
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::error::MailError;

    /// Mail double that records deliveries, optionally failing.
    #[derive(Default)]
    struct RecordingMailer {
        fail: bool,
        sent: Mutex<Vec<OutgoingMail>>,
    }

    #[async_trait]
    impl MailTransport for RecordingMailer {
        async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
            if self.fail {
                return Err(MailError::SendFailed("421 service not available".into()));
            }
            self.sent.lock().unwrap().push(mail.clone());
            Ok(())
        }
    }

    fn relay(mailer: &Arc<RecordingMailer>) -> ContactRelay {
        let transport: Arc<dyn MailTransport> = mailer.clone();
        ContactRelay::new(Some(transport), Some("owner@example.com".into()))
    }

    fn valid_body() -> Value {
        json!({
            "name": "A",
            "email": "a@b.com",
            "phone": "555-123-4567",
            "message": "hi"
        })
    }

    #[tokio::test]
    async fn valid_submission_reaches_mailer() {
        let mailer = Arc::new(RecordingMailer::default());
        relay(&mailer).handle(&valid_body()).await.unwrap();

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "owner@example.com");
        assert_eq!(sent[0].subject, "Website contact from A");
        assert_eq!(sent[0].reply_to.as_deref(), Some("a@b.com"));
    }

    #[tokio::test]
    async fn invalid_submission_never_reaches_mailer() {
        let mailer = Arc::new(RecordingMailer::default());
        let err = relay(&mailer)
            .handle(&json!({
                "name": "A",
                "email": "not-an-email",
                "phone": "12345",
                "message": "hi"
            }))
            .await
            .unwrap_err();

        assert!(matches!(err, ContactError::Invalid { ref fields } if fields == &["email", "phone"]));
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_is_reported() {
        let mailer = Arc::new(RecordingMailer {
            fail: true,
            ..RecordingMailer::default()
        });
        let err = relay(&mailer).handle(&valid_body()).await.unwrap_err();
        assert!(matches!(err, ContactError::SendFailed(_)));
    }

    #[tokio::test]
    async fn missing_transport_is_not_configured() {
        let relay = ContactRelay::new(None, None);
        assert!(!relay.is_configured());
        let err = relay.handle(&valid_body()).await.unwrap_err();
        assert!(matches!(err, ContactError::NotConfigured));
    }

    #[tokio::test]
    async fn mail_bodies_carry_fields_verbatim() {
        let mailer = Arc::new(RecordingMailer::default());
        relay(&mailer)
            .handle(&json!({
                "name": " A ",
                "email": " a@b.com ",
                "phone": "555-123-4567",
                "message": "  hi\n"
            }))
            .await
            .unwrap();

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(
            sent[0].text_body,
            "Name:  A \nEmail:  a@b.com \nPhone: 555-123-4567\n\nMessage:\n  hi\n"
        );
        assert_eq!(sent[0].reply_to.as_deref(), Some("a@b.com"));
    }

    #[test]
    fn compose_includes_every_field() {
        let submission = ContactSubmission {
            name: "Jane Doe".into(),
            email: "jane@client.org".into(),
            phone: "+1 555 123 4567".into(),
            message: "Line one\nLine two".into(),
        };
        let mail = compose(&submission, "owner@example.com");

        assert_eq!(
            mail.text_body,
            "Name: Jane Doe\nEmail: jane@client.org\nPhone: +1 555 123 4567\n\nMessage:\nLine one\nLine two"
        );
        assert!(mail.html_body.contains("<strong>Name:</strong> Jane Doe"));
        assert!(mail.html_body.contains("<strong>Phone:</strong> +1 555 123 4567"));
        assert!(mail.html_body.contains("<p>Line one<br/>Line two</p>"));
    }

    #[test]
    fn compose_escapes_markup_in_html_body() {
        let submission = ContactSubmission {
            name: "<b>Eve</b>".into(),
            email: "eve@x.io".into(),
            phone: "5551234567".into(),
            message: "<script>alert(1)</script> & more".into(),
        };
        let mail = compose(&submission, "owner@example.com");

        assert!(mail.html_body.contains("&lt;b&gt;Eve&lt;/b&gt;"));
        assert!(mail.html_body.contains("&lt;script&gt;alert(1)&lt;/script&gt; &amp; more"));
        assert!(!mail.html_body.contains("<script>"));
        assert!(mail.text_body.contains("<script>alert(1)</script> & more"));
    }
}
