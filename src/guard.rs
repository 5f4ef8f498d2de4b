//! Inbound request validation.
//!
//! Everything here runs before any collaborator is contacted; a rejection
//! means the upstream and the mail transport are never called.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::ValidationError;

/// Contact messages longer than this are rejected.
pub const MAX_CONTACT_MESSAGE_CHARS: usize = 2000;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

/// A validated chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    /// Trimmed and capped prompt text.
    pub prompt: String,
    /// Caller-supplied replacement for the persona.
    pub system_override: Option<String>,
}

/// Validate a chat body of the form `{ prompt }` or `{ message, system? }`.
pub fn parse_chat_request(body: &Value, max_chars: usize) -> Result<ChatRequest, ValidationError> {
    let object = body.as_object().ok_or(ValidationError::InvalidBody)?;

    let raw = object
        .get("prompt")
        .filter(|v| !v.is_null())
        .or_else(|| object.get("message"))
        .and_then(Value::as_str)
        .ok_or(ValidationError::MissingPrompt)?;

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyPrompt);
    }

    let system_override = match object.get("system") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.trim()).filter(|s| !s.is_empty()).map(str::to_string),
        Some(_) => return Err(ValidationError::InvalidSystem),
    };

    Ok(ChatRequest {
        prompt: truncate_chars(trimmed, max_chars),
        system_override,
    })
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].trim_end().to_string(),
        None => text.to_string(),
    }
}

/// A validated contact-form submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactSubmission {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub message: String,
}

/// Validate a contact body. On failure, returns every offending field.
pub fn parse_contact_submission(body: &Value) -> Result<ContactSubmission, Vec<&'static str>> {
    let Some(object) = body.as_object() else {
        return Err(vec!["name", "email", "phone", "message"]);
    };

    // Values are kept as submitted; only the checks look at the trimmed form.
    let text = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let name = text("name");
    let email = text("email");
    let message = text("message");
    // Forms sometimes post the phone as a number.
    let phone = match object.get("phone") {
        Some(Value::Number(n)) => n.to_string(),
        _ => text("phone"),
    };

    let mut invalid = Vec::new();
    if name.trim().is_empty() {
        invalid.push("name");
    }
    if !is_valid_email(email.trim()) {
        invalid.push("email");
    }
    if !is_valid_phone(&phone) {
        invalid.push("phone");
    }
    let trimmed_message = message.trim();
    if trimmed_message.is_empty() || trimmed_message.chars().count() > MAX_CONTACT_MESSAGE_CHARS {
        invalid.push("message");
    }

    if invalid.is_empty() {
        Ok(ContactSubmission {
            name,
            email,
            phone,
            message,
        })
    } else {
        Err(invalid)
    }
}

/// Permissive `local@domain.tld` shape check.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// 7 to 15 digits once everything else is stripped.
pub fn is_valid_phone(phone: &str) -> bool {
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    (7..=15).contains(&digits)
}
