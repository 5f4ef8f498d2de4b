//! Error types for the relay.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Failures of the generative-language upstream.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The provider answered with a non-2xx status.
    #[error("Upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Upstream request failed: {0}")]
    Transport(String),

    #[error("Invalid response from upstream: {0}")]
    Decode(String),

    #[error("Upstream client could not be built: {0}")]
    Client(String),
}

/// Outbound mail errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Invalid mail configuration: {0}")]
    Config(String),

    #[error("Invalid address {address}: {reason}")]
    Address { address: String, reason: String },

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("SMTP send failed: {0}")]
    SendFailed(String),
}

/// Inbound chat request rejections.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Request body must be a JSON object")]
    InvalidBody,

    #[error("Request must include \"prompt\" (string)")]
    MissingPrompt,

    #[error("Prompt must not be empty")]
    EmptyPrompt,

    #[error("\"system\" must be a string")]
    InvalidSystem,
}

impl ValidationError {
    /// Machine-readable reason sent alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidBody => "invalid_body",
            Self::MissingPrompt => "missing_prompt",
            Self::EmptyPrompt => "empty_prompt",
            Self::InvalidSystem => "invalid_system",
        }
    }
}

/// Errors surfaced by the chat endpoint, rendered as `{ error, ... }` JSON.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Not found")]
    NotFound,

    #[error("Server not configured: {0}")]
    Misconfigured(String),

    #[error("Upstream error {status}: {details}")]
    Upstream { status: StatusCode, details: String },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64 },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(reason) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Bad Request",
                    "code": reason.code(),
                    "details": reason.to_string(),
                })),
            )
                .into_response(),
            ApiError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                [(header::ALLOW, HeaderValue::from_static("POST"))],
                Json(json!({ "error": "Method Not Allowed" })),
            )
                .into_response(),
            ApiError::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": "Not Found" }))).into_response()
            }
            ApiError::Misconfigured(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Server configuration error",
                    "message": message,
                })),
            )
                .into_response(),
            ApiError::Upstream { status, details } => (
                status,
                Json(json!({
                    "error": "Upstream API error",
                    "status": status.as_u16(),
                    "details": details,
                })),
            )
                .into_response(),
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Internal Server Error",
                    "message": message,
                })),
            )
                .into_response(),
            ApiError::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, HeaderValue::from(retry_after_secs))],
                Json(json!({ "error": "Too many requests, slow down" })),
            )
                .into_response(),
        }
    }
}

/// Errors surfaced by the contact endpoint, rendered as `{ success: false, error }`.
#[derive(Debug, thiserror::Error)]
pub enum ContactError {
    #[error("Invalid input: {}", .fields.join(", "))]
    Invalid { fields: Vec<&'static str> },

    #[error("Mail transport not configured")]
    NotConfigured,

    #[error("Failed to send: {0}")]
    SendFailed(#[from] MailError),
}

impl IntoResponse for ContactError {
    fn into_response(self) -> Response {
        match self {
            ContactError::Invalid { fields } => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "success": false,
                    "error": "Invalid input",
                    "fields": fields,
                })),
            )
                .into_response(),
            ContactError::NotConfigured => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": "Mail transport not configured",
                })),
            )
                .into_response(),
            // The transport detail stays in the logs.
            ContactError::SendFailed(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "Failed to send" })),
            )
                .into_response(),
        }
    }
}
