//! Gemini `generateContent` client and wire types.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::HeaderValue;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::ChatUpstream;
use crate::config::UpstreamConfig;
use crate::error::UpstreamError;

const API_KEY_HEADER: &str = "x-goog-api-key";
const FALLBACK_ERROR_MESSAGE: &str = "Unable to generate response";
const REDACTED: &str = "[REDACTED]";

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

/// Sampling parameters, fixed per deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 512,
            top_p: Some(0.95),
            top_k: Some(40),
        }
    }
}

impl GenerateContentRequest {
    /// One user content entry holding the prompt, with the instruction
    /// folded in front of it when present.
    pub fn from_prompt(
        prompt: &str,
        system_instruction: Option<&str>,
        generation: &GenerationConfig,
    ) -> Self {
        let text = match system_instruction {
            Some(instruction) => format!("{instruction}\n\nUser: {prompt}"),
            None => prompt.to_string(),
        };

        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part { text }],
            }],
            generation_config: generation.clone(),
        }
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// HTTP client for one Gemini model.
pub struct GeminiClient {
    http: Client,
    endpoint: String,
    model: String,
    api_key: SecretString,
    api_key_header: HeaderValue,
}

impl GeminiClient {
    pub fn new(config: &UpstreamConfig, api_key: &SecretString) -> Result<Self, UpstreamError> {
        let mut api_key_header = HeaderValue::from_str(api_key.expose_secret())
            .map_err(|_| UpstreamError::Client("API key is not a valid header value".into()))?;
        api_key_header.set_sensitive(true);

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| UpstreamError::Client(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: config.endpoint(),
            model: config.model.clone(),
            api_key: SecretString::from(api_key.expose_secret().to_string()),
            api_key_header,
        })
    }

    /// Replace any occurrence of the API key in `message`.
    fn scrub(&self, message: String) -> String {
        let key = self.api_key.expose_secret();
        if key.is_empty() || !message.contains(key) {
            message
        } else {
            message.replace(key, REDACTED)
        }
    }
}

#[async_trait]
impl ChatUpstream for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<Value, UpstreamError> {
        debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            "Sending request to Gemini API"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .header(API_KEY_HEADER, self.api_key_header.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(self.scrub(e.without_url().to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = self.scrub(provider_error_message(&raw));
            warn!(
                status = status.as_u16(),
                model = %self.model,
                error = %message,
                "Gemini API error"
            );
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| UpstreamError::Decode(self.scrub(e.without_url().to_string())))
    }
}

/// `error.message` from a provider error body, or a generic message.
pub fn provider_error_message(raw: &str) -> String {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|body| {
            body.pointer("/error/message")
                .and_then(Value::as_str)
                .filter(|m| !m.trim().is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| FALLBACK_ERROR_MESSAGE.to_string())
}
