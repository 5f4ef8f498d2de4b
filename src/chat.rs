//! The chat relay pipeline: validate, call the upstream, map the result.

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::{ChatConfig, UpstreamStatusPolicy};
use crate::error::{ApiError, UpstreamError};
use crate::guard::parse_chat_request;
use crate::llm::{ChatUpstream, GenerateContentRequest};
use crate::relay::relay_body;

/// One configurable handler covering the persona/no-persona and
/// passthrough/simplified variants.
pub struct ChatRelay {
    upstream: Option<Arc<dyn ChatUpstream>>,
    config: ChatConfig,
}

impl ChatRelay {
    pub fn new(upstream: Option<Arc<dyn ChatUpstream>>, config: ChatConfig) -> Self {
        Self { upstream, config }
    }

    pub fn is_configured(&self) -> bool {
        self.upstream.is_some()
    }

    /// Run a raw JSON body through the whole pipeline.
    pub async fn handle(&self, body: &Value) -> Result<Value, ApiError> {
        let request = parse_chat_request(body, self.config.max_prompt_chars)?;

        let upstream = self.upstream.as_ref().ok_or_else(|| {
            error!("GEMINI_API_KEY not set; refusing chat request");
            ApiError::Misconfigured("GEMINI_API_KEY not set".to_string())
        })?;

        // A caller-supplied persona only applies when personas are enabled.
        let instruction = self
            .config
            .system_instruction
            .as_deref()
            .map(|default| request.system_override.as_deref().unwrap_or(default));

        let payload =
            GenerateContentRequest::from_prompt(&request.prompt, instruction, &self.config.generation);

        info!(
            model = upstream.model_name(),
            prompt_chars = request.prompt.chars().count(),
            with_instruction = instruction.is_some(),
            "Relaying chat prompt"
        );

        let body = upstream
            .generate_content(&payload)
            .await
            .map_err(|e| self.map_upstream_error(e))?;

        Ok(relay_body(body, self.config.response_shape))
    }

    fn map_upstream_error(&self, err: UpstreamError) -> ApiError {
        match err {
            UpstreamError::Status { status, message } => {
                let status = match self.config.status_policy {
                    UpstreamStatusPolicy::Mirror => {
                        StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY)
                    }
                    UpstreamStatusPolicy::Gateway => StatusCode::BAD_GATEWAY,
                };
                warn!(status = status.as_u16(), details = %message, "Upstream rejected chat request");
                ApiError::Upstream {
                    status,
                    details: message,
                }
            }
            other => {
                error!(error = %other, "Chat relay failed");
                ApiError::Internal(other.to_string())
            }
        }
    }
}
