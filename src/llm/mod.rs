//! Generative-language upstream.
//!
//! The relay talks to the provider through the [`ChatUpstream`] trait so the
//! pipeline can be exercised without network access. [`GeminiClient`] is the
//! production implementation.

pub mod gemini;

pub use gemini::{Content, GeminiClient, GenerateContentRequest, GenerationConfig, Part};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::UpstreamConfig;
use crate::error::UpstreamError;

/// A provider that turns a `generateContent` payload into a JSON response.
#[async_trait]
pub trait ChatUpstream: Send + Sync {
    /// Model identifier used in logs.
    fn model_name(&self) -> &str;

    /// Issue one call. Non-2xx answers come back as [`UpstreamError::Status`].
    async fn generate_content(&self, request: &GenerateContentRequest)
    -> Result<Value, UpstreamError>;
}

/// Create the upstream client, or `None` when no API key is configured.
pub fn create_upstream(
    config: &UpstreamConfig,
) -> Result<Option<Arc<dyn ChatUpstream>>, UpstreamError> {
    let Some(api_key) = config.api_key.as_ref() else {
        tracing::warn!("GEMINI_API_KEY not set; chat requests will be refused");
        return Ok(None);
    };

    let client = GeminiClient::new(config, api_key)?;
    tracing::info!("Using Gemini (model: {})", config.model);
    Ok(Some(Arc::new(client)))
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    #[test]
    fn missing_key_yields_no_upstream() {
        let config = UpstreamConfig::default();
        assert!(create_upstream(&config).unwrap().is_none());
    }

    #[test]
    fn configured_key_builds_client() {
        let config = UpstreamConfig {
            api_key: Some(SecretString::from("test-key")),
            model: "gemini-2.0-flash".to_string(),
            ..UpstreamConfig::default()
        };
        let upstream = create_upstream(&config).unwrap().unwrap();
        assert_eq!(upstream.model_name(), "gemini-2.0-flash");
    }
}
