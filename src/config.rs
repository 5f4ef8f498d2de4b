//! Configuration types.
//!
//! Everything is read once at start-up into a [`RelayConfig`] which is then
//! handed to the constructors that need it.

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::GenerationConfig;

/// Persona prepended to every prompt unless overridden.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a chatbot for EliteLedger Advisors LLC. \
Only answer questions related to accounting, bookkeeping, tax services, CPA advisory, \
and services provided by the website. Do not answer unrelated questions; instead reply: \
\"I'm sorry, I can only help with questions about our accounting, bookkeeping, tax and \
advisory services.\" Keep answers professional, concise, and friendly.";

pub const DEFAULT_CHAT_PATH: &str = "/api/gemini";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_API_VERSION: &str = "v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Paths served by other routes.
const RESERVED_PATHS: [&str; 3] = ["/", "/send", "/health"];

/// How a successful upstream body is returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseShape {
    /// The provider JSON, unmodified.
    #[default]
    Passthrough,
    /// `{ "reply": "..." }`.
    Simplified,
}

impl FromStr for ResponseShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passthrough" | "raw" => Ok(Self::Passthrough),
            "simplified" | "reply" => Ok(Self::Simplified),
            other => Err(format!("expected passthrough or simplified, got {other:?}")),
        }
    }
}

/// Which status the caller sees when the provider answers non-2xx.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpstreamStatusPolicy {
    /// Forward the provider's status code.
    #[default]
    Mirror,
    /// Always answer 502.
    Gateway,
}

impl FromStr for UpstreamStatusPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mirror" => Ok(Self::Mirror),
            "gateway" | "502" => Ok(Self::Gateway),
            other => Err(format!("expected mirror or gateway, got {other:?}")),
        }
    }
}

/// Origins allowed by the CORS layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    /// Exact origins; localhost and 127.0.0.1 are always accepted on top.
    List(Vec<String>),
}

impl CorsOrigins {
    fn parse(raw: &str) -> Self {
        let origins: Vec<String> = raw
            .split(',')
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            Self::Any
        } else {
            Self::List(origins)
        }
    }
}

/// Per-IP request quota for the chat and contact routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
    /// Key on the first `X-Forwarded-For` entry instead of the peer
    /// address. Only safe behind a proxy that overwrites the header.
    pub trust_forwarded: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window: Duration::from_secs(60),
            trust_forwarded: false,
        }
    }
}

/// Where and how to reach the generative-language API.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// `None` leaves the chat path answering "server not configured".
    pub api_key: Option<SecretString>,
    pub api_base: String,
    pub api_version: String,
    pub model: String,
    pub timeout: Duration,
}

impl UpstreamConfig {
    /// `{base}/{version}/models/{model}:generateContent`
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.api_version,
            self.model
        )
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Behaviour of the chat relay pipeline.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Persona prepended to prompts; `None` sends the prompt alone.
    pub system_instruction: Option<String>,
    pub response_shape: ResponseShape,
    pub status_policy: UpstreamStatusPolicy,
    /// Prompts longer than this are truncated.
    pub max_prompt_chars: usize,
    pub generation: GenerationConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_instruction: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
            response_shape: ResponseShape::default(),
            status_policy: UpstreamStatusPolicy::default(),
            max_prompt_chars: 2000,
            generation: GenerationConfig::default(),
        }
    }
}

/// Outbound SMTP settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// Implicit TLS when true, STARTTLS otherwise.
    pub secure: bool,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

/// Top-level relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub port: u16,
    pub chat_path: String,
    pub cors_origins: CorsOrigins,
    pub rate_limit: RateLimitConfig,
    pub upstream: UpstreamConfig,
    pub chat: ChatConfig,
    /// `None` when `SMTP_HOST` is unset.
    pub smtp: Option<SmtpConfig>,
    pub contact_recipient: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            chat_path: DEFAULT_CHAT_PATH.to_string(),
            cors_origins: CorsOrigins::Any,
            rate_limit: RateLimitConfig::default(),
            upstream: UpstreamConfig::default(),
            chat: ChatConfig::default(),
            smtp: None,
            contact_recipient: None,
        }
    }
}

impl RelayConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let defaults = Self::default();

        let chat_path = get("RELAY_CHAT_PATH").unwrap_or(defaults.chat_path);
        if !chat_path.starts_with('/') || RESERVED_PATHS.contains(&chat_path.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_CHAT_PATH".into(),
                message: format!("{chat_path:?} must start with '/' and not be one of {RESERVED_PATHS:?}"),
            });
        }

        let upstream = UpstreamConfig {
            api_key: get("GEMINI_API_KEY").map(SecretString::from),
            api_base: get("GEMINI_API_BASE").unwrap_or(defaults.upstream.api_base),
            api_version: get("GEMINI_API_VERSION").unwrap_or(defaults.upstream.api_version),
            model: get("GEMINI_MODEL").unwrap_or(defaults.upstream.model),
            timeout: Duration::from_secs(parse_or(&get, "GEMINI_TIMEOUT_SECS", 60)?),
        };

        let generation = GenerationConfig {
            temperature: parse_or(&get, "GEMINI_TEMPERATURE", defaults.chat.generation.temperature)?,
            max_output_tokens: parse_or(
                &get,
                "GEMINI_MAX_OUTPUT_TOKENS",
                defaults.chat.generation.max_output_tokens,
            )?,
            top_p: parse_opt(&get, "GEMINI_TOP_P")?.or(defaults.chat.generation.top_p),
            top_k: parse_opt(&get, "GEMINI_TOP_K")?.or(defaults.chat.generation.top_k),
        };

        let system_enabled = parse_bool(&get, "RELAY_SYSTEM_PROMPT_ENABLED", true)?;
        let system_instruction = system_enabled
            .then(|| get("RELAY_SYSTEM_PROMPT").unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()));

        let max_prompt_chars: usize = parse_or(&get, "RELAY_MAX_PROMPT_CHARS", 2000)?;
        if max_prompt_chars == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_MAX_PROMPT_CHARS".into(),
                message: "must be greater than zero".into(),
            });
        }

        let chat = ChatConfig {
            system_instruction,
            response_shape: parse_or(&get, "RELAY_RESPONSE_SHAPE", ResponseShape::default())?,
            status_policy: parse_or(&get, "RELAY_UPSTREAM_STATUS", UpstreamStatusPolicy::default())?,
            max_prompt_chars,
            generation,
        };

        let rate_limit = RateLimitConfig {
            max_requests: parse_or(&get, "RATE_LIMIT_MAX", defaults.rate_limit.max_requests)?,
            window: Duration::from_secs(parse_or(&get, "RATE_LIMIT_WINDOW_SECS", 60)?),
            trust_forwarded: parse_bool(&get, "RATE_LIMIT_TRUST_FORWARDED", false)?,
        };

        let smtp = match get("SMTP_HOST") {
            Some(host) => {
                let username = get("SMTP_USER").unwrap_or_default();
                let from_address = get("FROM_EMAIL")
                    .or_else(|| (!username.is_empty()).then(|| username.clone()))
                    .ok_or_else(|| ConfigError::MissingEnvVar("FROM_EMAIL".into()))?;
                Some(SmtpConfig {
                    host,
                    port: parse_or(&get, "SMTP_PORT", 587)?,
                    secure: parse_bool(&get, "SMTP_SECURE", false)?,
                    username,
                    password: SecretString::from(get("SMTP_PASS").unwrap_or_default()),
                    from_address,
                })
            }
            None => None,
        };

        let contact_recipient = get("CONTACT_TO_EMAIL")
            .or_else(|| smtp.as_ref().map(|s| s.from_address.clone()));

        Ok(Self {
            port: parse_or(&get, "PORT", defaults.port)?,
            chat_path,
            cors_origins: get("CORS_ALLOWED_ORIGINS")
                .map(|raw| CorsOrigins::parse(&raw))
                .unwrap_or(CorsOrigins::Any),
            rate_limit,
            upstream,
            chat,
            smtp,
            contact_recipient,
        })
    }
}

fn parse_opt<T, G>(get: &G, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    Ok(parse_opt(get, key)?.unwrap_or(default))
}

fn parse_bool<G>(get: &G, key: &str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected a boolean, got {v:?}"),
            }),
        },
    }
}
