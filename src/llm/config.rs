//! Client configuration for the chat-completion API.
//!
//! [`LlmConfig`] is built once at startup (usually from the environment) and
//! handed to [`LlmClient`](super::LlmClient). Individual calls may override
//! any decoding or retry setting through [`CallOptions`](super::CallOptions)
//! without touching the shared configuration.

use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;

/// Environment variable holding the bearer token.
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Default OpenAI-compatible chat-completion endpoint.
pub const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Model used when neither the config nor the call names one.
pub const DEFAULT_MODEL: &str = "openai/gpt-oss-120b:free";

/// System instruction sent with every request unless overridden.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str =
    "You are an expert in reinforcement learning. Design a reward function.";

/// Immutable settings shared by every LLM call.
#[derive(Clone)]
pub struct LlmConfig {
    /// Bearer token. `None` makes every call fail before sending.
    pub api_key: Option<String>,
    /// Full chat-completion URL.
    pub api_url: String,
    /// Model id used when a call does not specify one.
    pub default_model: String,
    /// System message used when a call does not specify one.
    pub system_instruction: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Nucleus sampling parameter.
    pub top_p: f64,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries after the first attempt (total attempts = retries + 1).
    pub retries: u32,
    /// Backoff before retry `k` is `backoff_base * 2^k`.
    pub backoff_base: Duration,
    /// Optional `HTTP-Referer` attribution header.
    pub http_referer: Option<String>,
    /// Optional `X-Title` attribution header.
    pub x_title: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: DEFAULT_API_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            max_tokens: 800,
            temperature: 0.7,
            top_p: 0.95,
            timeout: Duration::from_secs(120),
            retries: 2,
            backoff_base: Duration::from_secs(1),
            http_referer: None,
            x_title: Some("reward-forge".to_string()),
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &self.api_key_masked())
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("backoff_base", &self.backoff_base)
            .finish()
    }
}

impl LlmConfig {
    /// Creates a configuration with default values and no credential.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from environment variables.
    ///
    /// Reads:
    /// - `OPENROUTER_API_KEY`: bearer token (optional here, required per call)
    /// - `REWARD_FORGE_API_URL`: chat-completion URL
    /// - `REWARD_FORGE_MODEL`: default model id
    /// - `REWARD_FORGE_TIMEOUT_SECS`: request timeout in seconds
    /// - `REWARD_FORGE_RETRIES`: retry budget
    /// - `REWARD_FORGE_BACKOFF_MS`: backoff base in milliseconds
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but cannot be parsed, or
    /// the resulting configuration does not validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty());

        if let Ok(val) = std::env::var("REWARD_FORGE_API_URL") {
            config.api_url = val;
        }

        if let Ok(val) = std::env::var("REWARD_FORGE_MODEL") {
            config.default_model = val;
        }

        if let Ok(val) = std::env::var("REWARD_FORGE_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "REWARD_FORGE_TIMEOUT_SECS")?;
            config.timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("REWARD_FORGE_RETRIES") {
            config.retries = parse_env_value(&val, "REWARD_FORGE_RETRIES")?;
        }

        if let Ok(val) = std::env::var("REWARD_FORGE_BACKOFF_MS") {
            let ms: u64 = parse_env_value(&val, "REWARD_FORGE_BACKOFF_MS")?;
            config.backoff_base = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_url.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "api_url cannot be empty".to_string(),
            ));
        }

        if self.default_model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "default_model cannot be empty".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(ConfigError::ValidationFailed(
                "top_p must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_tokens must be greater than 0".to_string(),
            ));
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns the API key with everything but its ends masked.
    pub fn api_key_masked(&self) -> String {
        match &self.api_key {
            None => "<unset>".to_string(),
            Some(key) if key.chars().count() <= 8 => "*".repeat(key.chars().count()),
            Some(key) => {
                let chars: Vec<char> = key.chars().collect();
                let head: String = chars[..4].iter().collect();
                let tail: String = chars[chars.len() - 4..].iter().collect();
                format!("{}...{}", head, tail)
            }
        }
    }

    /// Builder method to set the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Builder method to set the endpoint URL.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Builder method to set the default model.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Builder method to set the retry budget.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Builder method to set the backoff base.
    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// Builder method to set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builder method to set both attribution headers.
    pub fn with_attribution(
        mut self,
        http_referer: Option<String>,
        x_title: Option<String>,
    ) -> Self {
        self.http_referer = http_referer;
        self.x_title = x_title;
        self
    }
}

/// Parse an environment variable value into the target type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
