//! Retrying chat-completion client.
//!
//! One [`LlmClient::call`] sends a system + user message pair to an
//! OpenAI-compatible endpoint and returns the model's text. Transient failures
//! (connection errors, rate limiting, 5xx, unparseable bodies) are retried with
//! exponential backoff; other HTTP errors fail immediately.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::config::{LlmConfig, API_KEY_ENV};
use super::transport::{HttpRequest, ReqwestTransport, Transport};
use crate::error::LlmError;

/// Bytes of an unparseable body kept in the error for debugging.
const RAW_PREVIEW_CHARS: usize = 500;

/// Characters of a raw response echoed to debug logs.
const DEBUG_PREVIEW_CHARS: usize = 3000;

/// Message fields tried in order when extracting output text.
const OUTPUT_FIELDS: [&str; 3] = ["content", "reasoning", "refusal"];

/// A message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender ("system" or "user").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Per-call overrides. Anything left unset comes from [`LlmConfig`].
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub system_instruction: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    /// Merged into the request body last, replacing same-named fields.
    pub extra_fields: Map<String, Value>,
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
    pub backoff_base: Option<Duration>,
}

impl CallOptions {
    /// Creates options that defer everything to the client configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the model for this call.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the system instruction for this call.
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    /// Use a different credential for this call.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the max tokens for this call.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the temperature for this call.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the top_p for this call.
    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Add a provider-specific body field (e.g. `presence_penalty`).
    pub fn with_extra_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra_fields.insert(key.into(), value);
        self
    }

    /// Set the timeout for each attempt of this call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the retry budget for this call.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Set the backoff base for this call.
    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = Some(backoff_base);
        self
    }
}

/// Client for OpenAI-compatible chat-completion APIs.
#[derive(Clone)]
pub struct LlmClient {
    config: LlmConfig,
    transport: Arc<dyn Transport>,
}

impl LlmClient {
    /// Creates a client that talks HTTP through `reqwest`.
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        Ok(Self::with_transport(config, Arc::new(ReqwestTransport::new()?)))
    }

    /// Creates a client over an arbitrary transport.
    pub fn with_transport(config: LlmConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    /// The shared configuration.
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Builds the JSON body for a call: model, messages, decoding parameters,
    /// then extra fields (which win on name clashes).
    pub fn build_body(&self, prompt: &str, options: &CallOptions) -> Value {
        let system = options
            .system_instruction
            .as_deref()
            .unwrap_or(&self.config.system_instruction);
        let model = options
            .model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.config.default_model);

        let mut body = Map::new();
        body.insert("model".to_string(), Value::from(model));
        body.insert(
            "messages".to_string(),
            serde_json::json!([Message::system(system), Message::user(prompt)]),
        );
        body.insert(
            "max_tokens".to_string(),
            Value::from(options.max_tokens.unwrap_or(self.config.max_tokens)),
        );
        body.insert(
            "temperature".to_string(),
            Value::from(options.temperature.unwrap_or(self.config.temperature)),
        );
        body.insert(
            "top_p".to_string(),
            Value::from(options.top_p.unwrap_or(self.config.top_p)),
        );
        for (key, value) in &options.extra_fields {
            body.insert(key.clone(), value.clone());
        }
        Value::Object(body)
    }

    /// Sends `prompt` and returns the model's text output.
    ///
    /// # Errors
    ///
    /// - [`LlmError::MissingApiKey`] if no credential is configured (nothing is sent)
    /// - [`LlmError::ApiError`] for a non-retryable HTTP status
    /// - [`LlmError::RetriesExhausted`] once every attempt failed transiently
    pub async fn call(&self, prompt: &str, options: &CallOptions) -> Result<String, LlmError> {
        let api_key = options
            .api_key
            .as_deref()
            .or(self.config.api_key.as_deref())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey(API_KEY_ENV.to_string()))?;

        let request = HttpRequest {
            url: self.config.api_url.clone(),
            headers: self.headers(api_key),
            body: self.build_body(prompt, options),
            timeout: options.timeout.unwrap_or(self.config.timeout),
        };
        let retries = options.retries.unwrap_or(self.config.retries);
        let backoff_base = options.backoff_base.unwrap_or(self.config.backoff_base);

        let mut last_error = None;
        for attempt in 0..=retries {
            match self.attempt(&request).await {
                Ok(text) => return Ok(text),
                Err(err) if err.is_retryable() => {
                    if attempt < retries {
                        let delay = backoff_delay(backoff_base, attempt);
                        warn!(
                            attempt = attempt + 1,
                            max_attempts = retries + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Transient LLM error, will retry"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        let last = last_error.unwrap_or_else(|| {
            LlmError::RequestFailed("Max retries exceeded with no error captured".to_string())
        });
        Err(LlmError::RetriesExhausted {
            attempts: retries + 1,
            last: Box::new(last),
        })
    }

    /// Executes a single request (no retry logic).
    async fn attempt(&self, request: &HttpRequest) -> Result<String, LlmError> {
        let response = self.transport.post_json(request).await?;

        if !response.is_success() {
            return Err(LlmError::ApiError {
                status: response.status,
                body: response.body,
            });
        }

        let data: Value = serde_json::from_str(&response.body).map_err(|e| LlmError::ParseError {
            message: e.to_string(),
            raw: preview(&response.body, RAW_PREVIEW_CHARS),
        })?;

        debug!(
            raw = %preview(&response.body, DEBUG_PREVIEW_CHARS),
            "Received chat completion response"
        );

        Ok(extract_output_text(&data))
    }

    fn headers(&self, api_key: &str) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Authorization".to_string(), format!("Bearer {}", api_key)),
            ("Content-Type".to_string(), "application/json".to_string()),
        ];
        if let Some(referer) = &self.config.http_referer {
            headers.push(("HTTP-Referer".to_string(), referer.clone()));
        }
        if let Some(title) = &self.config.x_title {
            headers.push(("X-Title".to_string(), title.clone()));
        }
        headers
    }
}

/// Delay before the retry that follows failed attempt `attempt` (0-based).
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Pulls the output text out of a chat-completion response.
///
/// Tries `content`, then `reasoning`, then `refusal` on the first choice's
/// message; a field counts only if it is a non-blank string. With nothing
/// usable the whole response is returned as JSON text.
pub fn extract_output_text(data: &Value) -> String {
    let message = data
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"));

    if let Some(message) = message {
        for field in OUTPUT_FIELDS {
            if let Some(text) = message.get(field).and_then(Value::as_str) {
                if !text.trim().is_empty() {
                    return text.to_string();
                }
            }
        }
    }

    data.to_string()
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
