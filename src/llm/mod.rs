//! LLM integration for reward-forge.
//!
//! The client sends a system + user prompt pair to an OpenAI-compatible
//! chat-completion endpoint (OpenRouter by default) and returns the model's
//! text, retrying transient failures with exponential backoff.
//!
//! ```ignore
//! use reward_forge::llm::{CallOptions, LlmClient, LlmConfig};
//!
//! let client = LlmClient::new(LlmConfig::from_env()?)?;
//! let text = client
//!     .call(prompt, &CallOptions::new().with_model("openai/gpt-4o-mini").with_temperature(0.5))
//!     .await?;
//! ```

pub mod client;
pub mod config;
pub mod transport;

pub use client::{backoff_delay, extract_output_text, CallOptions, LlmClient, Message};
pub use config::{LlmConfig, API_KEY_ENV, DEFAULT_API_URL, DEFAULT_MODEL};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
