//! YAML description of a generation batch.
//!
//! ```yaml
//! prompt_file: prompts/cooling.md
//! models:
//!   - openai/gpt-4o-mini
//!   - anthropic/claude-3.5-haiku
//! cache: reward_cache.json
//! force: false
//! request_delay_ms: 1000
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default cache file, relative to the working directory.
pub const DEFAULT_CACHE_FILE: &str = "reward_cache.json";

fn default_cache() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_FILE)
}

fn default_request_delay_ms() -> u64 {
    1000
}

/// Prompt, models and cache settings for one `generate` run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationPlan {
    /// Inline prompt text. Takes precedence over `prompt_file`.
    #[serde(default)]
    pub prompt: Option<String>,
    /// Prompt read from a file, relative to the plan file.
    #[serde(default)]
    pub prompt_file: Option<PathBuf>,
    pub models: Vec<String>,
    #[serde(default = "default_cache")]
    pub cache: PathBuf,
    #[serde(default)]
    pub force: bool,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
}

impl GenerationPlan {
    /// Parses a plan without touching the filesystem.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Loads a plan and inlines its prompt file.
    ///
    /// Relative `prompt_file` and `cache` paths resolve against the plan's
    /// directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut plan = Self::from_yaml_str(&fs::read_to_string(path)?)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));

        if plan.cache.is_relative() {
            plan.cache = base.join(&plan.cache);
        }
        if plan.prompt.is_none() {
            if let Some(prompt_file) = &plan.prompt_file {
                plan.prompt = Some(fs::read_to_string(base.join(prompt_file))?);
            }
        }

        plan.validate()?;
        Ok(plan)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let has_prompt = self.prompt.as_deref().is_some_and(|p| !p.trim().is_empty());
        if !has_prompt {
            return Err(ConfigError::ValidationFailed(
                "prompt (or prompt_file) cannot be empty".to_string(),
            ));
        }

        if self.models.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "models must list at least one model id".to_string(),
            ));
        }

        if self.models.iter().any(|m| m.trim().is_empty()) {
            return Err(ConfigError::ValidationFailed(
                "model ids cannot be blank".to_string(),
            ));
        }

        Ok(())
    }

    /// The prompt text; empty if neither source was provided.
    pub fn prompt_text(&self) -> &str {
        self.prompt.as_deref().unwrap_or_default()
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}
