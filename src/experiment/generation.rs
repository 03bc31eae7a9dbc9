//! Reward-candidate generation.
//!
//! Each model is asked once for a `compute_reward` function. Usable replies
//! land in the registry under `LLM_<model>`; anything else is logged and the
//! batch continues with the next model.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::LlmError;
use crate::llm::{CallOptions, LlmClient};
use crate::registry::RewardRegistry;
use crate::sandbox::defines_reward_function;
use crate::utils::extract_code;

/// Temperature used for every generation request.
pub const GENERATION_TEMPERATURE: f64 = 0.5;

/// Pause after each model request.
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_secs(1);

const GENERATED_PREFIX: &str = "LLM_";

/// Registry key for a candidate generated by `model`: `LLM_` plus the last
/// `/`-separated segment of the model id.
pub fn candidate_key(model: &str) -> String {
    let short = model.rsplit('/').next().unwrap_or(model);
    format!("{}{}", GENERATED_PREFIX, short)
}

/// Outcome counts of one generation batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GenerationSummary {
    pub generated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Requests reward functions from a list of models.
#[derive(Clone)]
pub struct CandidateGenerator {
    client: Option<LlmClient>,
    request_delay: Duration,
}

impl Default for CandidateGenerator {
    fn default() -> Self {
        Self {
            client: None,
            request_delay: DEFAULT_REQUEST_DELAY,
        }
    }
}

impl CandidateGenerator {
    /// Without a client every request fails (and is logged) instead of panicking.
    pub fn new(client: Option<LlmClient>) -> Self {
        Self {
            client,
            ..Self::default()
        }
    }

    pub fn with_client(mut self, client: LlmClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn request_delay(&self) -> Duration {
        self.request_delay
    }

    /// Asks each model for a reward function and stores the usable replies.
    ///
    /// Models whose key is already cached are skipped unless `force` is set.
    /// A failed request or a reply without `def compute_reward` is logged and
    /// the batch moves on. Every attempted model is followed by the request
    /// delay. A registry with a backing file is saved once at the end.
    pub async fn generate<S: AsRef<str>>(
        &self,
        registry: &mut RewardRegistry,
        prompt: &str,
        models: &[S],
        force: bool,
    ) -> GenerationSummary {
        let mut summary = GenerationSummary::default();

        for model in models {
            let model = model.as_ref();
            let key = candidate_key(model);

            if registry.contains(&key) && !force {
                info!(candidate = %key, "Candidate already cached, skipping");
                summary.skipped += 1;
                continue;
            }

            info!(candidate = %key, model, "Requesting reward function");
            match self.request(prompt, model).await {
                Ok(code) if defines_reward_function(&code) => {
                    info!(candidate = %key, code_len = code.len(), "Reward function generated");
                    registry.put(key, Some(code));
                    summary.generated += 1;
                }
                Ok(_) => {
                    warn!(candidate = %key, "Reply does not define compute_reward");
                    summary.failed += 1;
                }
                Err(e) => {
                    warn!(candidate = %key, error = %e, "Reward generation failed");
                    summary.failed += 1;
                }
            }

            tokio::time::sleep(self.request_delay).await;
        }

        if registry.cache_path().is_some() {
            registry.save();
        }

        info!(
            generated = summary.generated,
            skipped = summary.skipped,
            failed = summary.failed,
            "Generation batch finished"
        );
        summary
    }

    async fn request(&self, prompt: &str, model: &str) -> Result<String, LlmError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| LlmError::RequestFailed("no LLM client configured".to_string()))?;
        let options = CallOptions::new()
            .with_model(model)
            .with_temperature(GENERATION_TEMPERATURE);
        let reply = client.call(prompt, &options).await?;
        Ok(extract_code(&reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{HttpRequest, HttpResponse, LlmConfig, Transport};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Replays canned reply contents; answers 400 once the script is empty.
    struct ScriptedTransport {
        replies: Mutex<VecDeque<String>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn new(contents: &[&str]) -> Arc<Self> {
            let replies = contents
                .iter()
                .map(|content| {
                    serde_json::json!({"choices": [{"message": {"content": content}}]})
                        .to_string()
                })
                .collect();
            Arc::new(Self {
                replies: Mutex::new(replies),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post_json(&self, request: &HttpRequest) -> Result<HttpResponse, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            match self.replies.lock().unwrap().pop_front() {
                Some(body) => Ok(HttpResponse { status: 200, body }),
                None => Ok(HttpResponse {
                    status: 400,
                    body: "script exhausted".to_string(),
                }),
            }
        }
    }

    fn generator(transport: &Arc<ScriptedTransport>) -> CandidateGenerator {
        let config = LlmConfig::new().with_api_key("test-key");
        CandidateGenerator::new(Some(LlmClient::with_transport(config, transport.clone())))
    }

    const CACHED: &str = "def compute_reward(obs, terminated, truncated, info):\n    return 1.0\n";

    #[test]
    fn test_candidate_key_uses_last_segment() {
        assert_eq!(candidate_key("openai/gpt-4o-mini"), "LLM_gpt-4o-mini");
        assert_eq!(candidate_key("a/b/c"), "LLM_c");
        assert_eq!(candidate_key("local-model"), "LLM_local-model");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_candidate_is_not_regenerated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reward_cache.json");
        let mut seeded = RewardRegistry::new(&path);
        seeded.put("LLM_gpt-4o-mini", Some(CACHED.to_string()));
        seeded.try_save().unwrap();
        let before = fs::read(&path).unwrap();

        let transport = ScriptedTransport::new(&["```python\ndef compute_reward(o, t, u, i):\n    return 0\n```"]);
        let mut registry = RewardRegistry::load(&path);
        let summary = generator(&transport)
            .generate(&mut registry, "write a reward", &["openai/gpt-4o-mini"], false)
            .await;

        assert_eq!(summary, GenerationSummary { generated: 0, skipped: 1, failed: 0 });
        assert_eq!(transport.calls(), 0);
        assert_eq!(
            registry.get("LLM_gpt-4o-mini").unwrap().source.as_deref(),
            Some(CACHED)
        );
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_regenerates_and_saves() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let mut registry = RewardRegistry::new(&path);
        registry.put("LLM_m", Some("old".to_string()));

        let transport = ScriptedTransport::new(&[
            "Sure:\n```python\ndef compute_reward(obs, terminated, truncated, info):\n    return 2.0\n```",
        ]);
        let summary = generator(&transport)
            .generate(&mut registry, "prompt", &["vendor/m"], true)
            .await;

        assert_eq!(summary.generated, 1);
        assert_eq!(transport.calls(), 1);
        let stored = registry.get("LLM_m").unwrap().source.clone().unwrap();
        assert!(stored.starts_with("def compute_reward"));
        assert!(stored.ends_with("return 2.0"));
        assert_eq!(RewardRegistry::load(&path).get("LLM_m").unwrap().source, Some(stored));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_uses_model_and_generation_temperature() {
        let transport = ScriptedTransport::new(&["def compute_reward(a, b, c, d):\n    return 0"]);
        let mut registry = RewardRegistry::in_memory();
        generator(&transport)
            .generate(&mut registry, "the prompt", &["openai/gpt-4o-mini"], false)
            .await;

        let request = transport.requests.lock().unwrap()[0].clone();
        assert_eq!(request.body["model"], "openai/gpt-4o-mini");
        assert_eq!(request.body["temperature"], GENERATION_TEMPERATURE);
        assert_eq!(request.body["messages"][1]["content"], "the prompt");
        assert!(registry.contains("LLM_gpt-4o-mini"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unusable_replies_are_skipped_with_delay() {
        let transport = ScriptedTransport::new(&["I cannot help with that."]);
        let mut registry = RewardRegistry::in_memory();
        let start = tokio::time::Instant::now();

        // The second model gets a 400 once the script runs dry.
        let summary = generator(&transport)
            .with_request_delay(Duration::from_secs(2))
            .generate(&mut registry, "prompt", &["a/first", "b/second"], false)
            .await;

        assert_eq!(summary.failed, 2);
        assert!(registry.is_empty());
        assert_eq!(transport.calls(), 2);
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_client_fails_softly() {
        let mut registry = RewardRegistry::in_memory();
        let summary = CandidateGenerator::default()
            .generate(&mut registry, "prompt", &["x/y"], false)
            .await;
        assert_eq!(summary.failed, 1);
        assert!(registry.is_empty());
    }
}
