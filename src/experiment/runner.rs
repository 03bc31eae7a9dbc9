//! Experiment orchestration.
//!
//! An [`ExperimentRunner`] owns one task setup (environment factory,
//! discretizer, optional episode metric) and a registry of reward candidates.
//! It asks language models for new candidates, trains a fresh Q-learner per
//! candidate and keeps the smoothed learning curves for comparison.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ReportError, TrainError};
use crate::llm::LlmClient;
use crate::registry::{RewardCandidate, RewardRegistry};
use crate::sandbox::{compile, RewardWrapper};
use crate::training::{
    train_q_learning, Discretizer, Environment, Info, MetricFn, TrainingConfig,
};

use super::generation::{CandidateGenerator, GenerationSummary};
use super::smoothing::{moving_average, smoothing_window, tail_mean};

/// Builds a fresh environment instance per candidate.
pub type EnvFactory = dyn Fn() -> Box<dyn Environment> + Send + Sync;

/// Learning curve of one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub name: String,
    /// One metric value per episode.
    pub raw: Vec<f64>,
    /// Trailing moving average of `raw`.
    pub smoothed: Vec<f64>,
    pub window: usize,
    /// Mean of the last `window` raw values; `None` for an empty history.
    pub final_mean: Option<f64>,
    /// Steps on which the reward script faulted and the environment reward was used.
    pub reward_faults: usize,
}

/// Serializable summary of a run, for plotting outside this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub experiment: String,
    pub episodes: usize,
    pub candidates: Vec<CandidateResult>,
}

impl ExperimentReport {
    pub fn candidate(&self, name: &str) -> Option<&CandidateResult> {
        self.candidates.iter().find(|c| c.name == name)
    }
}

/// Drives generation, training and comparison of reward candidates for one task.
pub struct ExperimentRunner {
    name: String,
    env_factory: Box<EnvFactory>,
    discretizer: Box<dyn Discretizer>,
    metric: Option<Box<MetricFn>>,
    registry: RewardRegistry,
    generator: CandidateGenerator,
    training: TrainingConfig,
    episodes: usize,
    results: Vec<CandidateResult>,
}

impl ExperimentRunner {
    pub fn new<F, D>(
        name: impl Into<String>,
        env_factory: F,
        discretizer: D,
        registry: RewardRegistry,
    ) -> Self
    where
        F: Fn() -> Box<dyn Environment> + Send + Sync + 'static,
        D: Discretizer + 'static,
    {
        Self {
            name: name.into(),
            env_factory: Box::new(env_factory),
            discretizer: Box::new(discretizer),
            metric: None,
            registry,
            generator: CandidateGenerator::default(),
            training: TrainingConfig::default(),
            episodes: 0,
            results: Vec::new(),
        }
    }

    /// Scores episodes with `metric` instead of cumulative reward.
    pub fn with_metric<M>(mut self, metric: M) -> Self
    where
        M: Fn(&[Info]) -> f64 + Send + Sync + 'static,
    {
        self.metric = Some(Box::new(metric));
        self
    }

    pub fn with_client(mut self, client: LlmClient) -> Self {
        self.generator = self.generator.with_client(client);
        self
    }

    /// Pause after each generation request.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.generator = self.generator.with_request_delay(delay);
        self
    }

    /// Seed and logging settings for every training run. The episode count
    /// is taken from [`ExperimentRunner::run`].
    pub fn with_training_config(mut self, config: TrainingConfig) -> Self {
        self.training = config;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &RewardRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut RewardRegistry {
        &mut self.registry
    }

    /// Results of the last [`ExperimentRunner::run`], in registry order.
    pub fn results(&self) -> &[CandidateResult] {
        &self.results
    }

    /// Registers a hand-written candidate; `None` trains on the environment's reward.
    pub fn add_manual_reward(&mut self, name: impl Into<String>, source: Option<String>) {
        self.registry.put(name, source);
    }

    /// Generates candidates from `models` into this runner's registry.
    ///
    /// See [`CandidateGenerator::generate`] for the skip, failure and delay rules.
    pub async fn generate<S: AsRef<str>>(
        &mut self,
        prompt: &str,
        models: &[S],
        force: bool,
    ) -> GenerationSummary {
        info!(experiment = %self.name, models = models.len(), "Generating reward candidates");
        self.generator
            .generate(&mut self.registry, prompt, models, force)
            .await
    }

    /// Trains one fresh Q-learner per registered candidate.
    ///
    /// A candidate whose script does not compile, or whose training fails,
    /// is logged and skipped. Results replace earlier ones of the same name.
    pub fn run(&mut self, episodes: usize) -> &[CandidateResult] {
        let config = TrainingConfig {
            episodes,
            ..self.training.clone()
        };
        let window = smoothing_window(episodes);
        let candidates: Vec<RewardCandidate> = self.registry.iter().cloned().collect();
        self.episodes = episodes;

        info!(
            experiment = %self.name,
            candidates = candidates.len(),
            episodes,
            "Starting experiments"
        );

        for candidate in candidates {
            info!(candidate = %candidate.name, "Training candidate");

            let (history, faults) = match self.train_candidate(&candidate, &config) {
                Some(Ok(outcome)) => outcome,
                Some(Err(e)) => {
                    warn!(candidate = %candidate.name, error = %e, "Training failed, skipping");
                    continue;
                }
                None => continue,
            };

            let final_mean = (!history.is_empty()).then(|| tail_mean(&history, window));
            if let Some(mean) = final_mean {
                info!(
                    candidate = %candidate.name,
                    window,
                    final_score = format!("{:.4}", mean),
                    "Candidate finished"
                );
            }

            self.record(CandidateResult {
                smoothed: moving_average(&history, window),
                name: candidate.name,
                raw: history,
                window,
                final_mean,
                reward_faults: faults,
            });
        }

        &self.results
    }

    /// `None` when the script does not compile.
    fn train_candidate(
        &self,
        candidate: &RewardCandidate,
        config: &TrainingConfig,
    ) -> Option<Result<(Vec<f64>, usize), TrainError>> {
        let mut env = (self.env_factory)();

        let Some(source) = &candidate.source else {
            let outcome = self.train(&mut env, config).map(|history| (history, 0));
            env.close();
            return Some(outcome);
        };

        let reward = match compile(source) {
            Ok(reward) => reward,
            Err(e) => {
                warn!(
                    candidate = %candidate.name,
                    error = %e,
                    "Reward function failed to compile, skipping"
                );
                env.close();
                return None;
            }
        };

        let mut wrapped = RewardWrapper::new(env, reward);
        let outcome = self.train(&mut wrapped, config);
        let faults = wrapped.faults();
        wrapped.close();
        if faults > 0 {
            info!(candidate = %candidate.name, faults, "Reward script faulted on some steps");
        }
        Some(outcome.map(|history| (history, faults)))
    }

    fn train(
        &self,
        env: &mut dyn Environment,
        config: &TrainingConfig,
    ) -> Result<Vec<f64>, TrainError> {
        train_q_learning(env, self.discretizer.as_ref(), config, self.metric.as_deref())
    }

    fn record(&mut self, result: CandidateResult) {
        match self.results.iter_mut().find(|r| r.name == result.name) {
            Some(existing) => *existing = result,
            None => self.results.push(result),
        }
    }

    /// Snapshot of the current results.
    pub fn report(&self) -> ExperimentReport {
        ExperimentReport {
            experiment: self.name.clone(),
            episodes: self.episodes,
            candidates: self.results.clone(),
        }
    }

    /// Writes [`ExperimentRunner::report`] as pretty JSON.
    pub fn write_report(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(&self.report())?)?;
        info!(path = %path.display(), "Experiment report written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::{BinSpec, InfoValue, StepResult, UniformBinDiscretizer};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Walks right on action 1; terminates at position 3, truncates at 10 steps.
    struct Chain {
        position: usize,
        steps: usize,
        closes: Arc<AtomicUsize>,
        fail_on_step: bool,
    }

    impl Environment for Chain {
        fn reset(&mut self) -> Result<(Vec<f64>, Info), TrainError> {
            self.position = 0;
            self.steps = 0;
            Ok((vec![0.0], Info::new()))
        }

        fn step(&mut self, action: usize) -> Result<StepResult, TrainError> {
            if self.fail_on_step {
                return Err(TrainError::Environment("broken chain".to_string()));
            }
            self.steps += 1;
            if action == 1 {
                self.position += 1;
            }
            let mut info = Info::new();
            info.insert("position".to_string(), InfoValue::from(self.position as i64));
            Ok(StepResult {
                observation: vec![self.position as f64],
                reward: -1.0,
                terminated: self.position >= 3,
                truncated: self.steps >= 10,
                info,
            })
        }

        fn action_count(&self) -> usize {
            2
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn chain_runner(registry: RewardRegistry, closes: Arc<AtomicUsize>) -> ExperimentRunner {
        let discretizer = UniformBinDiscretizer::new(&[BinSpec::new(0.0, 3.0, 4)]);
        ExperimentRunner::new(
            "chain",
            move || {
                Box::new(Chain {
                    position: 0,
                    steps: 0,
                    closes: Arc::clone(&closes),
                    fail_on_step: false,
                }) as Box<dyn Environment>
            },
            discretizer,
            registry,
        )
        .with_training_config(TrainingConfig::default().with_seed(11).with_log_every(0))
    }

    const CONSTANT_REWARD: &str =
        "def compute_reward(obs, terminated, truncated, info):\n    return 1.0\n";

    #[tokio::test(start_paused = true)]
    async fn test_generation_without_client_fails_softly() {
        let mut runner = chain_runner(RewardRegistry::in_memory(), Arc::default());
        let summary = runner.generate("prompt", &["x/y"], false).await;
        assert_eq!(summary.failed, 1);
        assert!(runner.registry().is_empty());
    }

    #[test]
    fn test_run_trains_every_compilable_candidate() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut runner = chain_runner(RewardRegistry::in_memory(), Arc::clone(&closes));
        runner.add_manual_reward("Default", None);
        runner.add_manual_reward("Constant", Some(CONSTANT_REWARD.to_string()));
        runner.add_manual_reward("Broken", Some("def compute_reward(obs):\n    return 1\n".to_string()));

        let results = runner.run(40);

        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Default", "Constant"]);
        assert_eq!(closes.load(Ordering::SeqCst), 3);

        let constant = &results[1];
        assert_eq!(constant.window, 5);
        assert_eq!(constant.raw.len(), 40);
        assert_eq!(constant.smoothed.len(), 36);
        // Every step pays 1.0, so an episode scores its own length.
        assert!(constant.raw.iter().all(|&total| (3.0..=10.0).contains(&total)));
        assert!(results[0].raw.iter().all(|&total| (-10.0..=-3.0).contains(&total)));
    }

    #[test]
    fn test_metric_and_fault_counts_reach_results() {
        let mut runner = chain_runner(RewardRegistry::in_memory(), Arc::default())
            .with_metric(|infos: &[Info]| infos.len() as f64);
        runner.add_manual_reward(
            "Partial",
            Some(
                "def compute_reward(obs, terminated, truncated, info):\n    return 1 / (info['position'] - 1)\n"
                    .to_string(),
            ),
        );

        let results = runner.run(30);
        assert_eq!(results.len(), 1);
        assert!(results[0].raw.iter().all(|&steps| (3.0..=10.0).contains(&steps)));
        assert!(results[0].reward_faults > 0);
    }

    #[test]
    fn test_training_failure_skips_only_that_candidate() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let discretizer = UniformBinDiscretizer::new(&[BinSpec::new(0.0, 3.0, 4)]);
        let mut runner = ExperimentRunner::new(
            "flaky",
            move || {
                // The first environment handed out is broken.
                let index = counter.fetch_add(1, Ordering::SeqCst);
                Box::new(Chain {
                    position: 0,
                    steps: 0,
                    closes: Arc::default(),
                    fail_on_step: index == 0,
                }) as Box<dyn Environment>
            },
            discretizer,
            RewardRegistry::in_memory(),
        );
        runner.add_manual_reward("First", None);
        runner.add_manual_reward("Second", None);

        let results = runner.run(10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Second");
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_report_is_written_as_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("report.json");
        let mut runner = chain_runner(RewardRegistry::in_memory(), Arc::default());
        runner.add_manual_reward("Default", None);
        runner.run(12);

        runner.write_report(&path).unwrap();
        let report: ExperimentReport =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(report.experiment, "chain");
        assert_eq!(report.episodes, 12);
        let default = report.candidate("Default").unwrap();
        assert_eq!(default.raw, runner.results()[0].raw);
        assert_eq!(default.smoothed.len(), 8);
        assert!(default.final_mean.is_some());
    }
}
