//! Tabular Q-learning.
//!
//! The learner is deliberately plain: a dense table over discretized states,
//! epsilon-greedy exploration with multiplicative decay, and the standard
//! one-step update. Hyperparameters are fixed so that reward candidates are
//! compared under identical learning conditions.

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::TrainError;

use super::discretizer::Discretizer;
use super::env::{Environment, Info};

/// Step size α.
pub const LEARNING_RATE: f64 = 0.1;
/// Discount factor γ.
pub const DISCOUNT: f64 = 0.95;
pub const EPSILON_START: f64 = 1.0;
/// Multiplier applied to ε after every episode.
pub const EPSILON_DECAY: f64 = 0.995;
/// Floor below which ε never decays.
pub const EPSILON_MIN: f64 = 0.01;
/// Episodes between progress log lines.
pub const DEFAULT_LOG_EVERY: usize = 200;

/// Episode-level metric computed from the per-step info records.
pub type MetricFn = dyn Fn(&[Info]) -> f64 + Send + Sync;

/// Settings for a single training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub episodes: usize,
    /// Seed for exploration; `None` draws one from the OS.
    pub seed: Option<u64>,
    /// Progress is logged every this many episodes; 0 disables it.
    pub log_every: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            episodes: 2000,
            seed: None,
            log_every: DEFAULT_LOG_EVERY,
        }
    }
}

impl TrainingConfig {
    pub fn new(episodes: usize) -> Self {
        Self {
            episodes,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_log_every(mut self, log_every: usize) -> Self {
        self.log_every = log_every;
        self
    }

    fn create_rng(&self) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        }
    }
}

/// Dense action-value table indexed by `(state..., action)`.
#[derive(Debug, Clone)]
pub struct QTable {
    values: ArrayD<f64>,
    state_shape: Vec<usize>,
    actions: usize,
}

impl QTable {
    /// Allocates a zeroed table of shape `state_shape ++ [actions]`.
    pub fn new(state_shape: &[usize], actions: usize) -> Result<Self, TrainError> {
        if state_shape.is_empty() || state_shape.contains(&0) {
            return Err(TrainError::InvalidShape(state_shape.to_vec()));
        }
        if actions == 0 {
            return Err(TrainError::NoActions);
        }

        let mut dims = state_shape.to_vec();
        dims.push(actions);
        Ok(Self {
            values: ArrayD::zeros(IxDyn(&dims)),
            state_shape: state_shape.to_vec(),
            actions,
        })
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Full shape, including the trailing action axis.
    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    pub fn actions(&self) -> usize {
        self.actions
    }

    pub fn get(&self, state: &[usize], action: usize) -> Option<f64> {
        let mut index = state.to_vec();
        index.push(action);
        self.values.get(IxDyn(&index)).copied()
    }

    /// Action values of one state.
    pub fn row(&self, state: &[usize]) -> Result<ArrayViewD<'_, f64>, TrainError> {
        self.check_state(state)?;
        Ok(state
            .iter()
            .fold(self.values.view(), |view, &s| view.index_axis_move(Axis(0), s)))
    }

    /// Greedy action; ties go to the lowest index.
    pub fn best_action(&self, state: &[usize]) -> Result<usize, TrainError> {
        let row = self.row(state)?;
        let mut best = 0;
        let mut best_value = f64::NEG_INFINITY;
        for (action, &value) in row.iter().enumerate() {
            if value > best_value {
                best = action;
                best_value = value;
            }
        }
        Ok(best)
    }

    pub fn max_value(&self, state: &[usize]) -> Result<f64, TrainError> {
        Ok(self
            .row(state)?
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max))
    }

    /// Applies one Q-learning update and returns the new value.
    pub fn update(
        &mut self,
        state: &[usize],
        action: usize,
        reward: f64,
        next_state: &[usize],
    ) -> Result<f64, TrainError> {
        let next_max = self.max_value(next_state)?;
        self.check_state(state)?;

        let mut index = state.to_vec();
        index.push(action);
        let cell = self
            .values
            .get_mut(IxDyn(&index))
            .ok_or_else(|| TrainError::StateOutOfBounds {
                state: index.clone(),
                shape: self.state_shape.clone(),
            })?;
        *cell = q_update(*cell, reward, next_max);
        Ok(*cell)
    }

    fn check_state(&self, state: &[usize]) -> Result<(), TrainError> {
        let fits = state.len() == self.state_shape.len()
            && state.iter().zip(&self.state_shape).all(|(s, n)| s < n);
        if fits {
            Ok(())
        } else {
            Err(TrainError::StateOutOfBounds {
                state: state.to_vec(),
                shape: self.state_shape.clone(),
            })
        }
    }
}

/// `(1 − α)·q + α·(r + γ·next_max)`.
pub fn q_update(current: f64, reward: f64, next_max: f64) -> f64 {
    (1.0 - LEARNING_RATE) * current + LEARNING_RATE * (reward + DISCOUNT * next_max)
}

/// One episode's worth of ε decay.
pub fn decay_epsilon(epsilon: f64) -> f64 {
    if epsilon > EPSILON_MIN {
        (epsilon * EPSILON_DECAY).max(EPSILON_MIN)
    } else {
        epsilon
    }
}

/// Exploration rate after `episodes` completed episodes.
pub fn epsilon_after(episodes: usize) -> f64 {
    let exponent = i32::try_from(episodes).unwrap_or(i32::MAX);
    (EPSILON_START * EPSILON_DECAY.powi(exponent)).max(EPSILON_MIN)
}

/// Trains a fresh Q-table on `env` and returns one scalar per episode.
///
/// The scalar is `metric(infos)` when a metric is supplied, otherwise the
/// episode's cumulative reward. An episode runs until the environment reports
/// `terminated` or `truncated`.
pub fn train_q_learning(
    env: &mut dyn Environment,
    discretizer: &dyn Discretizer,
    config: &TrainingConfig,
    metric: Option<&MetricFn>,
) -> Result<Vec<f64>, TrainError> {
    let state_shape = discretizer.shape().ok_or(TrainError::MissingShape)?;
    let mut table = QTable::new(state_shape, env.action_count())?;
    let mut rng = config.create_rng();
    let mut epsilon = EPSILON_START;
    let mut history = Vec::with_capacity(config.episodes);

    debug!(
        shape = ?table.shape(),
        entries = table.len(),
        episodes = config.episodes,
        "Allocated Q-table"
    );

    for episode in 0..config.episodes {
        let (obs, _) = env.reset()?;
        let mut state = discretizer.discretize(&obs);
        let mut total_reward = 0.0;
        let mut infos: Vec<Info> = Vec::new();

        loop {
            let action = if rng.random_range(0.0..1.0) < epsilon {
                rng.random_range(0..table.actions())
            } else {
                table.best_action(&state)?
            };

            let step = env.step(action)?;
            let next_state = discretizer.discretize(&step.observation);
            table.update(&state, action, step.reward, &next_state)?;

            total_reward += step.reward;
            let done = step.done();
            infos.push(step.info);
            state = next_state;

            if done {
                break;
            }
        }

        epsilon = decay_epsilon(epsilon);

        history.push(match metric {
            Some(metric) => metric(&infos),
            None => total_reward,
        });

        if config.log_every > 0 && (episode + 1) % config.log_every == 0 {
            let recent = &history[history.len().saturating_sub(config.log_every)..];
            let avg_metric = recent.iter().sum::<f64>() / recent.len() as f64;
            info!(
                episode = episode + 1,
                episodes = config.episodes,
                avg_metric = format!("{:.2}", avg_metric),
                epsilon = format!("{:.3}", epsilon),
                "Training progress"
            );
        }
    }

    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::discretizer::{BinSpec, UniformBinDiscretizer};
    use crate::training::env::{InfoValue, StepResult};

    /// One-step episodes: action 1 pays 1.0, action 0 pays nothing.
    struct Bandit;

    impl Environment for Bandit {
        fn reset(&mut self) -> Result<(Vec<f64>, Info), TrainError> {
            Ok((vec![0.0], Info::new()))
        }

        fn step(&mut self, action: usize) -> Result<StepResult, TrainError> {
            let mut info = Info::new();
            info.insert("action".to_string(), InfoValue::from(action as i64));
            Ok(StepResult {
                observation: vec![0.0],
                reward: if action == 1 { 1.0 } else { 0.0 },
                terminated: true,
                truncated: false,
                info,
            })
        }

        fn action_count(&self) -> usize {
            2
        }
    }

    /// Truncates after `limit` steps with reward -1 each.
    struct Corridor {
        limit: usize,
        steps: usize,
    }

    impl Environment for Corridor {
        fn reset(&mut self) -> Result<(Vec<f64>, Info), TrainError> {
            self.steps = 0;
            Ok((vec![0.0, 0.0], Info::new()))
        }

        fn step(&mut self, _action: usize) -> Result<StepResult, TrainError> {
            self.steps += 1;
            Ok(StepResult {
                observation: vec![self.steps as f64, 0.0],
                reward: -1.0,
                terminated: false,
                truncated: self.steps >= self.limit,
                info: Info::new(),
            })
        }

        fn action_count(&self) -> usize {
            3
        }
    }

    struct Broken;

    impl Environment for Broken {
        fn reset(&mut self) -> Result<(Vec<f64>, Info), TrainError> {
            Ok((vec![0.0], Info::new()))
        }

        fn step(&mut self, _action: usize) -> Result<StepResult, TrainError> {
            Err(TrainError::Environment("simulator crashed".to_string()))
        }

        fn action_count(&self) -> usize {
            2
        }
    }

    struct NoShape;

    impl Discretizer for NoShape {
        fn shape(&self) -> Option<&[usize]> {
            None
        }

        fn discretize(&self, _obs: &[f64]) -> Vec<usize> {
            vec![0]
        }
    }

    /// Reports a one-bin shape but emits an index past it.
    struct Overflowing;

    impl Discretizer for Overflowing {
        fn shape(&self) -> Option<&[usize]> {
            Some(&[1])
        }

        fn discretize(&self, _obs: &[f64]) -> Vec<usize> {
            vec![3]
        }
    }

    fn single_bin() -> UniformBinDiscretizer {
        UniformBinDiscretizer::new(&[BinSpec::new(0.0, 1.0, 1)])
    }

    #[test]
    fn test_table_is_zeroed_with_expected_size() {
        let table = QTable::new(&[8, 8, 8, 8], 4).unwrap();
        assert_eq!(table.len(), 8 * 8 * 8 * 8 * 4);
        assert_eq!(table.shape(), &[8, 8, 8, 8, 4]);
        assert!(table.row(&[1, 2, 3, 4]).unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_invalid_shapes_rejected() {
        assert!(matches!(QTable::new(&[], 2), Err(TrainError::InvalidShape(_))));
        assert!(matches!(
            QTable::new(&[3, 0], 2),
            Err(TrainError::InvalidShape(_))
        ));
        assert!(matches!(QTable::new(&[3], 0), Err(TrainError::NoActions)));
    }

    #[test]
    fn test_update_rule() {
        assert!((q_update(0.0, -1.0, 0.0) - (-0.1)).abs() < 1e-12);
        assert!((q_update(1.0, 1.0, 2.0) - (0.9 + 0.1 * (1.0 + 0.95 * 2.0))).abs() < 1e-12);

        let mut table = QTable::new(&[2], 2).unwrap();
        let value = table.update(&[0], 1, -1.0, &[1]).unwrap();
        assert!((value - (-0.1)).abs() < 1e-12);
        assert_eq!(table.get(&[0], 1), Some(value));
    }

    #[test]
    fn test_argmax_ties_pick_lowest_action() {
        let mut table = QTable::new(&[2], 4).unwrap();
        assert_eq!(table.best_action(&[0]).unwrap(), 0);

        // Same reward, and the next state is untouched, so 1 and 3 tie.
        table.update(&[0], 3, 1.0, &[1]).unwrap();
        table.update(&[0], 1, 1.0, &[1]).unwrap();
        assert_eq!(table.get(&[0], 1), table.get(&[0], 3));
        assert_eq!(table.best_action(&[0]).unwrap(), 1);
        assert!((table.max_value(&[0]).unwrap() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_out_of_bounds_state_is_error() {
        let table = QTable::new(&[2, 2], 2).unwrap();
        assert!(matches!(
            table.best_action(&[2, 0]),
            Err(TrainError::StateOutOfBounds { .. })
        ));
        assert!(matches!(
            table.best_action(&[0]),
            Err(TrainError::StateOutOfBounds { .. })
        ));
        assert_eq!(table.get(&[5, 5], 0), None);
    }

    #[test]
    fn test_epsilon_schedule() {
        assert_eq!(epsilon_after(0), 1.0);
        assert!((epsilon_after(1) - 0.995).abs() < 1e-12);
        assert!((epsilon_after(100) - 0.995f64.powi(100)).abs() < 1e-12);
        assert_eq!(epsilon_after(1000), EPSILON_MIN);
        assert_eq!(epsilon_after(usize::MAX), EPSILON_MIN);

        let mut epsilon = EPSILON_START;
        for n in 1..=1200 {
            epsilon = decay_epsilon(epsilon);
            assert!((epsilon - epsilon_after(n)).abs() < 1e-9, "episode {}", n);
        }
        assert_eq!(epsilon, EPSILON_MIN);
    }

    #[test]
    fn test_history_has_one_entry_per_episode() {
        let mut env = Corridor { limit: 5, steps: 0 };
        let config = TrainingConfig::new(25).with_seed(7).with_log_every(0);
        let history = train_q_learning(&mut env, &single_bin(), &config, None).unwrap();

        assert_eq!(history.len(), 25);
        assert!(history.iter().all(|&total| total == -5.0));
    }

    #[test]
    fn test_metric_replaces_cumulative_reward() {
        let metric = |infos: &[Info]| infos.len() as f64 * 10.0;
        let mut env = Corridor { limit: 3, steps: 0 };
        let config = TrainingConfig::new(4).with_seed(1);
        let history = train_q_learning(&mut env, &single_bin(), &config, Some(&metric)).unwrap();
        assert_eq!(history, vec![30.0; 4]);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let config = TrainingConfig::new(200).with_seed(42).with_log_every(50);
        let a = train_q_learning(&mut Bandit, &single_bin(), &config, None).unwrap();
        let b = train_q_learning(&mut Bandit, &single_bin(), &config, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_learns_rewarding_action() {
        let config = TrainingConfig::new(600).with_seed(3);
        let history = train_q_learning(&mut Bandit, &single_bin(), &config, None).unwrap();

        let early: f64 = history[..100].iter().sum::<f64>() / 100.0;
        let late: f64 = history[500..].iter().sum::<f64>() / 100.0;
        assert!(late > 0.85, "late mean {}", late);
        assert!(late > early);
    }

    #[test]
    fn test_missing_shape_fails_before_training() {
        let result = train_q_learning(&mut Bandit, &NoShape, &TrainingConfig::new(10), None);
        assert!(matches!(result, Err(TrainError::MissingShape)));
    }

    #[test]
    fn test_state_outside_table_is_error() {
        let result = train_q_learning(&mut Bandit, &Overflowing, &TrainingConfig::new(1), None);
        assert!(matches!(result, Err(TrainError::StateOutOfBounds { .. })));
    }

    #[test]
    fn test_environment_errors_propagate() {
        let result = train_q_learning(&mut Broken, &single_bin(), &TrainingConfig::new(3), None);
        assert!(matches!(result, Err(TrainError::Environment(_))));
    }
}
