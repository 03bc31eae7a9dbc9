//! Environment contract and shared step types.
//!
//! Every task environment implements [`Environment`] so the trainer and the
//! reward sandbox can drive episodes uniformly. Environments are synchronous;
//! a training run owns its environment exclusively.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TrainError;

/// Auxiliary per-step data reported by an environment.
pub type Info = BTreeMap<String, InfoValue>;

/// A single auxiliary value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InfoValue {
    Number(f64),
    Flag(bool),
    /// A numeric tuple such as a grid position.
    Vector(Vec<f64>),
}

impl InfoValue {
    /// Numeric view of the value; flags read as 1.0 / 0.0.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            InfoValue::Number(n) => Some(*n),
            InfoValue::Flag(b) => Some(if *b { 1.0 } else { 0.0 }),
            InfoValue::Vector(_) => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            InfoValue::Vector(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f64> for InfoValue {
    fn from(value: f64) -> Self {
        InfoValue::Number(value)
    }
}

impl From<i64> for InfoValue {
    fn from(value: i64) -> Self {
        InfoValue::Number(value as f64)
    }
}

impl From<bool> for InfoValue {
    fn from(value: bool) -> Self {
        InfoValue::Flag(value)
    }
}

impl From<Vec<f64>> for InfoValue {
    fn from(value: Vec<f64>) -> Self {
        InfoValue::Vector(value)
    }
}

/// Outcome of a single environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub observation: Vec<f64>,
    pub reward: f64,
    /// The episode reached a terminal state.
    pub terminated: bool,
    /// The episode was cut short, e.g. by a step limit.
    pub truncated: bool,
    pub info: Info,
}

impl StepResult {
    /// Whether the episode is over for either reason.
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// The environment contract.
pub trait Environment: Send {
    /// Starts a new episode and returns the initial observation and info.
    fn reset(&mut self) -> Result<(Vec<f64>, Info), TrainError>;

    /// Applies a discrete action in `0..action_count()`.
    fn step(&mut self, action: usize) -> Result<StepResult, TrainError>;

    /// Number of discrete actions.
    fn action_count(&self) -> usize;

    /// Releases any resources held by the environment.
    fn close(&mut self) {}
}

impl<E: Environment + ?Sized> Environment for Box<E> {
    fn reset(&mut self) -> Result<(Vec<f64>, Info), TrainError> {
        (**self).reset()
    }

    fn step(&mut self, action: usize) -> Result<StepResult, TrainError> {
        (**self).step(action)
    }

    fn action_count(&self) -> usize {
        (**self).action_count()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
