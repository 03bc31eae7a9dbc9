//! Tabular reinforcement-learning pieces.
//!
//! - [`env`]: the environment contract the trainer drives
//! - [`discretizer`]: continuous observation → table index
//! - [`q_learning`]: the ε-greedy Q-learning loop

pub mod discretizer;
pub mod env;
pub mod q_learning;

pub use discretizer::{BinSpec, Discretizer, UniformBinDiscretizer};
pub use env::{Environment, Info, InfoValue, StepResult};
pub use q_learning::{
    epsilon_after, q_update, train_q_learning, MetricFn, QTable, TrainingConfig,
};
