//! reward-forge: LLM-written reward functions for tabular reinforcement learning.
//!
//! This library asks language models to author reward functions, caches them,
//! runs each one inside a sandboxed interpreter while a Q-learner trains, and
//! compares the resulting learning curves.

// Core modules
pub mod cli;
pub mod error;
pub mod experiment;
pub mod llm;
pub mod registry;
pub mod sandbox;
pub mod training;
pub mod utils;

// Re-export commonly used error types
pub use error::{
    ConfigError, EvalError, LlmError, RegistryError, ReportError, SandboxError, TrainError,
};
