//! Reward-candidate experiments.
//!
//! - [`generation`]: ask models for reward functions and cache them
//! - [`runner`]: train one Q-learner per candidate and compare the curves
//! - [`smoothing`]: moving averages over per-episode histories
//! - [`plan`]: YAML description of a generation batch

pub mod generation;
pub mod plan;
pub mod runner;
pub mod smoothing;

pub use generation::{
    candidate_key, CandidateGenerator, GenerationSummary, DEFAULT_REQUEST_DELAY,
    GENERATION_TEMPERATURE,
};
pub use plan::{GenerationPlan, DEFAULT_CACHE_FILE};
pub use runner::{CandidateResult, EnvFactory, ExperimentReport, ExperimentRunner};
pub use smoothing::{moving_average, smoothing_window, tail_mean};
