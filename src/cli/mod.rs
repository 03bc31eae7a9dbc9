//! Command-line interface for reward-forge.
//!
//! Provides commands for reward generation, cache management and offline
//! script evaluation.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
