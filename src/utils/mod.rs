//! Shared utility functions for reward-forge.
//!
//! Currently this is code extraction from free-form LLM replies.

pub mod code_extraction;

pub use code_extraction::{extract_code, extract_from_code_block, extract_tagged_code};
