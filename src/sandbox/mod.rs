//! Reward function sandbox.
//!
//! Generated reward code is never executed natively. It is parsed by a small
//! embedded interpreter for the reward-script language and validated at load
//! time:
//!
//! - a top-level `compute_reward` function exists,
//! - it takes exactly four positional parameters
//!   `(obs, terminated, truncated, info)`,
//! - it contains at least one `return`,
//! - every name and module attribute it uses can be resolved.
//!
//! Runtime faults are isolated per call: [`invoke`] substitutes the
//! environment's own reward for that step and the episode carries on.
//!
//! # Example
//!
//! ```
//! use reward_forge::sandbox::{compile, invoke};
//! use reward_forge::training::env::Info;
//!
//! let reward = compile(
//!     "def compute_reward(obs, terminated, truncated, info):\n    return -abs(obs[0])\n",
//! )
//! .unwrap();
//! assert_eq!(invoke(&reward, &[-2.0], false, false, &Info::new(), 0.0), -2.0);
//! ```

pub mod builtins;
pub mod interpreter;
pub mod lexer;
pub mod names;
pub mod parser;
pub mod value;
pub mod wrapper;

use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::debug;

use crate::error::{EvalError, SandboxError};
use crate::training::env::Info;

pub use interpreter::{MAX_CALL_DEPTH, MAX_EXPRESSION_DEPTH};
pub use wrapper::RewardWrapper;

use interpreter::Interpreter;
use parser::Program;
use value::Value;

/// Entry point every reward script must define.
pub const REWARD_FUNCTION_NAME: &str = "compute_reward";

/// Parameter count of [`REWARD_FUNCTION_NAME`].
pub const REWARD_FUNCTION_ARITY: usize = 4;

/// A validated reward script, ready to evaluate.
///
/// Cheap to clone; the parsed program is shared.
#[derive(Debug, Clone)]
pub struct RewardFunction {
    program: Arc<Program>,
}

impl RewardFunction {
    /// Evaluates `compute_reward(obs, terminated, truncated, info)`.
    pub fn evaluate(
        &self,
        obs: &[f64],
        terminated: bool,
        truncated: bool,
        info: &Info,
    ) -> Result<f64, EvalError> {
        let args = vec![
            Value::from_observation(obs),
            Value::Bool(terminated),
            Value::Bool(truncated),
            Value::from_info(info),
        ];

        let result = Interpreter::new(&self.program)
            .call(REWARD_FUNCTION_NAME, args)?
            .ok_or_else(|| EvalError::MissingReturn(REWARD_FUNCTION_NAME.to_string()))?;

        let reward = match result {
            Value::Number(n) => n,
            Value::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            other => {
                return Err(EvalError::Type(format!(
                    "reward must be a number, got '{}'",
                    other.type_name()
                )))
            }
        };

        if !reward.is_finite() {
            return Err(EvalError::NonFinite(reward));
        }
        Ok(reward)
    }

    /// Names of all functions defined by the script.
    pub fn function_names(&self) -> Vec<&str> {
        self.program
            .functions
            .iter()
            .map(|f| f.name.as_str())
            .collect()
    }
}

/// Parses and validates reward-script source.
pub fn compile(source: &str) -> Result<RewardFunction, SandboxError> {
    let program = parser::parse(source)?;

    let entry = program
        .function(REWARD_FUNCTION_NAME)
        .ok_or_else(|| SandboxError::MissingFunction(REWARD_FUNCTION_NAME.to_string()))?;

    if entry.params.len() != REWARD_FUNCTION_ARITY {
        return Err(SandboxError::Arity {
            name: REWARD_FUNCTION_NAME.to_string(),
            expected: REWARD_FUNCTION_ARITY,
            found: entry.params.len(),
        });
    }

    if !entry.has_return() {
        return Err(SandboxError::NoReturn(REWARD_FUNCTION_NAME.to_string()));
    }

    names::check_names(&program)?;

    Ok(RewardFunction {
        program: Arc::new(program),
    })
}

/// Evaluates a reward, falling back to `fallback` on any runtime fault.
pub fn invoke(
    reward: &RewardFunction,
    obs: &[f64],
    terminated: bool,
    truncated: bool,
    info: &Info,
    fallback: f64,
) -> f64 {
    let (value, fault) = invoke_reporting(reward, obs, terminated, truncated, info, fallback);
    if let Some(e) = fault {
        debug!(error = %e, fallback, "Reward function failed, using environment reward");
    }
    value
}

/// Same substitution as [`invoke`], without logging. The fault that forced
/// the fallback is handed back so callers can count or report it.
pub fn invoke_reporting(
    reward: &RewardFunction,
    obs: &[f64],
    terminated: bool,
    truncated: bool,
    info: &Info,
    fallback: f64,
) -> (f64, Option<EvalError>) {
    match reward.evaluate(obs, terminated, truncated, info) {
        Ok(value) => (value, None),
        Err(e) => (fallback, Some(e)),
    }
}

/// Cheap textual check that `code` defines the reward entry point.
///
/// Used to reject replies that are prose or some other function before they
/// reach the cache; [`compile`] does the real validation.
pub fn defines_reward_function(code: &str) -> bool {
    static DEF: OnceLock<Regex> = OnceLock::new();
    DEF.get_or_init(|| {
        Regex::new(&format!(r"(?m)^\s*def\s+{}\s*\(", REWARD_FUNCTION_NAME))
            .expect("definition regex is valid")
    })
    .is_match(code)
}
