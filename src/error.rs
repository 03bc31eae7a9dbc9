//! Error types for reward-forge operations.
//!
//! Defines error types for the major subsystems:
//! - LLM API interactions and client configuration
//! - Reward registry persistence
//! - Reward-script compilation and evaluation
//! - Q-learning training runs
//! - Experiment report output

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: set {0} or pass a key explicitly")]
    MissingApiKey(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {message}")]
    ParseError { message: String, raw: String },

    #[error("API error (status={status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("LLM call failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<LlmError> },
}

impl LlmError {
    /// Whether another attempt may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RequestFailed(_) | LlmError::ParseError { .. } => true,
            LlmError::ApiError { status, .. } => is_retryable_status(*status),
            LlmError::MissingApiKey(_) | LlmError::RetriesExhausted { .. } => false,
        }
    }

    /// HTTP status of the failure, looking through a retry wrapper.
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::ApiError { status, .. } => Some(*status),
            LlmError::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

/// Rate limiting and gateway/server failures are worth another attempt.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Errors that can occur while building configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur during registry persistence.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Registry has no backing file")]
    NoBackingFile,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cache entry '{name}' must be a string or null")]
    InvalidEntry { name: String },
}

/// Errors raised while turning reward-script source into a callable.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SandboxError {
    #[error("Syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("Function '{0}' is not defined")]
    MissingFunction(String),

    #[error("Function '{name}' must take {expected} parameters, found {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Function '{0}' never returns a value")]
    NoReturn(String),

    #[error("Unsupported top-level statement at line {0}")]
    UnsupportedStatement(usize),

    #[error("Function '{0}' is defined more than once")]
    DuplicateFunction(String),

    #[error("Name '{name}' used in '{function}' (line {line}) is not defined")]
    UnresolvedName {
        name: String,
        function: String,
        line: usize,
    },
}

/// Runtime faults raised while evaluating a reward script.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    #[error("Name '{0}' is not defined")]
    UndefinedName(String),

    #[error("Key {0} not found")]
    KeyNotFound(String),

    #[error("Index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("Type error: {0}")]
    Type(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Function '{name}' takes {expected} arguments, got {found}")]
    WrongArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Function '{0}' finished without returning a value")]
    MissingReturn(String),

    #[error("Reward is not a finite number: {0}")]
    NonFinite(f64),

    #[error("Maximum call depth of {0} exceeded")]
    CallDepth(usize),
}

/// Errors that abort a training run.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("Discretizer does not expose a shape")]
    MissingShape,

    #[error("Invalid discretizer shape {0:?}: every dimension needs at least one bin")]
    InvalidShape(Vec<usize>),

    #[error("Environment reports no actions")]
    NoActions,

    #[error("State {state:?} does not fit Q-table shape {shape:?}")]
    StateOutOfBounds { state: Vec<usize>, shape: Vec<usize> },

    #[error("Environment error: {0}")]
    Environment(String),
}

/// Errors from writing experiment output.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
