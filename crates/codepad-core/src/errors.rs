//! Error types for snippet validation, evaluation and configuration
//!
//! Execution failures never escape the runner as `Err`: every
//! [`ExecutionError`] is flattened into the `error` string of an
//! `ExecutionResult`. [`CodepadError`] covers the surrounding plumbing
//! (configuration loading, executor construction) where propagation with `?`
//! is the right thing to do.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The snippet matched a denylist rule and never ran.
    #[error("{0}")]
    Validation(String),
    /// The snippet threw; carries the thrown message.
    #[error("{0}")]
    Runtime(String),
    #[error("Execution timed out")]
    Timeout,
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl ExecutionError {
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::Validation(_) => "validation",
            ExecutionError::Runtime(_) => "runtime",
            ExecutionError::Timeout => "timeout",
            ExecutionError::Unknown(_) => "unknown",
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum CodepadError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("Executor error: {0}")]
    ExecutorError(String),
}

impl From<std::io::Error> for CodepadError {
    fn from(err: std::io::Error) -> Self {
        CodepadError::IoError(err.to_string())
    }
}
