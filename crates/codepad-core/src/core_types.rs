//! Request and result records exchanged with callers of the runner.

use serde::{Deserialize, Serialize};

/// A single snippet submitted for evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub source: String,
    /// Reserved for stdin-style injection; the engines ignore it today.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
}

impl ExecutionRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            input: None,
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }
}

/// What a caller gets back from one run.
///
/// `error` is present exactly when the snippet was rejected, threw, or timed
/// out, and in that case `output` is empty. `execution_time` is in
/// milliseconds and is `None` only when validation rejected the snippet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub output: String,
    pub error: Option<String>,
    pub execution_time: Option<f64>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
