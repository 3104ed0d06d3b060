//! Code execution environments for evaluating submitted snippets.
//!
//! An executor evaluates one snippet as the body of an async function and
//! reports console output through an injected [`OutputSink`] instead of
//! patching any process-wide console. Two environments are provided: an
//! embedded interpreter running on a dedicated thread ([`boa`]) and a `node`
//! child process ([`node`]). Neither is a security boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::errors::ExecutionError;

pub mod boa;
pub mod capture;
pub mod node;

pub use boa::BoaCodeExecutor;
pub use capture::CaptureSink;
pub use node::NodeProcessExecutor;

/// Console method a line was emitted through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Error,
    Warn,
    Info,
}

impl ConsoleLevel {
    pub const ALL: [ConsoleLevel; 4] = [
        ConsoleLevel::Log,
        ConsoleLevel::Error,
        ConsoleLevel::Warn,
        ConsoleLevel::Info,
    ];

    /// Name of the console method, e.g. `"warn"`.
    pub fn method_name(self) -> &'static str {
        match self {
            ConsoleLevel::Log => "log",
            ConsoleLevel::Error => "error",
            ConsoleLevel::Warn => "warn",
            ConsoleLevel::Info => "info",
        }
    }

    pub fn log_level(self) -> log::Level {
        match self {
            ConsoleLevel::Log | ConsoleLevel::Info => log::Level::Info,
            ConsoleLevel::Warn => log::Level::Warn,
            ConsoleLevel::Error => log::Level::Error,
        }
    }
}

/// Destination for console lines produced by a running snippet.
pub trait OutputSink: Send + Sync {
    fn record(&self, level: ConsoleLevel, line: &str);
}

/// Evaluates snippets.
///
/// On success the executor yields the formatted completion value of the
/// snippet, or `None` when it completed with `undefined`. Executors do not
/// enforce the overall time budget themselves; the runner races them against
/// a timer and cancels `cancel` when the budget is spent. An executor whose
/// snippet can never settle should simply stay pending.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute_code(
        &self,
        source: &str,
        sink: &std::sync::Arc<dyn OutputSink>,
        cancel: CancellationToken,
    ) -> Result<Option<String>, ExecutionError>;
}

/// Wait until the runner gives up on a snippet that will never settle.
pub(crate) async fn never_settles(cancel: &CancellationToken) -> Result<Option<String>, ExecutionError> {
    cancel.cancelled().await;
    Err(ExecutionError::Timeout)
}
