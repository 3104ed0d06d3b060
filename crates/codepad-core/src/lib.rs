//! Validation and evaluation of JavaScript snippets for an interactive
//! practice-question site.
//!
//! A snippet goes through a denylist screen, then runs as the body of an
//! async function with its console output captured, under a fixed time
//! budget. The caller always gets an [`ExecutionResult`] back: failures are
//! reported in its `error` field, never as `Err`.
//!
//! # Architecture Overview
//!
//! - **Validation**: [`validator`] rejects a handful of constructs by regex.
//!   It is a deterrent, not a sandbox.
//! - **Execution environments**: [`executors`] evaluate a snippet either with
//!   the embedded Boa interpreter or in a `node` child process, reporting
//!   console lines through an injected [`OutputSink`].
//! - **Runner**: [`runner::CodeRunner`] ties validation, execution, the
//!   timeout race and result shaping together.
//! - **Session**: [`session::CodeSession`] keeps the editable code and the
//!   latest result for a UI, with `run` and `reset`.
//! - **Configuration system**: YAML configuration with environment overrides.
//!
//! ```rust,no_run
//! use codepad_core::CodeRunner;
//!
//! # async fn demo() {
//! let runner = CodeRunner::embedded();
//! let result = runner.run_code("console.log(1 + 1)").await;
//! assert_eq!(result.output, "2");
//! # }
//! ```

pub mod config;
pub mod core_types;
pub mod errors;
pub mod executors;
pub mod runner;
pub mod session;
pub mod validator;

pub use config::{CodepadConfig, ConfigLoader, EngineKind};
pub use core_types::{ExecutionRequest, ExecutionResult};
pub use errors::{CodepadError, ExecutionError};
pub use executors::{CaptureSink, CodeExecutor, ConsoleLevel, OutputSink};
pub use runner::CodeRunner;
pub use session::{CodeSession, SessionSnapshot};
pub use validator::{validate_code_safety, CodeValidator, ValidationResult};
