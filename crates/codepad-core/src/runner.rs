//! Validate, execute and shape the result of one snippet.
//!
//! A run moves through `Validating`, then either `Rejected` or `Executing`,
//! and ends `Succeeded`, `Failed` or `TimedOut`. Nothing is kept between
//! runs: every call gets its own capture buffer and cancellation token, and
//! the executor builds a fresh evaluation environment.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::config::{CodepadConfig, EngineKind};
use crate::core_types::{ExecutionRequest, ExecutionResult};
use crate::errors::{CodepadError, ExecutionError};
use crate::executors::boa::EngineLimits;
use crate::executors::{BoaCodeExecutor, CaptureSink, CodeExecutor, NodeProcessExecutor, OutputSink};
use crate::validator::{CodeValidator, ValidationResult};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

pub struct CodeRunner {
    validator: CodeValidator,
    executor: Arc<dyn CodeExecutor>,
    timeout: Duration,
    echo_console: bool,
}

impl CodeRunner {
    pub fn new(executor: Arc<dyn CodeExecutor>) -> Self {
        Self {
            validator: CodeValidator::default(),
            executor,
            timeout: DEFAULT_TIMEOUT,
            echo_console: true,
        }
    }

    /// Runner backed by the embedded interpreter with default settings.
    pub fn embedded() -> Self {
        Self::new(Arc::new(BoaCodeExecutor::new()))
    }

    pub fn from_config(config: &CodepadConfig) -> Result<Self, CodepadError> {
        let runner_config = &config.runner;
        let executor: Arc<dyn CodeExecutor> = match runner_config.engine {
            EngineKind::Boa => Arc::new(BoaCodeExecutor::with_limits(EngineLimits {
                max_loop_iterations: runner_config.max_loop_iterations,
                recursion_limit: runner_config.recursion_limit,
            })),
            EngineKind::Node => Arc::new(NodeProcessExecutor::locate(&runner_config.node_binary)?),
        };

        log::info!(
            "Code runner using the {} engine with a {} ms budget",
            executor.name(),
            runner_config.timeout_ms
        );

        Ok(Self::new(executor)
            .with_timeout(runner_config.timeout())
            .with_validator(CodeValidator::new(runner_config.max_code_length))
            .with_console_echo(config.logging.echo_console))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_validator(mut self, validator: CodeValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_console_echo(mut self, echo: bool) -> Self {
        self.echo_console = echo;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn engine_name(&self) -> &'static str {
        self.executor.name()
    }

    pub fn validate(&self, source: &str) -> ValidationResult {
        self.validator.validate(source)
    }

    pub async fn run_code(&self, source: &str) -> ExecutionResult {
        self.run(source, None).await
    }

    /// Like [`run_code`](Self::run_code), additionally handing every console
    /// line to `observer` as soon as the snippet prints it.
    pub async fn run_code_with_observer(
        &self,
        source: &str,
        observer: Arc<dyn OutputSink>,
    ) -> ExecutionResult {
        self.run(source, Some(observer)).await
    }

    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        if request.input.is_some() {
            log::debug!("Ignoring request input; engines do not read stdin");
        }
        self.run_code(&request.source).await
    }

    async fn run(&self, source: &str, observer: Option<Arc<dyn OutputSink>>) -> ExecutionResult {
        let started = Instant::now();

        let validation = self.validator.validate(source);
        if !validation.is_valid {
            let message = validation
                .error
                .unwrap_or_else(|| "Code failed validation".to_string());
            log::info!("Rejected snippet before execution: {}", message);
            return ExecutionResult {
                output: String::new(),
                error: Some(ExecutionError::Validation(message).to_string()),
                execution_time: None,
            };
        }

        let mut capture = CaptureSink::new(self.echo_console);
        if let Some(observer) = observer {
            capture = capture.with_observer(observer);
        }
        let capture = Arc::new(capture);
        let sink: Arc<dyn OutputSink> = capture.clone();
        let cancel = CancellationToken::new();

        let execution = AssertUnwindSafe(self.executor.execute_code(source, &sink, cancel.clone()))
            .catch_unwind();
        let outcome = match tokio::time::timeout(self.timeout, execution).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(panic)) => Err(ExecutionError::Unknown(panic_message(panic.as_ref()))),
            Err(_) => {
                log::warn!(
                    "Snippet exceeded the {} ms budget on the {} engine",
                    self.timeout.as_millis(),
                    self.executor.name()
                );
                Err(ExecutionError::Timeout)
            }
        };
        // Whatever is still running stops reporting into this run.
        cancel.cancel();

        let execution_time = elapsed_millis(started);
        log::debug!(
            "Snippet finished in {} ms ({})",
            execution_time,
            outcome.as_ref().map(|_| "ok").unwrap_or_else(|e| e.kind())
        );

        shape_result(outcome, &capture, execution_time)
    }
}

fn shape_result(
    outcome: Result<Option<String>, ExecutionError>,
    capture: &CaptureSink,
    execution_time: f64,
) -> ExecutionResult {
    match outcome {
        Ok(completion) => {
            let output = if capture.is_empty() {
                completion.unwrap_or_default()
            } else {
                capture.joined()
            };
            ExecutionResult {
                output,
                error: None,
                execution_time: Some(execution_time),
            }
        }
        Err(e) => ExecutionResult {
            output: String::new(),
            error: Some(e.to_string()),
            execution_time: Some(execution_time),
        },
    }
}

/// Milliseconds since `started`, rounded to two decimals.
fn elapsed_millis(started: Instant) -> f64 {
    let millis = started.elapsed().as_secs_f64() * 1000.0;
    (millis * 100.0).round() / 100.0
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "executor panicked".to_string()
    }
}
