//! Stateful wrapper that a UI binds its "Run" and "Reset" buttons to.
//!
//! The session owns the editable code plus the latest result. Runs are tagged
//! with a generation number: a reset, or a newer run, makes a still-running
//! call stale, and a stale call never writes its result into the session.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::core_types::ExecutionResult;
use crate::runner::CodeRunner;

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub code: String,
    pub output: String,
    pub error: Option<String>,
    pub is_running: bool,
    pub execution_time: Option<f64>,
}

#[derive(Debug)]
struct SessionState {
    code: String,
    output: String,
    error: Option<String>,
    is_running: bool,
    execution_time: Option<f64>,
    generation: u64,
}

impl SessionState {
    fn fresh(code: String, generation: u64) -> Self {
        Self {
            code,
            output: String::new(),
            error: None,
            is_running: false,
            execution_time: None,
            generation,
        }
    }
}

pub struct CodeSession {
    runner: Arc<CodeRunner>,
    initial_code: String,
    state: RwLock<SessionState>,
}

impl CodeSession {
    pub fn new(runner: Arc<CodeRunner>, initial_code: impl Into<String>) -> Self {
        let initial_code = initial_code.into();
        Self {
            runner,
            state: RwLock::new(SessionState::fresh(initial_code.clone(), 0)),
            initial_code,
        }
    }

    pub fn initial_code(&self) -> &str {
        &self.initial_code
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read().await;
        SessionSnapshot {
            code: state.code.clone(),
            output: state.output.clone(),
            error: state.error.clone(),
            is_running: state.is_running,
            execution_time: state.execution_time,
        }
    }

    pub async fn set_code(&self, code: impl Into<String>) {
        self.state.write().await.code = code.into();
    }

    /// Run the current code and store the result.
    ///
    /// The result is returned even when a reset or a newer run made this call
    /// stale; it is only kept in the session when it is still current.
    pub async fn run(&self) -> ExecutionResult {
        let (code, generation) = {
            let mut state = self.state.write().await;
            state.generation += 1;
            state.is_running = true;
            state.output.clear();
            state.error = None;
            state.execution_time = None;
            (state.code.clone(), state.generation)
        };

        let result = self.runner.run_code(&code).await;

        let mut state = self.state.write().await;
        if state.generation == generation {
            state.output = result.output.clone();
            state.error = result.error.clone();
            state.execution_time = result.execution_time;
            state.is_running = false;
        } else {
            log::debug!("Discarding result of a superseded run");
        }
        result
    }

    /// Restore the initial code and clear every result field. Never runs code.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        let generation = state.generation + 1;
        *state = SessionState::fresh(self.initial_code.clone(), generation);
    }
}
