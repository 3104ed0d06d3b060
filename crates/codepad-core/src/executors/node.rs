//! Out-of-process evaluation through a `node` child process.
//!
//! The snippet is written into a wrapper script in a throwaway directory. The
//! wrapper replaces the console methods with writers that emit one JSON record
//! per line on stdout, runs the snippet as an async function body and reports
//! how it settled. Unlike the in-process engine, a cancelled run is stopped
//! for real: the child is killed.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tempfile::Builder;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use which::which;

use super::{never_settles, CodeExecutor, ConsoleLevel, OutputSink};
use crate::errors::{CodepadError, ExecutionError};

const PRELUDE: &str = r#"const __codepadWrite = process.stdout.write.bind(process.stdout);
const __codepadEmit = (record) => __codepadWrite(JSON.stringify(record) + "\n");
const __codepadFormat = (value) => {
  if (typeof value === "string") return value;
  if (typeof value === "object" && value !== null) {
    try { return JSON.stringify(value, null, 2); } catch (_) { return String(value); }
  }
  return String(value);
};
for (const level of ["log", "error", "warn", "info"]) {
  console[level] = (...args) =>
    __codepadEmit({ kind: "console", level, line: args.map(__codepadFormat).join(" ") });
}
(async function () {
"#;

const EPILOGUE: &str = r#"
})().then(
  (value) => __codepadEmit({ kind: "completed", value: value === undefined ? null : __codepadFormat(value) }),
  (error) => __codepadEmit({ kind: "failed", message: error instanceof Error ? error.message : String(error) }),
);
"#;

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum NodeRecord {
    Console { level: ConsoleLevel, line: String },
    Completed { value: Option<String> },
    Failed { message: String },
}

pub struct NodeProcessExecutor {
    program: PathBuf,
}

impl NodeProcessExecutor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Resolve `binary` on `PATH` (or accept it as a path) and build an executor for it.
    pub fn locate(binary: &str) -> Result<Self, CodepadError> {
        let program = which(binary).map_err(|e| {
            CodepadError::ExecutorError(format!("Could not find {} executable: {}", binary, e))
        })?;
        log::debug!("Using node binary at {}", program.display());
        Ok(Self::new(program))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

fn wrap_script(source: &str) -> String {
    let mut script = String::with_capacity(PRELUDE.len() + source.len() + EPILOGUE.len());
    script.push_str(PRELUDE);
    script.push_str(source);
    script.push_str(EPILOGUE);
    script
}

/// Message of the first `SomethingError: message` line node printed.
fn error_from_stderr(stderr: &str) -> Option<String> {
    static ERROR_LINE: OnceLock<Option<Regex>> = OnceLock::new();
    ERROR_LINE
        .get_or_init(|| Regex::new(r"(?m)^\w*Error: (.+)$").ok())
        .as_ref()?
        .captures(stderr)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn unknown(context: &str, err: impl std::fmt::Display) -> ExecutionError {
    ExecutionError::Unknown(format!("{}: {}", context, err))
}

#[async_trait]
impl CodeExecutor for NodeProcessExecutor {
    fn name(&self) -> &'static str {
        "node"
    }

    async fn execute_code(
        &self,
        source: &str,
        sink: &Arc<dyn OutputSink>,
        cancel: CancellationToken,
    ) -> Result<Option<String>, ExecutionError> {
        let temp_dir = Builder::new()
            .prefix("codepad-")
            .tempdir()
            .map_err(|e| unknown("could not create temporary directory", e))?;
        let script_path = temp_dir.path().join(format!("snippet_{}.js", Uuid::new_v4()));
        fs::write(&script_path, wrap_script(source))
            .await
            .map_err(|e| unknown("could not write snippet script", e))?;

        let mut child = Command::new(&self.program)
            .arg(&script_path)
            .current_dir(temp_dir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| unknown("could not start node", e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutionError::Unknown("node stdout was not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecutionError::Unknown("node stderr was not captured".to_string()))?;
        let stderr_reader = tokio::spawn(async move {
            let mut buffer = String::new();
            let _ = stderr.read_to_string(&mut buffer).await;
            buffer
        });

        let mut lines = BufReader::new(stdout).lines();
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => {
                    log::warn!("Killing node process {:?} after cancellation", child.id());
                    let _ = child.kill().await;
                    return Err(ExecutionError::Timeout);
                }
                line = lines.next_line() => line.map_err(|e| unknown("could not read node output", e))?,
            };

            let Some(line) = line else { break };
            let outcome = match serde_json::from_str::<NodeRecord>(&line) {
                Ok(NodeRecord::Console { level, line }) => {
                    sink.record(level, &line);
                    continue;
                }
                Ok(NodeRecord::Completed { value }) => Ok(value),
                Ok(NodeRecord::Failed { message }) => Err(ExecutionError::Runtime(message)),
                Err(_) => {
                    sink.record(ConsoleLevel::Log, &line);
                    continue;
                }
            };

            // Timers the snippet left behind are not part of the result.
            let _ = child.kill().await;
            return outcome;
        }

        let status = child
            .wait()
            .await
            .map_err(|e| unknown("could not wait for node", e))?;
        let stderr = stderr_reader.await.unwrap_or_default();

        if !status.success() {
            return Err(ExecutionError::Runtime(
                error_from_stderr(&stderr)
                    .unwrap_or_else(|| format!("node exited with {}", status)),
            ));
        }

        // The event loop drained without the wrapper promise settling.
        never_settles(&cancel).await
    }
}
