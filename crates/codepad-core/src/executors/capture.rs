use std::sync::{Arc, Mutex};

use super::{ConsoleLevel, OutputSink};

pub const CONSOLE_LOG_TARGET: &str = "codepad::console";

/// Ordered in-memory buffer of console lines for a single run.
///
/// Lines are optionally echoed to the `log` facade so host-side debugging
/// still sees what the snippet printed, and can be teed to an observer that
/// wants them as they are produced.
pub struct CaptureSink {
    lines: Mutex<Vec<String>>,
    echo: bool,
    observer: Option<Arc<dyn OutputSink>>,
}

impl CaptureSink {
    pub fn new(echo: bool) -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
            echo,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn OutputSink>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self.lines.lock() {
            Ok(lines) => lines.is_empty(),
            Err(poisoned) => poisoned.into_inner().is_empty(),
        }
    }

    /// Captured lines joined with newlines.
    pub fn joined(&self) -> String {
        self.lines().join("\n")
    }
}

impl Default for CaptureSink {
    fn default() -> Self {
        Self::new(true)
    }
}

impl OutputSink for CaptureSink {
    fn record(&self, level: ConsoleLevel, line: &str) {
        match self.lines.lock() {
            Ok(mut lines) => lines.push(line.to_string()),
            Err(poisoned) => poisoned.into_inner().push(line.to_string()),
        }

        if self.echo {
            log::log!(
                target: CONSOLE_LOG_TARGET,
                level.log_level(),
                "console.{}: {}",
                level.method_name(),
                line
            );
        }

        if let Some(observer) = &self.observer {
            observer.record(level, line);
        }
    }
}
