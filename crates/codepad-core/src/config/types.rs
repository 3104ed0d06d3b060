//! Configuration type definitions for the runner, logging and HTTP adapter
//!
//! Every field has a default, so an empty YAML document (or no file at all)
//! yields a working configuration: the embedded engine with a five second
//! budget.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::errors::CodepadError;
use crate::validator::DEFAULT_MAX_CODE_LENGTH;

/// Far beyond what a practice snippet needs, small enough that a runaway
/// loop left behind by a timeout finishes within minutes.
pub const DEFAULT_MAX_LOOP_ITERATIONS: u64 = 1_000_000_000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodepadConfig {
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerSettings,
}

/// Which environment evaluates snippets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Boa,
    Node,
}

impl std::str::FromStr for EngineKind {
    type Err = CodepadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "boa" => Ok(EngineKind::Boa),
            "node" | "nodejs" => Ok(EngineKind::Node),
            other => Err(CodepadError::ConfigError(format!(
                "Unknown engine '{}', expected 'boa' or 'node'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub engine: EngineKind,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// `0` disables the length guard.
    #[serde(default = "default_max_code_length")]
    pub max_code_length: usize,
    /// Per-loop iteration cap for the embedded engine. A timed out run keeps
    /// its thread, so this is what eventually stops an orphaned `while (true)`.
    /// `null` removes the cap.
    #[serde(default = "default_max_loop_iterations")]
    pub max_loop_iterations: Option<u64>,
    #[serde(default)]
    pub recursion_limit: Option<usize>,
    #[serde(default = "default_node_binary")]
    pub node_binary: String,
}

impl RunnerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            timeout_ms: default_timeout_ms(),
            max_code_length: default_max_code_length(),
            max_loop_iterations: default_max_loop_iterations(),
            recursion_limit: None,
            node_binary: default_node_binary(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Forward captured console lines to the host log.
    #[serde(default = "default_true")]
    pub echo_console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            echo_console: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, CodepadError> {
        self.bind_addr.parse().map_err(|e| {
            CodepadError::ConfigError(format!("Invalid bind address '{}': {}", self.bind_addr, e))
        })
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            enable_cors: true,
        }
    }
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_max_code_length() -> usize {
    DEFAULT_MAX_CODE_LENGTH
}

fn default_max_loop_iterations() -> Option<u64> {
    Some(DEFAULT_MAX_LOOP_ITERATIONS)
}

fn default_node_binary() -> String {
    "node".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:3030".to_string()
}

fn default_true() -> bool {
    true
}

impl CodepadConfig {
    pub fn validate(&self) -> Result<(), CodepadError> {
        if self.runner.timeout_ms == 0 {
            return Err(CodepadError::ConfigError(
                "Runner timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.runner.engine == EngineKind::Node && self.runner.node_binary.trim().is_empty() {
            return Err(CodepadError::ConfigError(
                "Runner node_binary cannot be empty when the node engine is selected".to_string(),
            ));
        }

        if self.logging.level.parse::<log::LevelFilter>().is_err() {
            return Err(CodepadError::ConfigError(format!(
                "Unknown log level '{}'",
                self.logging.level
            )));
        }

        self.server.socket_addr()?;
        Ok(())
    }
}
