//! Configuration loader for YAML files and environment overrides
//!
//! Environment variables win over file values:
//! `CODEPAD_ENGINE`, `CODEPAD_TIMEOUT_MS` and `CODEPAD_NODE_BINARY`.

use std::env;
use std::path::Path;
use tokio::fs;

use crate::config::types::*;
use crate::errors::CodepadError;

pub const ENV_ENGINE: &str = "CODEPAD_ENGINE";
pub const ENV_TIMEOUT_MS: &str = "CODEPAD_TIMEOUT_MS";
pub const ENV_NODE_BINARY: &str = "CODEPAD_NODE_BINARY";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<CodepadConfig, CodepadError> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).await.map_err(|e| {
            CodepadError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_str(&content)
    }

    /// Load the file when it exists, otherwise start from defaults.
    pub async fn from_optional_file<P: AsRef<Path>>(path: P) -> Result<CodepadConfig, CodepadError> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            log::info!("Loading configuration from file: {}", path.display());
            Self::from_file(path).await
        } else {
            log::debug!("No configuration at {}, using defaults", path.display());
            Self::finish(CodepadConfig::default())
        }
    }

    /// Load configuration from a YAML string
    pub fn from_str(content: &str) -> Result<CodepadConfig, CodepadError> {
        let config: CodepadConfig = if content.trim().is_empty() {
            CodepadConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| {
                CodepadError::ConfigError(format!("Failed to parse YAML config: {}", e))
            })?
        };

        Self::finish(config)
    }

    fn finish(mut config: CodepadConfig) -> Result<CodepadConfig, CodepadError> {
        Self::resolve_environment(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_environment(config: &mut CodepadConfig) -> Result<(), CodepadError> {
        if let Ok(engine) = env::var(ENV_ENGINE) {
            config.runner.engine = engine.parse()?;
        }

        if let Ok(timeout) = env::var(ENV_TIMEOUT_MS) {
            config.runner.timeout_ms = timeout.trim().parse().map_err(|e| {
                CodepadError::ConfigError(format!(
                    "{} must be a whole number of milliseconds, got '{}': {}",
                    ENV_TIMEOUT_MS, timeout, e
                ))
            })?;
        }

        if let Ok(binary) = env::var(ENV_NODE_BINARY) {
            config.runner.node_binary = binary;
        }

        Ok(())
    }
}
