//! Configuration management for the codepad runner
//!
//! YAML configuration with per-field defaults, environment overrides and
//! validation.

pub mod loader;
pub mod types;


pub use loader::ConfigLoader;
pub use types::*;
