//! Configuration module - server settings
//!
//! This module provides functionality for:
//! - Loading configuration from ~/.interactive-feedback/config.json
//! - Environment variable overrides
//! - Default values for all settings
//!
//! # Module Structure
//!
//! - `defaults` - All default constant values
//! - `types` - Configuration struct definitions (Config, UiCommandConfig)
//! - `loader` - File system loading and parsing

mod defaults;
mod loader;
mod types;

pub use defaults::{
    DEFAULT_KILL_GRACE_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_RESULT_POLL_TIMEOUT_MS,
    DEFAULT_TIMEOUT_SECS, DEFAULT_UI_PROGRAM, ENV_TIMEOUT_SECS, ENV_UI_PROGRAM,
};

pub use types::{Config, UiCommandConfig};

pub use loader::{default_config_path, load_config};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
