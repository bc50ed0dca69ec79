//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::defaults::*;

// ============================================
// UI COMMAND
// ============================================

/// The program (and leading arguments) that renders the feedback dialog.
///
/// The encoded request arguments are appended after `args`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiCommandConfig {
    #[serde(default = "default_ui_program")]
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_ui_program() -> String {
    DEFAULT_UI_PROGRAM.to_string()
}

impl Default for UiCommandConfig {
    fn default() -> Self {
        UiCommandConfig {
            program: DEFAULT_UI_PROGRAM.to_string(),
            args: Vec::new(),
        }
    }
}

impl UiCommandConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

// ============================================
// MAIN CONFIG
// ============================================

/// Server configuration, loaded from `~/.interactive-feedback/config.json`.
///
/// Every field is optional in the file; use the getters for effective values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_command: Option<UiCommandConfig>,
    /// Wall-clock ceiling for one dialog (default: 300)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Wait for the result file after a clean exit (default: 5000)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_poll_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kill_grace_ms: Option<u64>,
    /// Instruction template shown with every prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_prompt: Option<String>,
    /// Directory for the JSONL log (default: ~/.interactive-feedback/logs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,
}

impl Config {
    pub fn get_ui_command(&self) -> UiCommandConfig {
        self.ui_command.clone().unwrap_or_default()
    }

    pub fn get_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn get_result_poll_timeout(&self) -> Duration {
        Duration::from_millis(
            self.result_poll_timeout_ms
                .unwrap_or(DEFAULT_RESULT_POLL_TIMEOUT_MS),
        )
    }

    pub fn get_poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS).max(1))
    }

    pub fn get_kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms.unwrap_or(DEFAULT_KILL_GRACE_MS))
    }

    /// Empty templates are treated as unset.
    pub fn get_default_prompt(&self) -> Option<&str> {
        self.default_prompt
            .as_deref()
            .filter(|prompt| !prompt.trim().is_empty())
    }

    pub fn get_log_dir(&self) -> Option<PathBuf> {
        self.log_dir
            .as_deref()
            .map(|dir| PathBuf::from(shellexpand::tilde(dir).as_ref()))
    }

    /// Apply `INTERACTIVE_FEEDBACK_*` overrides from a variable lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(program) = lookup(ENV_UI_PROGRAM).filter(|p| !p.trim().is_empty()) {
            let mut ui_command = self.get_ui_command();
            ui_command.program = program;
            self.ui_command = Some(ui_command);
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.timeout_secs = Some(secs),
                Err(e) => tracing::warn!(
                    value = %raw,
                    error = %e,
                    "Ignoring invalid {}", ENV_TIMEOUT_SECS
                ),
            }
        }
    }
}
