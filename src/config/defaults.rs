//! Default configuration values
//!
//! All constants used throughout the config module are defined here.

/// Program launched to show the feedback dialog
pub const DEFAULT_UI_PROGRAM: &str = "feedback-prompt";

/// Wall-clock ceiling for one dialog, in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// How long to wait for the result file after the UI exits cleanly
pub const DEFAULT_RESULT_POLL_TIMEOUT_MS: u64 = 5_000;

/// Interval between process-exit and result-file checks
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Grace period after SIGTERM before escalating to SIGKILL
pub const DEFAULT_KILL_GRACE_MS: u64 = 250;

/// Config file location (tilde-expanded)
pub const DEFAULT_CONFIG_PATH: &str = "~/.interactive-feedback/config.json";

/// Environment variable overriding the UI program
pub const ENV_UI_PROGRAM: &str = "INTERACTIVE_FEEDBACK_UI";

/// Environment variable overriding the timeout
pub const ENV_TIMEOUT_SECS: &str = "INTERACTIVE_FEEDBACK_TIMEOUT_SECS";
