//! Structured JSONL logging plus human-readable stderr output.
//!
//! This module provides dual-output logging:
//! - **JSONL to file** (~/.interactive-feedback/logs/interactive-feedback.jsonl)
//! - **Compact to stderr** - human-readable for developers
//!
//! Stdout is never written to: it carries the MCP JSON-RPC stream.
//!
//! # Usage
//!
//! ```rust,ignore
//! use interactive_feedback_mcp::logging;
//!
//! // Initialize logging - MUST keep guard alive for duration of program
//! let _guard = logging::init(None);
//!
//! tracing::info!(event_type = "server_start", "Server started");
//! ```

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use time::macros::format_description;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_NAME: &str = "interactive-feedback.jsonl";

/// Longest payload excerpt written to the logs
pub const MAX_LOGGED_PAYLOAD: usize = 256;

/// Guard that must be kept alive for the duration of the program.
/// Dropping this guard will flush and close the log file.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the dual-output logging system.
///
/// `log_dir` overrides the default `~/.interactive-feedback/logs`. If the log
/// file cannot be opened, only the stderr layer is installed.
pub fn init(log_dir: Option<&Path>) -> LoggingGuard {
    let log_dir = log_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(default_log_dir);
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("[LOGGING] Failed to create log directory: {}", e);
    }

    let log_path = log_dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| eprintln!("[LOGGING] Failed to open log file: {}", e))
        .ok();

    // Environment filter - default to info, allow override via RUST_LOG
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (json_layer, file_guard) = match file {
        Some(file) => {
            // Non-blocking so a slow disk never stalls the JSON-RPC loop
            let (non_blocking_file, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .json()
                .with_writer(non_blocking_file)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .with_span_events(FmtSpan::NONE);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // Wall-clock time only on stderr; the JSONL file carries full timestamps
    let stderr_timer = fmt::time::UtcTime::new(format_description!(
        "[hour]:[minute]:[second].[subsecond digits:3]"
    ));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(stderr_timer)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .compact();

    // try_init: a second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(stderr_layer)
        .try_init();

    tracing::info!(
        event_type = "app_lifecycle",
        action = "started",
        log_path = %log_path.display(),
        "Logging initialized"
    );

    LoggingGuard {
        _file_guard: file_guard,
    }
}

/// Get the default log directory path (~/.interactive-feedback/logs/)
pub fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".interactive-feedback").join("logs"))
        .unwrap_or_else(|| std::env::temp_dir().join("interactive-feedback-logs"))
}

/// Category-tagged log line.
///
/// Prefer tracing macros with structured fields for anything new.
pub fn log(category: &str, message: &str) {
    tracing::info!(category = category, "{}", message);
}

/// Shorten a payload (base64 images, full prompts) for logging.
///
/// Cuts on a char boundary and notes how much was dropped.
pub fn truncate_for_log(payload: &str, max_bytes: usize) -> String {
    if payload.len() <= max_bytes {
        return payload.to_string();
    }
    let mut end = max_bytes;
    while !payload.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[{} more bytes]", &payload[..end], payload.len() - end)
}
