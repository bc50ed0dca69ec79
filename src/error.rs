use std::time::Duration;

use thiserror::Error;
use tracing::{error, warn};

/// Failures of a single feedback invocation.
///
/// Every variant is fatal for the invocation it came from, but none of them
/// escape `FeedbackInvoker::invoke`: they are rendered into a single
/// `[error] Feedback UI failed: ...` text item instead.
#[derive(Error, Debug)]
pub enum FeedbackError {
    /// No writable temporary location for the result file
    #[error("could not allocate result file: {0}")]
    Resource(#[source] std::io::Error),

    #[error("could not start feedback UI '{program}': {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The OS could not report on the running UI process
    #[error("failed waiting for feedback UI: {0}")]
    ProcessWait(#[source] std::io::Error),

    /// The UI process exited with a non-zero status
    #[error("Failed to launch feedback UI (code {code}): {stderr}")]
    ProcessFailed { code: i32, stderr: String },

    /// The UI process outlived the wall-clock ceiling and was killed
    #[error("feedback UI did not finish within {}s", timeout.as_secs())]
    ProcessTimeout { timeout: Duration },

    /// The UI process exited cleanly but no result file ever appeared
    #[error("feedback UI did not produce output file after {}ms", waited.as_millis())]
    ResultTimeout { waited: Duration },

    #[error("Failed to parse feedback result JSON: {0}")]
    MalformedResult(#[source] serde_json::Error),

    #[error("Failed to read feedback result file: {0}")]
    ResultRead(#[source] std::io::Error),

    /// Parsed JSON that cannot be read as a feedback response
    #[error("invalid feedback result: {0}")]
    InvalidResponseShape(String),
}

impl FeedbackError {
    /// Stable label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Resource(_) => "resource",
            Self::ProcessSpawn { .. } => "process_spawn",
            Self::ProcessWait(_) => "process_wait",
            Self::ProcessFailed { .. } => "process_failed",
            Self::ProcessTimeout { .. } => "process_timeout",
            Self::ResultTimeout { .. } => "result_timeout",
            Self::MalformedResult(_) => "malformed_result",
            Self::ResultRead(_) => "result_read",
            Self::InvalidResponseShape(_) => "invalid_response_shape",
        }
    }

    /// Whether the UI simply closed without leaving a result behind.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::ResultTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, FeedbackError>;

/// Extension trait for silent error logging with caller location tracking.
/// Use when the operation is recoverable and the caller doesn't need to know.
///
/// # Examples
///
/// ```ignore
/// use interactive_feedback_mcp::error::ResultExt;
///
/// // Best-effort cleanup, never escalates
/// std::fs::remove_file(&path).warn_on_err();
/// ```
pub trait ResultExt<T> {
    /// Log error with caller location and return None. Use for recoverable failures.
    fn log_err(self) -> Option<T>;
    /// Log as warning with caller location and return None. Use for expected failures.
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn log_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                error!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation failed"
                );
                None
            }
        }
    }

    #[track_caller]
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                warn!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation had warning"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_failed_message_carries_code_and_stderr() {
        let err = FeedbackError::ProcessFailed {
            code: 2,
            stderr: "qt.qpa.plugin: could not load".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("code 2"));
        assert!(msg.contains("qt.qpa.plugin"));
        assert_eq!(err.kind(), "process_failed");
    }

    #[test]
    fn test_timeout_messages() {
        let err = FeedbackError::ProcessTimeout {
            timeout: Duration::from_secs(300),
        };
        assert!(err.to_string().contains("300s"));

        let err = FeedbackError::ResultTimeout {
            waited: Duration::from_millis(1500),
        };
        assert!(err.to_string().contains("1500ms"));
    }

    #[test]
    fn test_only_result_timeout_is_cancellation() {
        assert!(FeedbackError::ResultTimeout {
            waited: Duration::ZERO
        }
        .is_cancellation());
        assert!(!FeedbackError::ProcessTimeout {
            timeout: Duration::ZERO
        }
        .is_cancellation());
        assert!(!FeedbackError::InvalidResponseShape("x".into()).is_cancellation());
    }

    #[test]
    fn test_result_ext_passes_ok_through() {
        let ok: std::result::Result<u8, String> = Ok(7);
        assert_eq!(ok.log_err(), Some(7));

        let err: std::result::Result<u8, String> = Err("boom".into());
        assert_eq!(err.warn_on_err(), None);
    }
}
