//! One-shot, file-backed result handoff between the UI process and us.
//!
//! The channel owns a private temporary directory. The child is handed a path
//! inside it that does not exist yet; the child writes its JSON result there
//! and exits. We poll for the file with a bounded budget, parse it once, and
//! remove it. Dropping the channel removes the directory and anything left in
//! it, so the result path never outlives the invocation.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{FeedbackError, Result, ResultExt};

const RESULT_FILE_NAME: &str = "feedback-result.json";

/// Default interval between existence checks while waiting for the result
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub struct ResultChannel {
    dir: Option<TempDir>,
    path: PathBuf,
    poll_interval: Duration,
}

impl ResultChannel {
    /// Allocate a fresh, uniquely named result location under the system temp dir.
    pub fn open() -> Result<Self> {
        Self::open_in(std::env::temp_dir())
    }

    /// Allocate a result location under `base`.
    pub fn open_in(base: impl AsRef<Path>) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("interactive-feedback-")
            .tempdir_in(base)
            .map_err(FeedbackError::Resource)?;
        let path = dir.path().join(RESULT_FILE_NAME);
        debug!(path = %path.display(), "Result channel opened");

        Ok(Self {
            dir: Some(dir),
            path,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    /// Path the child must write its result to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait up to `timeout` for a complete JSON document, then tear the channel down.
    ///
    /// A file that exists but does not parse yet is re-read until the budget
    /// runs out, since the writer may still be mid-write.
    pub fn read_and_close(mut self, timeout: Duration) -> Result<Value> {
        let outcome = self.poll_for_document(timeout);
        self.remove_result_file();
        self.close_dir();
        outcome
    }

    /// Tear the channel down without reading (child failed or timed out).
    pub fn close(mut self) {
        self.remove_result_file();
        self.close_dir();
    }

    fn poll_for_document(&self, timeout: Duration) -> Result<Value> {
        let start = Instant::now();
        let mut last_parse_error: Option<serde_json::Error> = None;

        loop {
            match fs::read(&self.path) {
                Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                    Ok(value) => {
                        debug!(
                            bytes = bytes.len(),
                            waited_ms = start.elapsed().as_millis() as u64,
                            "Result file read"
                        );
                        return Ok(value);
                    }
                    Err(e) => last_parse_error = Some(e),
                },
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(FeedbackError::ResultRead(e)),
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(match last_parse_error {
                    Some(e) => FeedbackError::MalformedResult(e),
                    None => FeedbackError::ResultTimeout { waited: elapsed },
                });
            }
            thread::sleep(self.poll_interval.min(timeout - elapsed));
        }
    }

    fn remove_result_file(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Result file removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove result file"),
        }
    }

    fn close_dir(&mut self) {
        if let Some(dir) = self.dir.take() {
            dir.close().warn_on_err();
        }
    }
}

impl Drop for ResultChannel {
    fn drop(&mut self) {
        if self.dir.is_some() {
            self.remove_result_file();
            self.close_dir();
        }
    }
}
