//! Tail of the feedback UI's stderr
//!
//! A UI that fails to start (no display, missing toolkit) says why on stderr.
//! A reader thread drains the pipe for the whole life of the process so the
//! child never blocks on a full pipe. Each line goes to the debug log, and
//! the most recent lines are kept for the `ProcessFailed` message.
//!
//! Undecodable bytes become U+FFFD rather than ending the capture.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

/// How much of the stream is retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailLimits {
    pub lines: usize,
    pub bytes: usize,
}

impl Default for TailLimits {
    fn default() -> Self {
        Self {
            lines: 500,
            bytes: 4 * 1024,
        }
    }
}

#[derive(Debug, Default)]
struct Retained {
    lines: VecDeque<String>,
    bytes: usize,
}

impl Retained {
    fn evict_oldest(&mut self) {
        if let Some(old) = self.lines.pop_front() {
            self.bytes -= old.len();
        }
    }
}

/// Most recent stderr lines, shared between the reader thread and the session.
#[derive(Debug, Clone, Default)]
pub struct StderrTail {
    retained: Arc<Mutex<Retained>>,
    limits: TailLimits,
}

impl StderrTail {
    pub fn new(limits: TailLimits) -> Self {
        Self {
            retained: Arc::default(),
            limits: TailLimits {
                lines: limits.lines.max(1),
                bytes: limits.bytes,
            },
        }
    }

    /// Append a line, dropping the oldest ones past either limit.
    ///
    /// A single line larger than the byte limit is still kept on its own.
    pub fn record(&self, line: String) {
        let mut retained = self.retained.lock();
        while !retained.lines.is_empty()
            && (retained.lines.len() >= self.limits.lines
                || retained.bytes + line.len() > self.limits.bytes)
        {
            retained.evict_oldest();
        }
        retained.bytes += line.len();
        retained.lines.push_back(line);
    }

    pub fn snapshot(&self) -> String {
        let retained = self.retained.lock();
        retained
            .lines
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn line_count(&self) -> usize {
        self.retained.lock().lines.len()
    }

    pub fn total_bytes(&self) -> usize {
        self.retained.lock().bytes
    }
}

/// A tail plus the thread filling it.
#[derive(Debug)]
pub struct StderrCapture {
    tail: StderrTail,
    reader: JoinHandle<()>,
}

impl StderrCapture {
    /// Wait up to `timeout` for the reader to hit end of stream.
    ///
    /// A grandchild that inherited the pipe keeps it open after the UI
    /// exits, so this must be bounded.
    pub fn finish_within(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.reader.is_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        true
    }

    /// Retained output once the reader is done or `timeout` passes.
    pub fn contents_after(&self, timeout: Duration) -> String {
        if !self.finish_within(timeout) {
            debug!("stderr still open after drain timeout, using partial output");
        }
        self.tail.snapshot()
    }

    pub fn tail(&self) -> &StderrTail {
        &self.tail
    }
}

/// Start draining `stderr` on a background thread.
pub fn capture_stderr<R: Read + Send + 'static>(stderr: R, label: String) -> StderrCapture {
    let tail = StderrTail::new(TailLimits::default());
    let sink = tail.clone();

    let reader = thread::spawn(move || {
        let mut reader = BufReader::new(stderr);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&raw)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    debug!(target: "feedback_ui", label = %label, "{}", line);
                    sink.record(line);
                }
                Err(e) => {
                    warn!(target: "feedback_ui", label = %label, error = %e, "stderr read failed");
                    break;
                }
            }
        }
    });

    StderrCapture { tail, reader }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tail(lines: usize, bytes: usize) -> StderrTail {
        StderrTail::new(TailLimits { lines, bytes })
    }

    #[test]
    fn test_tail_keeps_lines_in_order() {
        let t = tail(10, 1024);
        assert_eq!(t.snapshot(), "");

        t.record("qt.qpa.xcb: could not connect to display".to_string());
        t.record("Aborted".to_string());

        assert_eq!(t.line_count(), 2);
        assert_eq!(t.total_bytes(), 47);
        assert_eq!(t.snapshot(), "qt.qpa.xcb: could not connect to display\nAborted");
    }

    #[test]
    fn test_tail_drops_oldest_past_line_limit() {
        let t = tail(2, 1024);
        for word in ["alpha", "beta", "gamma"] {
            t.record(word.to_string());
        }
        assert_eq!(t.snapshot(), "beta\ngamma");
    }

    #[test]
    fn test_tail_drops_oldest_past_byte_limit() {
        let t = tail(100, 10);
        t.record("12345".to_string());
        t.record("67890".to_string());
        t.record("abc".to_string());

        assert_eq!(t.snapshot(), "67890\nabc");
        assert_eq!(t.total_bytes(), 8);
    }

    #[test]
    fn test_oversized_line_is_kept_alone() {
        let t = tail(100, 4);
        t.record("ab".to_string());
        t.record("much too long".to_string());
        assert_eq!(t.snapshot(), "much too long");
    }

    #[test]
    fn test_capture_reads_lossy_lines() {
        let input: &[u8] = b"first\r\nsecond \xff\xfe bytes\nno newline";
        let capture = capture_stderr(input, "test".to_string());

        assert!(capture.finish_within(Duration::from_secs(2)));
        assert_eq!(
            capture.contents_after(Duration::ZERO),
            "first\nsecond \u{FFFD}\u{FFFD} bytes\nno newline"
        );
        assert_eq!(capture.tail().line_count(), 3);
    }
}
