//! Feedback UI process execution
//!
//! - Program resolution and spawning with the encoded request
//! - Bounded waits and process-group termination
//! - Stderr capture for failure reports

mod runner;
mod stderr_tail;

pub use runner::{resolve_program, spawn_ui, ProcessHandle, UiSession, WaitOutcome};

#[cfg(unix)]
pub(crate) use runner::unix_process;

pub use stderr_tail::{capture_stderr, StderrCapture, StderrTail, TailLimits};

#[cfg(test)]
#[path = "../executor_tests.rs"]
mod tests;
