//! Feedback UI process spawning and supervision
//!
//! This module handles:
//! - Resolving the UI program (PATH lookup via `which`)
//! - Spawning it with the encoded request as discrete arguments
//! - Bounded waiting for exit
//! - Killing the whole process group on timeout

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};

#[cfg(unix)]
use std::os::unix::process::CommandExt;

use super::stderr_tail::{capture_stderr, StderrCapture};
use crate::config::UiCommandConfig;
use crate::error::{FeedbackError, Result};
use crate::logging;
use crate::process_manager::ProcessRegistry;
use crate::ui_args::UiLaunchArgs;

/// How long to wait for the stderr reader after exit before snapshotting
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

// Unix-specific process control using libc
#[cfg(unix)]
pub(crate) mod unix_process {
    use libc::{c_int, pid_t, ESRCH};

    /// Send a signal to a process group (negative PID targets the group)
    pub fn kill_process_group(pgid: u32, signal: c_int) -> Result<(), &'static str> {
        // Safety: kill() is a simple syscall with no memory safety concerns
        let rc = unsafe { libc::kill(-(pgid as pid_t), signal) };
        if rc == 0 {
            Ok(())
        } else {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            match errno {
                libc::ESRCH => Err("No such process group"),
                libc::EPERM => Err("Permission denied"),
                libc::EINVAL => Err("Invalid signal"),
                _ => Err("Unknown error"),
            }
        }
    }

    /// Check if any process in the group is still alive.
    ///
    /// EPERM means the group exists but we may not signal it; that counts as alive.
    pub fn process_group_alive(pgid: u32) -> bool {
        // Safety: kill() with signal 0 only checks existence
        let rc = unsafe { libc::kill(-(pgid as pid_t), 0) };
        if rc == 0 {
            true
        } else {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            errno != ESRCH
        }
    }

    /// Whether our child `pid` has exited, without reaping it.
    ///
    /// Until it is reaped the zombie keeps its PID, and with it the process
    /// group ID, reserved, so the group can still be signalled safely.
    pub fn child_exited_unreaped(pid: u32) -> std::io::Result<bool> {
        // Safety: siginfo_t is plain old data; all-zero is a valid value
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        // Safety: `info` is a valid, exclusively borrowed siginfo_t
        let rc = unsafe {
            libc::waitid(
                libc::P_PID,
                pid as libc::id_t,
                &mut info,
                libc::WEXITED | libc::WNOHANG | libc::WNOWAIT,
            )
        };
        if rc != 0 {
            return Err(std::io::Error::last_os_error());
        }
        // WNOHANG leaves `info` zeroed while the child is still running
        Ok(info.si_signo == libc::SIGCHLD)
    }

    pub const SIGTERM: c_int = libc::SIGTERM;
    pub const SIGKILL: c_int = libc::SIGKILL;
}

/// Resolve a program name through PATH, falling back to the name as given.
pub fn resolve_program(program: &str) -> PathBuf {
    match which::which(program) {
        Ok(path) => {
            logging::log("EXEC", &format!("Resolved {} -> {}", program, path.display()));
            path
        }
        Err(e) => {
            debug!(program = %program, error = %e, "Program not found on PATH, using as given");
            PathBuf::from(program)
        }
    }
}

/// Tracks the child's process group for cleanup.
///
/// The Drop impl kills the group unless the leader has been reaped, so this
/// must live as long as the session. Once the leader is reaped its PID may be
/// reused, and the handle never signals the group again.
#[derive(Debug)]
pub struct ProcessHandle {
    /// Process ID (also the PGID, since we spawn with process_group(0))
    pub(crate) pid: u32,
    pub(crate) killed: bool,
    grace: Duration,
    registry: Arc<ProcessRegistry>,
}

impl ProcessHandle {
    /// Track `pid` in `registry` until the handle is dropped.
    pub fn new(pid: u32, label: &str, grace: Duration, registry: Arc<ProcessRegistry>) -> Self {
        registry.register(pid, label);
        Self {
            pid,
            killed: false,
            grace,
            registry,
        }
    }

    /// Kill the process group with graceful escalation (Unix).
    ///
    /// 1. SIGTERM to the group
    /// 2. Poll group liveness for the grace period
    /// 3. SIGKILL if anything is left
    ///
    /// Calling it again is a no-op.
    pub fn kill(&mut self) {
        const POLL_INTERVAL: Duration = Duration::from_millis(25);

        if self.killed {
            return;
        }
        self.killed = true;

        #[cfg(unix)]
        {
            use unix_process::{kill_process_group, process_group_alive, SIGKILL, SIGTERM};

            let pgid = self.pid;
            match kill_process_group(pgid, SIGTERM) {
                Ok(()) => logging::log("EXEC", &format!("SIGTERM sent to PGID {}", pgid)),
                Err("No such process group") => return,
                Err(e) => {
                    logging::log(
                        "EXEC",
                        &format!("Failed to send SIGTERM to PGID {}: {}", pgid, e),
                    );
                }
            }

            let start = Instant::now();
            while start.elapsed() < self.grace {
                if !process_group_alive(pgid) {
                    logging::log(
                        "EXEC",
                        &format!("Process group {} terminated after SIGTERM", pgid),
                    );
                    return;
                }
                thread::sleep(POLL_INTERVAL);
            }

            logging::log(
                "EXEC",
                &format!(
                    "Process group {} still alive after {}ms, escalating to SIGKILL",
                    pgid,
                    self.grace.as_millis()
                ),
            );
            match kill_process_group(pgid, SIGKILL) {
                Ok(()) | Err("No such process group") => {}
                Err(e) => logging::log("EXEC", &format!("SIGKILL failed for PGID {}: {}", pgid, e)),
            }
        }
    }

    /// SIGKILL whatever is left in the group after the leader exited.
    ///
    /// Only call this while the leader is an unreaped zombie.
    fn sweep_survivors(&self) {
        #[cfg(unix)]
        if !self.killed {
            use unix_process::{kill_process_group, SIGKILL};

            match kill_process_group(self.pid, SIGKILL) {
                Ok(()) | Err("No such process group") => {}
                Err(e) => debug!(pgid = self.pid, error = e, "Group sweep failed"),
            }
        }
    }

    /// The leader is about to be reaped: stop tracking it and never signal
    /// its group again.
    fn release(&mut self) {
        self.killed = true;
        self.registry.unregister(self.pid);
    }

    #[cfg(unix)]
    pub fn is_alive(&self) -> bool {
        unix_process::process_group_alive(self.pid)
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.registry.unregister(self.pid);
        self.kill();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited(ExitStatus),
    TimedOut,
}

/// A running feedback UI process.
#[derive(Debug)]
pub struct UiSession {
    child: Child,
    stderr: Option<StderrCapture>,
    pub(crate) process_handle: ProcessHandle,
    program: String,
    reaped: bool,
}

impl UiSession {
    pub fn pid(&self) -> u32 {
        self.process_handle.pid
    }

    /// Whether the UI is still running. Never reaps it.
    pub fn is_running(&mut self) -> bool {
        !self.reaped && matches!(self.leader_exited(), Ok(false))
    }

    #[cfg(unix)]
    fn leader_exited(&mut self) -> io::Result<bool> {
        unix_process::child_exited_unreaped(self.pid())
    }

    // try_wait keeps the status for the later wait(); there are no groups to protect
    #[cfg(not(unix))]
    fn leader_exited(&mut self) -> io::Result<bool> {
        Ok(self.child.try_wait()?.is_some())
    }

    /// Sweep the group while the exited leader still pins its PGID, then reap.
    fn reap_exited(&mut self) -> io::Result<ExitStatus> {
        self.process_handle.sweep_survivors();
        self.process_handle.release();
        let status = self.child.wait()?;
        self.reaped = true;
        Ok(status)
    }

    /// Wait for exit, checking every `poll_interval`, for at most `limit`.
    pub fn wait_with_timeout(
        &mut self,
        limit: Duration,
        poll_interval: Duration,
    ) -> io::Result<WaitOutcome> {
        let start = Instant::now();
        loop {
            if self.leader_exited()? {
                let status = self.reap_exited()?;
                debug!(
                    pid = self.pid(),
                    status = %status,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Feedback UI exited"
                );
                return Ok(WaitOutcome::Exited(status));
            }
            let elapsed = start.elapsed();
            if elapsed >= limit {
                return Ok(WaitOutcome::TimedOut);
            }
            thread::sleep(poll_interval.min(limit - elapsed));
        }
    }

    /// Forcefully stop the process group and reap the child.
    ///
    /// A no-op once the child has been reaped.
    pub fn terminate(&mut self) {
        if self.reaped {
            return;
        }
        warn!(pid = self.pid(), program = %self.program, "Terminating feedback UI");
        self.process_handle.kill();
        // Non-Unix fallback, and the leader in case it left the group
        if let Err(e) = self.child.kill() {
            debug!(pid = self.pid(), error = %e, "Child kill failed");
        }
        self.process_handle.release();
        match self.child.wait() {
            Ok(status) => debug!(pid = self.pid(), status = %status, "Feedback UI reaped"),
            Err(e) => warn!(pid = self.pid(), error = %e, "Failed to reap feedback UI"),
        }
        self.reaped = true;
    }

    /// Captured stderr, after giving the reader a moment to hit EOF.
    pub fn stderr_contents(&self) -> String {
        match &self.stderr {
            Some(capture) => capture.contents_after(STDERR_DRAIN_TIMEOUT),
            None => String::new(),
        }
    }
}

impl Drop for UiSession {
    fn drop(&mut self) {
        // Never leave an unreaped child behind on an early return
        self.terminate();
    }
}

/// Spawn the feedback UI with the encoded request appended to its arguments.
///
/// stdin is null so the UI can never block on our input, and stdout is null
/// so nothing it prints can corrupt the JSON-RPC stream.
#[instrument(skip_all, fields(program = %command.program))]
pub fn spawn_ui(
    command: &UiCommandConfig,
    launch: &UiLaunchArgs,
    label: &str,
    kill_grace: Duration,
    registry: &Arc<ProcessRegistry>,
) -> Result<UiSession> {
    let executable = resolve_program(&command.program);

    let mut args: Vec<OsString> = command.args.iter().map(OsString::from).collect();
    args.extend(launch.to_args());

    debug!(
        executable = %executable.display(),
        leading_args = ?command.args,
        output_file = %launch.output_file.display(),
        "Spawning feedback UI"
    );

    let mut cmd = Command::new(&executable);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    // Own process group so a timeout kill reaches everything the UI started
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|source| {
        error!(error = %source, executable = %executable.display(), "Process spawn failed");
        FeedbackError::ProcessSpawn {
            program: command.program.clone(),
            source,
        }
    })?;

    let pid = child.id();
    info!(pid = pid, executable = %executable.display(), "Feedback UI spawned");

    let stderr = child
        .stderr
        .take()
        .map(|stderr| capture_stderr(stderr, label.to_string()));

    Ok(UiSession {
        child,
        stderr,
        process_handle: ProcessHandle::new(pid, label, kill_grace, Arc::clone(registry)),
        program: command.program.clone(),
        reaped: false,
    })
}
