//! Process Registry Module
//!
//! Tracks the feedback UI processes that are currently running so the server
//! can take them down when it shuts down (stdin EOF from the MCP client).
//!
//! Each invocation still owns its own child; the registry is only consulted
//! on shutdown and for diagnostics.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::logging;

/// Global registry of live UI processes
///
/// Invokers register here unless given their own registry.
pub static PROCESS_REGISTRY: LazyLock<Arc<ProcessRegistry>> =
    LazyLock::new(|| Arc::new(ProcessRegistry::new()));

/// Information about a tracked child process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    /// What the process is for (invocation id, program)
    pub label: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ProcessRegistry {
    active_processes: RwLock<HashMap<u32, ProcessInfo>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, pid: u32, label: &str) {
        logging::log(
            "PROC",
            &format!("Registering process PID {} ({})", pid, label),
        );
        self.active_processes.write().insert(
            pid,
            ProcessInfo {
                pid,
                label: label.to_string(),
                started_at: Utc::now(),
            },
        );
    }

    pub fn unregister(&self, pid: u32) {
        if self.active_processes.write().remove(&pid).is_some() {
            logging::log("PROC", &format!("Unregistered process PID {}", pid));
        }
    }

    pub fn active_processes(&self) -> Vec<ProcessInfo> {
        self.active_processes.read().values().cloned().collect()
    }

    pub fn active_count(&self) -> usize {
        self.active_processes.read().len()
    }

    pub fn is_registered(&self, pid: u32) -> bool {
        self.active_processes.read().contains_key(&pid)
    }

    /// SIGKILL every tracked process group and clear the registry.
    ///
    /// Returns how many processes were signalled.
    pub fn kill_all(&self) -> usize {
        let processes: Vec<ProcessInfo> = self.active_processes.write().drain().map(|(_, p)| p).collect();

        if processes.is_empty() {
            logging::log("PROC", "No active processes to kill");
            return 0;
        }

        logging::log(
            "PROC",
            &format!("Killing {} active process(es)", processes.len()),
        );

        for info in &processes {
            let age_ms = (Utc::now() - info.started_at).num_milliseconds();
            logging::log(
                "PROC",
                &format!(
                    "Killing process group {} ({}, running {}ms)",
                    info.pid, info.label, age_ms
                ),
            );
            kill_process_group(info.pid);
        }

        processes.len()
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use crate::executor::unix_process::{kill_process_group, SIGKILL};

    match kill_process_group(pid, SIGKILL) {
        Ok(()) => logging::log("PROC", &format!("Killed process group {}", pid)),
        Err("No such process group") => {
            logging::log("PROC", &format!("Process {} already exited", pid))
        }
        Err(e) => logging::log("PROC", &format!("Failed to kill process {}: {}", pid, e)),
    }
}

#[cfg(not(unix))]
fn kill_process_group(pid: u32) {
    // The owning UiSession kills its Child when the invocation unwinds
    logging::log(
        "PROC",
        &format!("Non-Unix platform: process {} left to its session", pid),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_unregister() {
        let registry = ProcessRegistry::new();
        registry.register(4242, "test:register");

        assert_eq!(registry.active_count(), 1);
        assert!(registry.is_registered(4242));
        let info = &registry.active_processes()[0];
        assert_eq!(info.pid, 4242);
        assert_eq!(info.label, "test:register");

        registry.unregister(4242);
        assert_eq!(registry.active_count(), 0);
        // Unregistering twice is harmless
        registry.unregister(4242);
    }

    #[test]
    fn test_kill_all_on_empty_registry() {
        let registry = ProcessRegistry::new();
        assert_eq!(registry.kill_all(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_kill_all_clears_and_signals() {
        use std::os::unix::process::CommandExt;
        use std::process::Command;

        let mut child = Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .unwrap();
        let registry = ProcessRegistry::new();
        registry.register(child.id(), "test:kill_all");

        assert_eq!(registry.kill_all(), 1);
        assert_eq!(registry.active_count(), 0);

        let status = child.wait().unwrap();
        assert!(!status.success());
    }
}
