use super::*;
use crate::config::UiCommandConfig;
use crate::error::FeedbackError;
use crate::feedback::FeedbackRequest;
use crate::process_manager::ProcessRegistry;
use std::sync::Arc;
use crate::ui_args::UiLaunchArgs;
use std::path::Path;
use std::time::Duration;

const GRACE: Duration = Duration::from_millis(100);
const POLL: Duration = Duration::from_millis(10);

fn registry() -> Arc<ProcessRegistry> {
    Arc::new(ProcessRegistry::new())
}

#[cfg(unix)]
fn sh(script: &str) -> UiCommandConfig {
    // Launch args land in $1..$8, with the output path in $8
    UiCommandConfig::new("/bin/sh").with_args(["-c", script, "fake-ui"])
}

/// Poll `ps` until the process is gone or a zombie
#[cfg(unix)]
fn wait_until_dead(pid: u32) -> bool {
    for _ in 0..40 {
        let check = std::process::Command::new("ps")
            .args(["-p", &pid.to_string(), "-o", "state="])
            .output();
        match check {
            Ok(output) => {
                let state = String::from_utf8_lossy(&output.stdout);
                let state = state.trim();
                if state.is_empty() || state.starts_with('Z') || !output.status.success() {
                    return true;
                }
            }
            // No ps available; nothing more we can check
            Err(_) => return true,
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}

fn launch_args(output: &Path) -> UiLaunchArgs {
    UiLaunchArgs::from_request(&FeedbackRequest::new("Ready?"), output)
}

/// A `sleep` in its own process group that only this test can signal
#[cfg(unix)]
fn own_group_sleeper() -> std::process::Child {
    use std::os::unix::process::CommandExt;

    std::process::Command::new("sleep")
        .arg("30")
        .process_group(0)
        .spawn()
        .unwrap()
}

#[cfg(unix)]
#[test]
fn test_process_handle_double_kill_is_safe() {
    let mut child = own_group_sleeper();
    let mut handle = ProcessHandle::new(child.id(), "[test:double_kill]", GRACE, registry());

    handle.kill();
    handle.kill();

    assert!(handle.killed);
    assert!(!child.wait().unwrap().success());
}

#[cfg(unix)]
#[test]
fn test_process_handle_registers_and_drop_unregisters() {
    let mut child = own_group_sleeper();
    let pid = child.id();
    let registry = registry();
    let handle = ProcessHandle::new(pid, "[test:registry]", GRACE, Arc::clone(&registry));
    assert!(registry.is_registered(pid));
    assert!(!handle.killed);

    drop(handle);

    assert!(!registry.is_registered(pid));
    assert!(!child.wait().unwrap().success());
}

#[test]
fn test_resolve_program_falls_back_to_name() {
    let missing = "definitely-not-a-real-feedback-ui-binary";
    assert_eq!(resolve_program(missing), Path::new(missing));
}

#[test]
fn test_spawn_missing_program_is_spawn_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let command = UiCommandConfig::new("/nonexistent/feedback-ui");

    let err = spawn_ui(&command, &launch_args(&dir.path().join("out.json")), "[test]", GRACE, &registry())
        .unwrap_err();

    match err {
        FeedbackError::ProcessSpawn { program, .. } => {
            assert_eq!(program, "/nonexistent/feedback-ui")
        }
        other => panic!("expected ProcessSpawn, got {:?}", other),
    }
}

#[cfg(unix)]
#[test]
fn test_ui_receives_launch_args_in_order() {
    let dir = tempfile::TempDir::new().unwrap();
    let output = dir.path().join("out.json");
    let dump = dir.path().join("argv.txt");
    let script = format!(
        r#"printf '%s\n' "$@" > '{}'"#,
        dump.display()
    );

    let mut session = spawn_ui(&sh(&script), &launch_args(&output), "[test:argv]", GRACE, &registry())
        .unwrap();
    let outcome = session.wait_with_timeout(Duration::from_secs(10), POLL).unwrap();
    assert!(matches!(outcome, WaitOutcome::Exited(status) if status.success()));

    let argv = std::fs::read_to_string(&dump).unwrap();
    let lines: Vec<&str> = argv.lines().collect();
    assert_eq!(lines.len(), 8);
    assert_eq!(lines[0], "--prompt");
    assert_eq!(lines[1], "UmVhZHk/"); // base64("Ready?")
    assert_eq!(lines[2], "--default-prompt");
    assert_eq!(lines[4], "--predefined-options");
    assert_eq!(lines[6], "--output-file");
    assert_eq!(lines[7], output.to_string_lossy());
}

#[cfg(unix)]
#[test]
fn test_non_zero_exit_and_stderr_are_reported() {
    let dir = tempfile::TempDir::new().unwrap();
    let script = "echo 'display unavailable' >&2; exit 3";

    let mut session = spawn_ui(
        &sh(script),
        &launch_args(&dir.path().join("out.json")),
        "[test:fail]",
        GRACE,
        &registry(),
    )
    .unwrap();
    let outcome = session.wait_with_timeout(Duration::from_secs(10), POLL).unwrap();

    match outcome {
        WaitOutcome::Exited(status) => assert_eq!(status.code(), Some(3)),
        WaitOutcome::TimedOut => panic!("fake UI should have exited"),
    }
    assert_eq!(session.stderr_contents(), "display unavailable");
}

#[cfg(unix)]
#[test]
fn test_timeout_then_terminate_kills_process() {
    let dir = tempfile::TempDir::new().unwrap();
    let registry = registry();
    let mut session = spawn_ui(
        &sh("sleep 30"),
        &launch_args(&dir.path().join("out.json")),
        "[test:timeout]",
        GRACE,
        &registry,
    )
    .unwrap();
    let pid = session.pid();
    assert!(session.is_running());
    assert!(registry.is_registered(pid));

    let outcome = session
        .wait_with_timeout(Duration::from_millis(200), POLL)
        .unwrap();
    assert_eq!(outcome, WaitOutcome::TimedOut);

    session.terminate();
    assert!(!session.is_running());

    drop(session);
    assert!(!registry.is_registered(pid));
}

#[cfg(unix)]
#[test]
fn test_terminate_reaches_grandchildren() {
    let dir = tempfile::TempDir::new().unwrap();
    let pid_file = dir.path().join("grandchild.pid");
    let script = format!("sleep 30 & echo $! > '{}'; wait", pid_file.display());

    let mut session = spawn_ui(
        &sh(&script),
        &launch_args(&dir.path().join("out.json")),
        "[test:group]",
        GRACE,
        &registry(),
    )
    .unwrap();

    let mut grandchild = None;
    for _ in 0..200 {
        if let Ok(text) = std::fs::read_to_string(&pid_file) {
            if let Ok(pid) = text.trim().parse::<i32>() {
                grandchild = Some(pid);
                break;
            }
        }
        std::thread::sleep(POLL);
    }
    let grandchild = grandchild.expect("grandchild pid should be written");

    session.terminate();

    assert!(wait_until_dead(grandchild as u32), "grandchild should die with the group");
}

#[cfg(unix)]
#[test]
fn test_drop_kills_running_session() {
    let dir = tempfile::TempDir::new().unwrap();
    let registry = registry();
    let session = spawn_ui(
        &sh("sleep 30"),
        &launch_args(&dir.path().join("out.json")),
        "[test:drop]",
        GRACE,
        &registry,
    )
    .unwrap();
    let pid = session.pid();

    drop(session);

    assert!(!registry.is_registered(pid));
    assert!(wait_until_dead(pid), "process should be dead after drop");
}

#[cfg(unix)]
#[test]
fn test_clean_exit_releases_group_before_reap() {
    let dir = tempfile::TempDir::new().unwrap();
    let registry = registry();
    let mut session = spawn_ui(
        &sh("exit 0"),
        &launch_args(&dir.path().join("out.json")),
        "[test:clean_exit]",
        GRACE,
        &registry,
    )
    .unwrap();
    let pid = session.pid();

    let outcome = session.wait_with_timeout(Duration::from_secs(10), POLL).unwrap();

    assert!(matches!(outcome, WaitOutcome::Exited(status) if status.success()));
    // Reaped: untracked and never signalled again, even though the session lives on
    assert!(!registry.is_registered(pid));
    assert!(session.process_handle.killed);
    assert!(!session.is_running());
    session.terminate();
}

#[cfg(unix)]
#[test]
fn test_clean_exit_sweeps_leftover_grandchildren() {
    let dir = tempfile::TempDir::new().unwrap();
    let pid_file = dir.path().join("grandchild.pid");
    let script = format!("sleep 30 & echo $! > '{}'; exit 0", pid_file.display());

    let mut session = spawn_ui(
        &sh(&script),
        &launch_args(&dir.path().join("out.json")),
        "[test:sweep]",
        GRACE,
        &registry(),
    )
    .unwrap();
    let outcome = session.wait_with_timeout(Duration::from_secs(10), POLL).unwrap();
    assert!(matches!(outcome, WaitOutcome::Exited(status) if status.success()));

    let grandchild: u32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(wait_until_dead(grandchild), "leftover grandchild should be swept");
}
