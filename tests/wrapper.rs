//! End-to-end tests that run the compiled wrapper binary.
//!
//! The interesting behavior (fork, handshake, limits, exec, signal
//! forwarding) only exists across a process boundary, so every test here
//! spawns the wrapper as a real process and inspects its exit code, its
//! captured child output, and the status report file.

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use tempfile::{tempdir, TempDir};

const BIN: &str = env!("CARGO_BIN_EXE_runwrap");

const LIMITS_VAR: &str = "RUNWRAP_RESOURCE_LIMITS";
const STATUS_VAR: &str = "RUNWRAP_STATUS_FILE";
const PRELOAD_TRIGGER: &str = "RUNWRAP_LD_PRELOAD";
const HEAPSIZE_TRIGGER: &str = "RUNWRAP_HEAPSIZE";

fn wrapper_command(args: &[&str], envs: &[(&str, &str)]) -> Command {
    let mut cmd = Command::new(BIN);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    // Keep the test runner's own environment from triggering injection
    // or polluting the injected-variable assertions.
    for var in [
        LIMITS_VAR,
        STATUS_VAR,
        PRELOAD_TRIGGER,
        HEAPSIZE_TRIGGER,
        "LD_PRELOAD",
        "EASYSANDBOX_HEAPSIZE",
    ] {
        cmd.env_remove(var);
    }
    for (name, value) in envs {
        cmd.env(name, value);
    }
    cmd
}

fn run_wrapper(args: &[&str], envs: &[(&str, &str)]) -> Output {
    wrapper_command(args, envs)
        .output()
        .expect("failed to spawn wrapper")
}

/// Tempdir plus the status-file path inside it.
fn status_file() -> (TempDir, PathBuf, String) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("status");
    let as_str = path.to_str().unwrap().to_string();
    (dir, path, as_str)
}

fn read_report(path: &Path) -> (String, i32) {
    let contents = std::fs::read_to_string(path).expect("status file missing");
    let mut lines = contents.lines();
    let disposition = lines.next().expect("missing disposition line").to_string();
    let code = lines
        .next()
        .expect("missing code line")
        .parse()
        .expect("code line not numeric");
    assert_eq!(lines.next(), None, "report must have exactly two lines");
    (disposition, code)
}

#[test]
fn true_exits_zero() {
    let (_dir, path, path_str) = status_file();
    let output = run_wrapper(&["/bin/true"], &[(STATUS_VAR, &path_str)]);

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(read_report(&path), ("exited".to_string(), 0));
}

#[test]
fn exit_code_passes_through() {
    let (_dir, path, path_str) = status_file();
    let output = run_wrapper(
        &["/bin/sh", "-c", "exit 42"],
        &[(STATUS_VAR, &path_str)],
    );

    assert_eq!(output.status.code(), Some(42));
    assert_eq!(read_report(&path), ("exited".to_string(), 42));
}

#[test]
fn missing_binary_reports_failed_to_execute() {
    let (_dir, path, path_str) = status_file();
    let output = run_wrapper(&["/nonexistent/binary"], &[(STATUS_VAR, &path_str)]);

    assert_eq!(output.status.code(), Some(127));
    assert_eq!(read_report(&path), ("failed_to_execute".to_string(), 127));
}

/// A deliberate exit(127) is indistinguishable from an exec failure.
/// That conflation is part of the reporting contract, not a bug.
#[test]
fn exit_127_is_conflated_with_exec_failure() {
    let (_dir, path, path_str) = status_file();
    let output = run_wrapper(
        &["/bin/sh", "-c", "exit 127"],
        &[(STATUS_VAR, &path_str)],
    );

    assert_eq!(output.status.code(), Some(127));
    assert_eq!(read_report(&path), ("failed_to_execute".to_string(), 127));
}

#[test]
fn self_sigkill_reports_signal_number() {
    let (_dir, path, path_str) = status_file();
    let output = run_wrapper(
        &["/bin/sh", "-c", "kill -KILL $$"],
        &[(STATUS_VAR, &path_str)],
    );

    // The wrapper's own exit code mirrors the signal number.
    assert_eq!(output.status.code(), Some(libc::SIGKILL));
    assert_eq!(
        read_report(&path),
        ("terminated_by_signal".to_string(), libc::SIGKILL)
    );
}

#[test]
fn child_output_arrives_on_the_callers_pipes() {
    let output = run_wrapper(&["/bin/echo", "hello from the child"], &[]);

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "hello from the child\n");
}

#[test]
fn arguments_pass_through_verbatim() {
    let output = run_wrapper(&["/bin/echo", "-n", "a b", "-x"], &[]);

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "a b -x");
}

#[test]
fn cpu_limit_terminates_spinning_child() {
    let (_dir, path, path_str) = status_file();
    let output = run_wrapper(
        &["/bin/sh", "-c", "while : ; do : ; done"],
        &[(LIMITS_VAR, "-t1"), (STATUS_VAR, &path_str)],
    );

    assert_eq!(output.status.code(), Some(libc::SIGXCPU));
    assert_eq!(
        read_report(&path),
        ("terminated_by_signal".to_string(), libc::SIGXCPU)
    );
}

#[test]
fn limit_is_visible_inside_the_child() {
    let output = run_wrapper(
        &["/bin/sh", "-c", "ulimit -t"],
        &[(LIMITS_VAR, "-t7")],
    );

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "7");
}

#[test]
fn unknown_limit_tokens_do_not_reject_the_spec() {
    let output = run_wrapper(
        &["/bin/sh", "-c", "ulimit -t"],
        &[(LIMITS_VAR, "-x5 bogus -t7")],
    );

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "7");
}

#[test]
fn preload_trigger_injects_last_entry() {
    let output = run_wrapper(
        &["/usr/bin/env"],
        &[(PRELOAD_TRIGGER, "/no/such/sandbox.so")],
    );

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    // Injected entries are appended after every inherited one.
    assert_eq!(lines.last(), Some(&"LD_PRELOAD=/no/such/sandbox.so"));
    assert!(!stdout.contains("EASYSANDBOX_HEAPSIZE="));
}

#[test]
fn both_triggers_inject_in_fixed_order() {
    let output = run_wrapper(
        &["/usr/bin/env"],
        &[
            (HEAPSIZE_TRIGGER, "8388608"),
            (PRELOAD_TRIGGER, "/no/such/sandbox.so"),
        ],
    );

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    let n = lines.len();
    assert_eq!(lines[n - 2], "LD_PRELOAD=/no/such/sandbox.so");
    assert_eq!(lines[n - 1], "EASYSANDBOX_HEAPSIZE=8388608");
}

#[test]
fn no_triggers_leave_environment_alone() {
    let output = run_wrapper(&["/usr/bin/env"], &[]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("LD_PRELOAD="));
    assert!(!stdout.contains("EASYSANDBOX_HEAPSIZE="));
}

#[test]
fn status_file_is_optional() {
    let output = run_wrapper(&["/bin/sh", "-c", "exit 3"], &[]);

    // Without the report variable the exit code is the only channel.
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn unwritable_status_file_still_exits_with_outcome_code() {
    let output = run_wrapper(
        &["/bin/sh", "-c", "exit 5"],
        &[(STATUS_VAR, "/nonexistent-dir/deeper/status")],
    );

    // Report write failure is swallowed; the exit code is untouched.
    assert_eq!(output.status.code(), Some(5));
}

#[test]
fn sigterm_is_forwarded_to_the_child() {
    let (_dir, path, path_str) = status_file();
    let mut child = wrapper_command(&["/bin/sleep", "30"], &[(STATUS_VAR, &path_str)])
        .spawn()
        .expect("failed to spawn wrapper");

    // Give the wrapper time to fork and exec the target.
    std::thread::sleep(Duration::from_millis(500));
    unsafe {
        libc::kill(child.id() as i32, libc::SIGTERM);
    }

    let status = child.wait().unwrap();
    // The forwarded SIGTERM kills sleep; the wrapper itself exits
    // normally with the signal number as its code.
    assert_eq!(status.code(), Some(libc::SIGTERM));
    assert_eq!(
        read_report(&path),
        ("terminated_by_signal".to_string(), libc::SIGTERM)
    );
}
