//! Fork, handshake, and supervision control flow
//!
//! The wrapper forks once. The child blocks on a one-byte handshake pipe,
//! applies resource limits, builds its environment, and execs the target.
//! The parent records the child pid for signal forwarding, closes its own
//! stdio, releases the child through the pipe, and waits for termination.
//!
//! Faults in the wrapper itself (pipe, fork, handler install, handshake
//! I/O, wait) exit with [`EXIT_LAUNCHER_FAULT`] so the caller can tell
//! them apart from anything the target program did.

use std::env;
use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicI32, Ordering};

use log::{debug, error};
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{execve, fork, pipe, ForkResult, Pid};

use crate::env::{build_child_env, env_to_cstrings};
use crate::error::{LaunchError, Result};
use crate::limits::LimitSpec;
use crate::outcome::{Outcome, EXIT_FAILED_EXEC};

/// Exit code for faults in the wrapper itself, distinct from any code or
/// signal number a supervised program can plausibly produce.
pub const EXIT_LAUNCHER_FAULT: i32 = 111;

/// Environment variable holding the resource-limit specification.
pub const RESOURCE_LIMITS_VAR: &str = "RUNWRAP_RESOURCE_LIMITS";

/// Environment variable naming the outcome report file.
pub const STATUS_FILE_VAR: &str = "RUNWRAP_STATUS_FILE";

/// Everything the wrapper needs to launch one child.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the program to execute; also becomes the child's argv[0].
    pub program: String,
    /// Arguments passed to the program verbatim.
    pub args: Vec<String>,
    /// Limits applied in the child before exec.
    pub limits: LimitSpec,
    /// Where to write the two-line outcome report, if anywhere.
    pub status_file: Option<PathBuf>,
}

impl Config {
    /// Read the launch configuration from the wrapper's own environment.
    pub fn from_env(program: String, args: Vec<String>) -> Self {
        let limits = env::var(RESOURCE_LIMITS_VAR)
            .map(|spec| LimitSpec::parse(&spec))
            .unwrap_or_default();
        let status_file = env::var_os(STATUS_FILE_VAR).map(PathBuf::from);
        Self {
            program,
            args,
            limits,
            status_file,
        }
    }
}

// Written once by the parent immediately after fork, read by the SIGTERM
// handler. The store happens before any blocking parent-side call, which
// is all the ordering the handler needs.
static CHILD_PID: AtomicI32 = AtomicI32::new(0);

extern "C" fn forward_sigterm(signo: libc::c_int) {
    // Async-signal-safe: one atomic load and one kill(2), nothing else.
    let pid = CHILD_PID.load(Ordering::SeqCst);
    if pid > 0 {
        unsafe {
            libc::kill(pid, signo);
        }
    }
}

fn install_sigterm_forwarder() -> Result<()> {
    use nix::sys::signal::{signal, SigHandler, Signal};

    // SAFETY: the handler only performs async-signal-safe operations.
    unsafe { signal(Signal::SIGTERM, SigHandler::Handler(forward_sigterm)) }
        .map(|_| ())
        .map_err(|e| LaunchError::Syscall(format!("sigaction(SIGTERM): {}", e)))
}

/// Launch the configured program and supervise it to termination.
///
/// Never returns: the child path ends in exec (or an exit code), and the
/// parent exits with the classified outcome code.
pub fn run(config: Config) -> ! {
    if let Err(err) = install_sigterm_forwarder() {
        fatal(err);
    }

    // One-shot pipe that delays the child's exec until the parent has
    // closed its copies of the shared stdio streams.
    let (ready_rx, ready_tx) = match pipe() {
        Ok(ends) => ends,
        Err(e) => fatal(LaunchError::Syscall(format!("pipe: {}", e))),
    };

    debug!("launching {} {:?}", config.program, config.args);

    // SAFETY: the wrapper is single threaded, so the child cannot inherit
    // a lock or allocator left mid-update by another thread.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => run_child(config, ready_rx, ready_tx),
        Ok(ForkResult::Parent { child }) => run_parent(child, ready_rx, ready_tx, config),
        Err(e) => fatal(LaunchError::Syscall(format!("fork: {}", e))),
    }
}

fn fatal(err: LaunchError) -> ! {
    error!("launcher fault: {}", err);
    process::exit(EXIT_LAUNCHER_FAULT)
}

fn run_child(config: Config, ready_rx: OwnedFd, ready_tx: OwnedFd) -> ! {
    drop(ready_tx);

    // Unexpected EOF or a read error here means the parent side of the
    // wrapper is broken, not the target program.
    if read_ready_byte(ready_rx.as_raw_fd()).is_err() {
        unsafe { libc::_exit(EXIT_LAUNCHER_FAULT) };
    }
    drop(ready_rx);

    // A limit that parsed but cannot be enforced must not be dropped.
    if config.limits.apply().is_err() {
        unsafe { libc::_exit(EXIT_LAUNCHER_FAULT) };
    }

    let inherited: Vec<(String, String)> = env::vars().collect();
    let child_env = match env_to_cstrings(&build_child_env(&inherited)) {
        Ok(child_env) => child_env,
        Err(_) => unsafe { libc::_exit(EXIT_LAUNCHER_FAULT) },
    };

    // Returns only if the target could not be executed.
    let _ = exec_target(&config.program, &config.args, &child_env);
    unsafe { libc::_exit(EXIT_FAILED_EXEC) }
}

fn run_parent(child: Pid, ready_rx: OwnedFd, ready_tx: OwnedFd, config: Config) -> ! {
    // Store before any blocking call so a SIGTERM delivered from here on
    // is forwarded to a live pid.
    CHILD_PID.store(child.as_raw(), Ordering::SeqCst);
    debug!("forked child {}", child);

    // The wrapper's stdin/stdout/stderr are pipes shared with the
    // invoking platform. Once they are closed the child holds the only
    // remaining references, so downstream readers see end-of-stream
    // exactly when the child is done with them.
    unsafe {
        libc::close(libc::STDIN_FILENO);
        libc::close(libc::STDOUT_FILENO);
        libc::close(libc::STDERR_FILENO);
    }

    drop(ready_rx);
    if write_ready_byte(ready_tx.as_raw_fd()).is_err() {
        process::exit(EXIT_LAUNCHER_FAULT);
    }
    drop(ready_tx);

    let status = match wait_for_child(child) {
        Ok(status) => status,
        Err(_) => process::exit(EXIT_LAUNCHER_FAULT),
    };

    let outcome = Outcome::classify(status);
    if let Some(path) = &config.status_file {
        outcome.write_report(path);
    }
    process::exit(outcome.code)
}

/// Block reading exactly one byte, retrying on EINTR.
fn read_ready_byte(fd: RawFd) -> Result<()> {
    let mut byte = 0u8;
    loop {
        // SAFETY: fd is the pipe read end, owned by this process.
        let rc = unsafe { libc::read(fd, &mut byte as *mut u8 as *mut libc::c_void, 1) };
        if rc == 1 {
            return Ok(());
        }
        if rc == 0 {
            return Err(LaunchError::Syscall(
                "handshake pipe closed before go signal".to_string(),
            ));
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(LaunchError::Io(err));
        }
    }
}

/// Write exactly one byte. No retry: a pipe write of a single byte either
/// succeeds or the wrapper is broken.
fn write_ready_byte(fd: RawFd) -> Result<()> {
    let byte = 1u8;
    // SAFETY: fd is the pipe write end, owned by this process.
    let rc = unsafe { libc::write(fd, &byte as *const u8 as *const libc::c_void, 1) };
    if rc != 1 {
        return Err(LaunchError::Io(io::Error::last_os_error()));
    }
    Ok(())
}

fn exec_target(program: &str, args: &[String], child_env: &[CString]) -> Result<()> {
    let program_c = CString::new(program)
        .map_err(|_| LaunchError::InvalidConfig("program path contains nul byte".to_string()))?;

    let mut argv = Vec::with_capacity(args.len() + 1);
    argv.push(program_c.clone());
    for arg in args {
        argv.push(
            CString::new(arg.as_str())
                .map_err(|_| LaunchError::InvalidConfig("argument contains nul byte".to_string()))?,
        );
    }

    execve(&program_c, &argv, child_env)
        .map_err(|e| LaunchError::Syscall(format!("execve: {}", e)))?;
    Ok(())
}

/// Wait for the specific child to terminate, retrying on EINTR.
fn wait_for_child(pid: Pid) -> Result<WaitStatus> {
    loop {
        match waitpid(pid, None) {
            Ok(status) => match status {
                WaitStatus::Exited(..) | WaitStatus::Signaled(..) => return Ok(status),
                _ => continue,
            },
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(LaunchError::Syscall(format!("waitpid: {}", e))),
        }
    }
}
