//! runwrap: trusted process wrapper for untrusted programs
//!
//! Sits between a supervising build process and an untrusted child: it
//! applies resource limits, injects sandbox-support environment entries,
//! execs the target, and reports a normalized termination outcome.
//!
//! The interesting part is the handoff sequence: a one-byte pipe delays
//! the child's exec until the parent has closed its own copies of the
//! shared stdio streams, so limits and environment are fully established
//! before the first instruction of the target runs, and downstream pipe
//! readers see end-of-stream exactly once.

pub mod env;
pub mod error;
pub mod launcher;
pub mod limits;
pub mod outcome;

pub use error::{LaunchError, Result};
pub use launcher::{Config, EXIT_LAUNCHER_FAULT, RESOURCE_LIMITS_VAR, STATUS_FILE_VAR};
pub use limits::{Limit, LimitKind, LimitSpec};
pub use outcome::{Disposition, Outcome, EXIT_FAILED_EXEC};
