//! Child environment construction
//!
//! The child execs with a copy of the wrapper's environment, optionally
//! extended with sandbox-support entries. Two trigger variables control
//! the injection: if `RUNWRAP_LD_PRELOAD` is present its value becomes the
//! child's `LD_PRELOAD`, and if `RUNWRAP_HEAPSIZE` is present its value
//! becomes `EASYSANDBOX_HEAPSIZE` (read by the EasySandbox runtime).
//! Injected entries are appended after all inherited ones, preload first.
//! The wrapper's own environment is never mutated.

use std::ffi::CString;

use crate::error::{LaunchError, Result};

/// Trigger variable: inject `LD_PRELOAD` into the child environment.
pub const PRELOAD_TRIGGER: &str = "RUNWRAP_LD_PRELOAD";

/// Trigger variable: inject `EASYSANDBOX_HEAPSIZE` into the child environment.
pub const HEAPSIZE_TRIGGER: &str = "RUNWRAP_HEAPSIZE";

const PRELOAD_VAR: &str = "LD_PRELOAD";
const HEAPSIZE_VAR: &str = "EASYSANDBOX_HEAPSIZE";

/// Build the environment the child execs with.
pub fn build_child_env(inherited: &[(String, String)]) -> Vec<(String, String)> {
    let mut env = inherited.to_vec();

    if let Some((_, path)) = inherited.iter().find(|(name, _)| name == PRELOAD_TRIGGER) {
        env.push((PRELOAD_VAR.to_string(), path.clone()));
    }
    if let Some((_, size)) = inherited.iter().find(|(name, _)| name == HEAPSIZE_TRIGGER) {
        env.push((HEAPSIZE_VAR.to_string(), size.clone()));
    }

    env
}

/// Convert name/value pairs into the `NAME=value` strings execve expects.
pub fn env_to_cstrings(env: &[(String, String)]) -> Result<Vec<CString>> {
    env.iter()
        .map(|(name, value)| {
            CString::new(format!("{}={}", name, value)).map_err(|_| {
                LaunchError::InvalidConfig(format!(
                    "environment variable {} contains nul byte",
                    name
                ))
            })
        })
        .collect()
}
