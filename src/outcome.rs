//! Termination-status classification and reporting

use std::fmt;
use std::fs;
use std::path::Path;

use nix::sys::wait::WaitStatus;

/// Exit code meaning the target program could not be executed.
///
/// A child that legitimately calls exit(127) is indistinguishable from an
/// exec failure; callers accept that ambiguity.
pub const EXIT_FAILED_EXEC: i32 = 127;

/// How the child terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Exited,
    FailedToExecute,
    TerminatedBySignal,
}

impl Disposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::Exited => "exited",
            Disposition::FailedToExecute => "failed_to_execute",
            Disposition::TerminatedBySignal => "terminated_by_signal",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The classified termination outcome: a disposition plus the exit code
/// or signal number. This is the only result the wrapper reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub disposition: Disposition,
    pub code: i32,
}

impl Outcome {
    /// Classify a raw wait status.
    pub fn classify(status: WaitStatus) -> Self {
        match status {
            WaitStatus::Exited(_, code) if code == EXIT_FAILED_EXEC => Outcome {
                disposition: Disposition::FailedToExecute,
                code,
            },
            WaitStatus::Exited(_, code) => Outcome {
                disposition: Disposition::Exited,
                code,
            },
            WaitStatus::Signaled(_, signal, _) => Outcome {
                disposition: Disposition::TerminatedBySignal,
                code: signal as i32,
            },
            // Should not happen for a child waited without WUNTRACED.
            _ => Outcome {
                disposition: Disposition::FailedToExecute,
                code: -1,
            },
        }
    }

    /// Write the two-line report, creating or truncating the file.
    ///
    /// Best effort: a report that cannot be written must never mask the
    /// real outcome or block the wrapper's own exit.
    pub fn write_report(&self, path: &Path) {
        let _ = fs::write(path, format!("{}\n{}\n", self.disposition, self.code));
    }
}
