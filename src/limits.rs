//! Resource-limit specification parsing and application
//!
//! The limit specification is a single string of whitespace-separated
//! tokens of the form `-<kind><value>`, e.g. `-f4096 -t10 -v262144`.
//! Recognized kinds map to setrlimit(2) resources; unknown kinds and
//! malformed tokens are skipped so that older wrappers keep working when
//! the caller starts emitting new kinds.
//!
//! `apply` must run in the forked child before exec. Both the soft and
//! hard ceiling are set to the same value, so neither the child nor its
//! descendants can raise a limit back up.

use std::io;

use crate::error::{LaunchError, Result};

/// Resource kinds a limit token can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    /// Maximum file size, token value in KB (RLIMIT_FSIZE)
    FileSize,
    /// Maximum stack size, token value in KB (RLIMIT_STACK)
    StackSize,
    /// Maximum cumulative CPU time in seconds (RLIMIT_CPU)
    CpuTime,
    /// Maximum number of processes (RLIMIT_NPROC)
    ProcessCount,
    /// Maximum virtual address space, token value in KB (RLIMIT_AS)
    AddressSpace,
}

impl LimitKind {
    fn from_code(code: char) -> Option<Self> {
        match code {
            'f' => Some(LimitKind::FileSize),
            's' => Some(LimitKind::StackSize),
            't' => Some(LimitKind::CpuTime),
            'u' => Some(LimitKind::ProcessCount),
            'v' => Some(LimitKind::AddressSpace),
            _ => None,
        }
    }

    fn resource(self) -> libc::__rlimit_resource_t {
        match self {
            LimitKind::FileSize => libc::RLIMIT_FSIZE,
            LimitKind::StackSize => libc::RLIMIT_STACK,
            LimitKind::CpuTime => libc::RLIMIT_CPU,
            LimitKind::ProcessCount => libc::RLIMIT_NPROC,
            LimitKind::AddressSpace => libc::RLIMIT_AS,
        }
    }

    fn name(self) -> &'static str {
        match self {
            LimitKind::FileSize => "RLIMIT_FSIZE",
            LimitKind::StackSize => "RLIMIT_STACK",
            LimitKind::CpuTime => "RLIMIT_CPU",
            LimitKind::ProcessCount => "RLIMIT_NPROC",
            LimitKind::AddressSpace => "RLIMIT_AS",
        }
    }

    /// Convert a token value to the unit setrlimit expects.
    /// Size kinds are given in KB; CPU time and process count are used as-is.
    pub(crate) fn scaled(self, value: u64) -> u64 {
        match self {
            LimitKind::FileSize | LimitKind::StackSize | LimitKind::AddressSpace => value * 1024,
            LimitKind::CpuTime | LimitKind::ProcessCount => value,
        }
    }
}

/// One recognized limit: a kind and its raw (unscaled) token value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub kind: LimitKind,
    pub value: u64,
}

/// Per-token parse result. Tokens never fail the whole specification;
/// anything unrecognized or malformed becomes `Ignored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Limit(Limit),
    Ignored,
}

/// A parsed resource-limit specification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LimitSpec {
    limits: Vec<Limit>,
}

impl LimitSpec {
    /// Parse a specification string, keeping recognized tokens in order.
    pub fn parse(spec: &str) -> Self {
        let limits = spec
            .split_whitespace()
            .filter_map(|token| match parse_token(token) {
                Token::Limit(limit) => Some(limit),
                Token::Ignored => None,
            })
            .collect();
        Self { limits }
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }

    pub fn limits(&self) -> &[Limit] {
        &self.limits
    }

    /// Apply every recognized limit to the current process.
    ///
    /// Call this in the child process after fork. Limits are applied in
    /// token order; a repeated kind is applied each time, so the last
    /// occurrence wins. Once a token has parsed, failure to apply it is
    /// an error: a requested limit must never be dropped silently.
    pub fn apply(&self) -> Result<()> {
        for limit in &self.limits {
            set_rlimit(limit.kind, limit.kind.scaled(limit.value))?;
        }
        Ok(())
    }
}

fn parse_token(token: &str) -> Token {
    let rest = match token.strip_prefix('-') {
        Some(rest) => rest,
        None => return Token::Ignored,
    };
    let mut chars = rest.chars();
    let kind = match chars.next().and_then(LimitKind::from_code) {
        Some(kind) => kind,
        None => return Token::Ignored,
    };
    let digits = chars.as_str();
    // Reject anything that is not a plain decimal number, including an
    // empty value and a leading sign.
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Token::Ignored;
    }
    match digits.parse::<u64>() {
        Ok(value) => Token::Limit(Limit { kind, value }),
        Err(_) => Token::Ignored,
    }
}

fn set_rlimit(kind: LimitKind, value: u64) -> Result<()> {
    let rlim = libc::rlimit {
        rlim_cur: value as libc::rlim_t,
        rlim_max: value as libc::rlim_t,
    };

    let ret = unsafe { libc::setrlimit(kind.resource(), &rlim) };
    if ret != 0 {
        return Err(LaunchError::Syscall(format!(
            "setrlimit({}) failed: {}",
            kind.name(),
            io::Error::last_os_error()
        )));
    }
    Ok(())
}
