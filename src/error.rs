//! Error types for launcher operations

use std::io;
use thiserror::Error;

/// Result type for launcher operations
pub type Result<T> = std::result::Result<T, LaunchError>;

/// Errors that can occur while setting up or supervising the child process
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Syscall error: {0}")]
    Syscall(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
