//! Common error types for mbbot

use thiserror::Error;

/// Common result type for mbbot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the mbbot crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credentials file missing or malformed
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// Invalid user input (e.g. a malformed identifier read from stdin)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
