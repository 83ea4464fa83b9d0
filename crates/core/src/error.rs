//! Shared error type for engine collaborators

use thiserror::Error;

/// Errors surfaced by STT, translation, and TTS engines
#[derive(Error, Debug)]
pub enum Error {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("No backend available: {0}")]
    Unavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;
