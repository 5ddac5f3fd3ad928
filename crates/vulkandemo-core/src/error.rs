//! Error types shared across the engine.

use thiserror::Error;

/// Engine-wide error type for non-GPU failures.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration rejected during validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Platform error
    #[error("Platform error: {0}")]
    Platform(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
