//! Error types for the Turnstile service.

use thiserror::Error;

/// Main error type for Turnstile operations.
///
/// Note that an over-limit request is not an error: it is reported as
/// [`Decision::Reject`](crate::ratelimit::Decision::Reject).
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// The limiter was constructed with an unusable policy
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The caller supplied an empty client key
    #[error("Invalid client key: key must not be empty")]
    InvalidKey,

    /// Configuration loading or parsing errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Response encoding errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for TurnstileError {
    fn from(err: config::ConfigError) -> Self {
        TurnstileError::Config(err.to_string())
    }
}

impl From<serde_yaml::Error> for TurnstileError {
    fn from(err: serde_yaml::Error) -> Self {
        TurnstileError::Config(err.to_string())
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
