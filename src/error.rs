//! Error types for the gate service.

use thiserror::Error;

/// Main error type for gate operations.
#[derive(Error, Debug)]
pub enum GateError {
    /// A setting required at startup is absent (database url, session secret)
    #[error("Missing configuration: {0}")]
    ConfigurationMissing(&'static str),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The counter store could not be reached or timed out
    #[error("Rate limit store unavailable: {0}")]
    RateStoreUnavailable(String),

    /// The session lookup failed or timed out
    #[error("Authentication lookup failed: {0}")]
    AuthLookup(String),

    /// Credentials were rejected. Deliberately carries no detail.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// An internal task failed
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for GateError {
    fn from(err: config::ConfigError) -> Self {
        GateError::Config(err.to_string())
    }
}

/// Result type alias for gate operations.
pub type Result<T> = std::result::Result<T, GateError>;
