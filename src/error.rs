//! Error types for the Gatekeeper service.

use thiserror::Error;

/// Main error type for Gatekeeper operations.
#[derive(Error, Debug)]
pub enum GatekeeperError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors raised while layering configuration sources
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Gatekeeper operations.
pub type Result<T> = std::result::Result<T, GatekeeperError>;
