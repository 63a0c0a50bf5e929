//! Error types shared across the taxitrips crates

use thiserror::Error;

/// Result type alias for shared operations
pub type Result<T> = std::result::Result<T, TaxiError>;

/// Errors raised by shared infrastructure (logging, configuration, I/O).
///
/// Pipeline-level failures have their own enums in `taxitrips-engine`.
#[derive(Error, Debug)]
pub enum TaxiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TaxiError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
