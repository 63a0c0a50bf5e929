//! Error types for the taxitrips CLI
//!
//! Messages are shown to the operator as-is, so each one says what to check.

use taxitrips_common::TaxiError;
use taxitrips_engine::error::{PipelineError, RegionError, SchemaError, StoreError, TableError};
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check your TAXITRIPS_* environment variables and flags.")]
    Config(String),

    /// Reading, transforming or writing a table failed
    #[error("Table error: {0}")]
    Table(#[from] TableError),

    /// Database operation failed
    #[error("Database error: {0}. Check the --database path and that the file is writable.")]
    Store(#[from] StoreError),

    /// Region collection could not be loaded
    #[error("Region file error: {0}. Expected a GeoJSON FeatureCollection with a version tag.")]
    Region(#[from] RegionError),

    /// Pipeline schema could not be loaded
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Common(#[from] TaxiError),

    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    #[error("Failed to write JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Input arguments are malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl CliError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

impl From<PipelineError> for CliError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Table(e) => Self::Table(e),
            PipelineError::Store(e) => Self::Store(e),
            PipelineError::Region(e) => Self::Region(e),
            PipelineError::Schema(e) => Self::Schema(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = CliError::config("chunk size must be positive");
        assert_eq!(
            err.to_string(),
            "Configuration error: chunk size must be positive. Check your TAXITRIPS_* environment variables and flags."
        );
    }

    #[test]
    fn test_pipeline_error_unwraps() {
        let err: CliError = PipelineError::from(TableError::FieldNotFound("Fare".to_string())).into();
        assert!(matches!(err, CliError::Table(TableError::FieldNotFound(_))));
        assert_eq!(err.to_string(), "Table error: Field not found: Fare");
    }
}
