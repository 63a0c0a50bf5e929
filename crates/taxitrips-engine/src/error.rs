//! Error types for the taxitrips engine
//!
//! Row-level problems (malformed CSV records, failed value computations in
//! lenient mode) are not errors: they are skipped or defaulted and counted in
//! [`crate::table::SourceStats`]. Everything here is fatal for the run that
//! raised it.

use thiserror::Error;

/// Result type alias for table operations
pub type Result<T> = std::result::Result<T, TableError>;

/// Failure of a single value conversion or field computation.
///
/// Converters and computed fields return this; the table engine decides
/// whether it becomes a null value or a [`TableError::FieldComputation`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ConvertError(pub String);

impl ConvertError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Errors raised while building or iterating a table
#[derive(Error, Debug)]
pub enum TableError {
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("Duplicate field: {0}")]
    DuplicateField(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Invalid index {index} for field {field} (header has {len} fields)")]
    InvalidFieldIndex {
        field: String,
        index: usize,
        len: usize,
    },

    /// A computed value failed for one row while running in fail-fast mode
    #[error("Failed to compute {field} for row {row}: {source}")]
    FieldComputation {
        field: String,
        row: u64,
        #[source]
        source: ConvertError,
    },

    #[error("Failed to convert {field} for row {row}: {source}")]
    Conversion {
        field: String,
        row: u64,
        #[source]
        source: ConvertError,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid glob pattern: {0}")]
    Glob(#[from] glob::PatternError),
}

impl TableError {
    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }
}

/// Backing store failures. Always fatal for the sink call that raised them.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid upsert target: {0}")]
    InvalidTarget(String),

    /// Upstream table failed while the sink was consuming it
    #[error("Table error: {0}")]
    Table(#[from] TableError),
}

impl StoreError {
    pub fn invalid_target(msg: impl Into<String>) -> Self {
        Self::InvalidTarget(msg.into())
    }
}

/// Region source loading failures
#[derive(Error, Debug)]
pub enum RegionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid GeoJSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid feature #{index}: {reason}")]
    InvalidFeature { index: usize, reason: String },

    #[error("Region collection has no version tag")]
    MissingVersion,

    #[error("Rounding precision {precision} is above the maximum of {max}")]
    InvalidPrecision { precision: u32, max: u32 },
}

/// Declared pipeline schema failures
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid schema TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid schema: {0}")]
    Invalid(String),
}

impl SchemaError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Any failure of a composed pipeline stage
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Region(#[from] RegionError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}
