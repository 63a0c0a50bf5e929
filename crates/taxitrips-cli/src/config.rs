//! Configuration for the taxitrips CLI
//!
//! Values come from `TAXITRIPS_*` environment variables (a `.env` file is
//! loaded first); command-line flags override them.

use crate::error::{CliError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use taxitrips_engine::schema::PipelineSchema;
use taxitrips_engine::sink::MAX_CHUNK_SIZE;
use taxitrips_engine::table::{ErrorPolicy, SourceStats, TransformOptions};

// ============================================================================
// Configuration Constants
// ============================================================================

/// SQLite database used when none is configured
pub const DEFAULT_DATABASE: &str = "taxitrips.db";

/// Rows per upsert chunk
pub const DEFAULT_CHUNK_SIZE: usize = taxitrips_engine::sink::DEFAULT_CHUNK_SIZE;

/// Table holding uploaded trips
pub const DEFAULT_TRIPS_TABLE: &str = "taxi_trips";

pub const ENV_DATABASE: &str = "TAXITRIPS_DATABASE";
pub const ENV_CHUNK_SIZE: &str = "TAXITRIPS_CHUNK_SIZE";
pub const ENV_TRIPS_TABLE: &str = "TAXITRIPS_TRIPS_TABLE";
pub const ENV_SCHEMA: &str = "TAXITRIPS_SCHEMA";
pub const ENV_FAIL_FAST: &str = "TAXITRIPS_FAIL_FAST";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database: PathBuf,
    pub chunk_size: usize,
    pub trips_table: String,
    /// Pipeline schema file; `None` uses the built-in schema
    pub schema: Option<PathBuf>,
    pub fail_fast: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            chunk_size: DEFAULT_CHUNK_SIZE,
            trips_table: DEFAULT_TRIPS_TABLE.to_string(),
            schema: None,
            fail_fast: false,
        }
    }
}

impl Config {
    /// Load from the environment, after reading `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_DATABASE) {
            config.database = PathBuf::from(path);
        }
        if let Some(size) = lookup(ENV_CHUNK_SIZE) {
            config.chunk_size = size
                .trim()
                .parse()
                .map_err(|_| CliError::config(format!("{ENV_CHUNK_SIZE} must be a number, got '{size}'")))?;
        }
        if let Some(table) = lookup(ENV_TRIPS_TABLE) {
            config.trips_table = table;
        }
        if let Some(path) = lookup(ENV_SCHEMA).filter(|p| !p.is_empty()) {
            config.schema = Some(PathBuf::from(path));
        }
        if let Some(flag) = lookup(ENV_FAIL_FAST) {
            config.fail_fast = parse_bool(&flag)
                .ok_or_else(|| CliError::config(format!("{ENV_FAIL_FAST} must be true or false, got '{flag}'")))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(CliError::config(format!(
                "chunk size must be between 1 and {MAX_CHUNK_SIZE}, got {}",
                self.chunk_size
            )));
        }
        if self.trips_table.trim().is_empty() {
            return Err(CliError::config("trips table name is empty"));
        }
        if self.database.as_os_str().is_empty() {
            return Err(CliError::config("database path is empty"));
        }
        Ok(())
    }

    pub fn load_schema(&self) -> Result<PipelineSchema> {
        Ok(match &self.schema {
            Some(path) => PipelineSchema::from_path(path)?,
            None => PipelineSchema::builtin()?,
        })
    }

    /// Row-level error handling for this run, sharing `stats`.
    pub fn transform_options(&self, stats: Arc<SourceStats>) -> TransformOptions {
        let policy = if self.fail_fast {
            ErrorPolicy::FailFast
        } else {
            ErrorPolicy::Lenient
        };
        TransformOptions::new(policy).with_stats(stats)
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
