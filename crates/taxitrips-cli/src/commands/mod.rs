//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod anonymize;
pub mod generalize;
pub mod normalize;
pub mod upload;
pub mod validate;

use crate::error::{CliError, Result};
use std::path::Path;
use std::sync::Arc;
use taxitrips_engine::table::{CsvOptions, SourceStats, Table};
use tracing::{info, warn};

/// Open a CSV input, failing early when the file does not exist.
pub fn read_table(path: &Path, stats: Arc<SourceStats>) -> Result<Table> {
    if !path.is_file() {
        return Err(CliError::invalid_argument(format!(
            "input file '{}' does not exist",
            path.display()
        )));
    }
    Ok(Table::from_csv(path, CsvOptions::new().stats(stats)))
}

/// Write `table` to `output`, or to stdout when no path is given.
pub fn write_table(table: &Table, output: Option<&Path>) -> Result<u64> {
    let rows = match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            table.to_csv_path(path)?
        }
        None => table.to_csv(std::io::stdout().lock())?,
    };
    Ok(rows)
}

/// Log what happened to rows that could not be read or converted.
pub fn report_row_stats(stage: &str, rows: u64, stats: &SourceStats) {
    info!(stage, rows, "Rows written");
    if stats.malformed() > 0 {
        warn!(stage, malformed = stats.malformed(), "Skipped malformed input rows");
    }
    if stats.truncated() > 0 {
        warn!(stage, truncated = stats.truncated(), "Rows longer than their header lost trailing values");
    }
    if stats.defaulted() > 0 {
        warn!(stage, defaulted = stats.defaulted(), "Values that failed to convert were left empty");
    }
}
