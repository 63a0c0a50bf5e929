//! `taxitrips upload` command implementation

use super::read_table;
use crate::config::Config;
use crate::error::{CliError, Result};
use crate::ColumnSet;
use std::path::Path;
use taxitrips_engine::pipeline;
use taxitrips_engine::sink::{with_store, ChunkedUpsertSink, SqliteStore};
use taxitrips_engine::table::SourceStats;
use tracing::warn;

/// Upsert a trips CSV into the database
pub fn run(
    config: &Config,
    input: &Path,
    chunk_size: Option<usize>,
    table: Option<&str>,
    columns: ColumnSet,
) -> Result<()> {
    let mut config = config.clone();
    if let Some(size) = chunk_size {
        config.chunk_size = size;
    }
    if let Some(table) = table {
        config.trips_table = table.to_string();
    }
    config.validate()?;

    let schema = config.load_schema()?;
    let columns = schema.column_set(columns.into());
    let stats = SourceStats::new();
    let trips = read_table(input, stats.clone())?;
    let sink = ChunkedUpsertSink::new(config.chunk_size)?;

    let summary = with_store(
        || SqliteStore::open(&config.database),
        |store| {
            store.ensure_table(&pipeline::upload_target(&config.trips_table, columns)?)?;
            Ok::<_, CliError>(pipeline::upload(&trips, store, &config.trips_table, columns, &sink)?)
        },
    )?;

    if stats.malformed() > 0 {
        warn!(malformed = stats.malformed(), "Skipped malformed input rows");
    }
    println!(
        "Uploaded {} rows to {} in {} chunks: {} inserted, {} updated, {} skipped (missing identity)",
        summary.rows_read,
        config.trips_table,
        summary.chunks,
        summary.inserted,
        summary.updated,
        summary.skipped_missing_identity
    );
    Ok(())
}
