//! `taxitrips update-anon` and `taxitrips anonymize` command implementations

use super::{read_table, report_row_stats, write_table};
use crate::config::Config;
use crate::error::{CliError, Result};
use std::path::Path;
use taxitrips_engine::pipeline::{self, PROGRESS_INTERVAL};
use taxitrips_engine::sink::{with_store, SqliteStore};
use taxitrips_engine::table::SourceStats;

/// Register unseen raw values in every anonymization table
pub fn update(config: &Config, table: Option<&str>) -> Result<()> {
    let schema = config.load_schema()?;
    let trips_table = table.unwrap_or(&config.trips_table);

    let added = with_store(
        || SqliteStore::open(&config.database),
        |store| Ok::<_, CliError>(pipeline::update_anonymization(store, trips_table, &schema.anonymize)?),
    )?;

    for (ids_table, n) in added {
        println!("{ids_table}: {n} new ids");
    }
    Ok(())
}

/// Add anonymized id columns to a trips CSV
pub fn run(config: &Config, input: &Path, output: Option<&Path>) -> Result<()> {
    let schema = config.load_schema()?;
    let stats = SourceStats::new();
    let options = config.transform_options(stats.clone());
    let trips = read_table(input, stats.clone())?;

    // Mappings are loaded up front, so the store can close before writing
    let table = with_store(
        || SqliteStore::open(&config.database),
        |store| Ok::<_, CliError>(pipeline::anonymize(&trips, store, &schema.anonymize, &options)?),
    )?
    .progress("anonymize", PROGRESS_INTERVAL);

    let rows = write_table(&table, output)?;
    report_row_stats("anonymize", rows, &stats);
    Ok(())
}
