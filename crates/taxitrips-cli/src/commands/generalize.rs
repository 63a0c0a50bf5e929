//! `taxitrips generalize` command implementation

use super::{read_table, report_row_stats, write_table};
use crate::config::Config;
use crate::error::Result;
use std::path::Path;
use std::sync::Arc;
use taxitrips_engine::pipeline::{self, PROGRESS_INTERVAL};
use taxitrips_engine::region::{RegionIndex, Resolver};
use taxitrips_engine::table::SourceStats;
use tracing::info;

/// Replace coordinates with region bins
pub fn run(config: &Config, input: &Path, regions: &Path, output: Option<&Path>) -> Result<()> {
    let schema = config.load_schema()?;
    let settings = &schema.generalize;
    let index = RegionIndex::load_path(regions, &settings.id_property)?.with_precision(settings.precision)?;
    let resolver = Resolver::new(Arc::new(index));

    let stats = SourceStats::new();
    let options = config.transform_options(stats.clone());
    let table = pipeline::generalize(&read_table(input, stats.clone())?, &resolver, settings, &options)?
        .progress("generalize", PROGRESS_INTERVAL);

    let rows = write_table(&table, output)?;
    report_row_stats("generalize", rows, &stats);

    let lookups = resolver.stats();
    info!(
        hits = lookups.hits,
        misses = lookups.misses,
        containment_tests = lookups.containment_tests,
        "Region lookups"
    );
    Ok(())
}
