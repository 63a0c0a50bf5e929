//! `taxitrips validate` command implementation
//!
//! Prints per-vendor trip length statistics and any parity violations.
//! Violations are findings, not failures: the command still succeeds.

use super::read_table;
use crate::config::Config;
use crate::error::{CliError, Result};
use std::path::Path;
use taxitrips_engine::pipeline;
use taxitrips_engine::stats::ValidationReport;
use taxitrips_engine::table::SourceStats;

pub fn run(config: &Config, input: &Path, scale: Option<f64>, json: bool) -> Result<()> {
    let schema = config.load_schema()?;
    let mut settings = schema.validate.clone();
    if let Some(scale) = scale {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(CliError::invalid_argument(format!("--scale must be positive, got {scale}")));
        }
        settings.scale = scale;
    }

    let report = pipeline::validate_trip_lengths(&read_table(input, SourceStats::new())?, &settings)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render(&report));
    }
    Ok(())
}

/// Plain-text rendering of a report
pub fn render(report: &ValidationReport) -> String {
    let mut out = format!(
        "{:<12} {:>10} {:>10} {:>10} {:>10}\n",
        "source", "samples", "kept", "mean", "std"
    );
    for s in &report.stats {
        out.push_str(&format!(
            "{:<12} {:>10} {:>10} {:>10.3} {:>10.3}\n",
            s.group, s.samples, s.kept, s.mean, s.std
        ));
    }
    if report.skipped > 0 {
        out.push_str(&format!("\n{} rows skipped (unparsable trip length)\n", report.skipped));
    }
    if report.is_consistent() {
        out.push_str("\nTrip lengths are consistent across sources\n");
    } else {
        out.push('\n');
        for violation in &report.violations {
            out.push_str(&format!("WARNING: {violation}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use taxitrips_engine::stats::GroupStats;

    #[test]
    fn test_render_lists_violations() {
        let report = ValidationReport {
            stats: vec![GroupStats {
                group: "cmt".to_string(),
                samples: 3,
                kept: 2,
                mean: 1.5,
                std: 0.5,
            }],
            violations: vec!["empty has no usable samples".to_string()],
            skipped: 1,
        };
        let text = render(&report);
        assert!(text.contains("cmt"));
        assert!(text.contains("1.500"));
        assert!(text.contains("1 rows skipped"));
        assert!(text.contains("WARNING: empty has no usable samples"));
    }
}
