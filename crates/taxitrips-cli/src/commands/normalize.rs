//! `taxitrips normalize` command implementation

use super::{report_row_stats, write_table};
use crate::config::Config;
use crate::error::{CliError, Result};
use std::path::Path;
use taxitrips_engine::pipeline::{self, VendorInput, PROGRESS_INTERVAL};
use taxitrips_engine::table::SourceStats;

/// Merge vendor exports into one normalized CSV
pub fn run(
    config: &Config,
    verifone: &[String],
    cmt: &[String],
    inputs: &[String],
    output: Option<&Path>,
) -> Result<()> {
    let schema = config.load_schema()?;
    let vendors = vendor_inputs(verifone, cmt, inputs)?;

    let stats = SourceStats::new();
    let options = config.transform_options(stats.clone());
    let table = pipeline::normalize(&schema, &vendors, &options)?.progress("normalize", PROGRESS_INTERVAL);

    let rows = write_table(&table, output)?;
    report_row_stats("normalize", rows, &stats);
    Ok(())
}

/// Collect vendor inputs from the dedicated flags and `VENDOR=GLOB` pairs.
pub fn vendor_inputs(verifone: &[String], cmt: &[String], inputs: &[String]) -> Result<Vec<VendorInput>> {
    let mut vendors = Vec::new();
    if !verifone.is_empty() {
        vendors.push(VendorInput::new("verifone", verifone.iter().cloned()));
    }
    if !cmt.is_empty() {
        vendors.push(VendorInput::new("cmt", cmt.iter().cloned()));
    }
    for spec in inputs {
        let (vendor, pattern) = spec
            .split_once('=')
            .filter(|(v, p)| !v.is_empty() && !p.is_empty())
            .ok_or_else(|| CliError::invalid_argument(format!("expected VENDOR=GLOB, got '{spec}'")))?;
        match vendors.iter_mut().find(|v| v.vendor == vendor) {
            Some(existing) => existing.patterns.push(pattern.to_string()),
            None => vendors.push(VendorInput::new(vendor, [pattern])),
        }
    }
    if vendors.is_empty() {
        return Err(CliError::invalid_argument(
            "no input files; pass --verifone, --cmt or --input VENDOR=GLOB",
        ));
    }
    Ok(vendors)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_vendor_inputs_merge_flags() {
        let vendors = vendor_inputs(
            &strings(&["v/*.csv"]),
            &[],
            &strings(&["cmt=c/*.csv", "verifone=more/*.csv"]),
        )
        .unwrap();
        assert_eq!(
            vendors,
            [
                VendorInput::new("verifone", ["v/*.csv", "more/*.csv"]),
                VendorInput::new("cmt", ["c/*.csv"]),
            ]
        );
    }

    #[test]
    fn test_vendor_inputs_rejects_bad_pairs() {
        assert!(vendor_inputs(&[], &[], &strings(&["nopattern"])).is_err());
        assert!(vendor_inputs(&[], &[], &strings(&["=x"])).is_err());
        assert!(vendor_inputs(&[], &[], &[]).is_err());
    }
}
