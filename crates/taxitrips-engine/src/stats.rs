//! Robust statistics for cross-vendor validation
//!
//! Trip lengths are heavy-tailed (meters left running, bad GPS), so groups are
//! compared after dropping values further than `scale` median absolute
//! deviations from the median.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Default MAD multiplier used when validating trip lengths
pub const DEFAULT_SCALE: f64 = 2.0;

/// Median of `values`, averaging the two middle values for even lengths.
/// `None` for an empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Keep the values within `scale` × MAD of the median, in input order.
pub fn filter_outliers(values: &[f64], scale: f64) -> Vec<f64> {
    let Some(m) = median(values) else {
        return Vec::new();
    };
    let dists: Vec<f64> = values.iter().map(|v| (v - m).abs()).collect();
    let mad = median(&dists).unwrap_or(0.0);
    let limit = mad * scale;
    values
        .iter()
        .copied()
        .filter(|v| (v - m).abs() <= limit)
        .collect()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Summary of one group after outlier filtering
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    pub group: String,
    pub samples: usize,
    pub kept: usize,
    pub mean: f64,
    pub std: f64,
}

/// Per-group statistics plus any parity violations found
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub stats: Vec<GroupStats>,
    pub violations: Vec<String>,
    /// Samples dropped before grouping because they did not parse
    pub skipped: u64,
}

impl ValidationReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Compare every pair of groups: a pair is a violation when their means are
/// further apart than the smaller of their standard deviations.
///
/// Groups left with no samples after filtering are reported as violations
/// and excluded from the pairwise comparison.
pub fn validate(groups: &BTreeMap<String, Vec<f64>>, scale: f64) -> ValidationReport {
    let mut report = ValidationReport::default();

    for (group, values) in groups {
        let kept = filter_outliers(values, scale);
        match (mean(&kept), std_dev(&kept)) {
            (Some(mean), Some(std)) => {
                debug!(group = %group, samples = values.len(), kept = kept.len(), mean, std, "Group statistics");
                report.stats.push(GroupStats {
                    group: group.clone(),
                    samples: values.len(),
                    kept: kept.len(),
                    mean,
                    std,
                });
            }
            _ => {
                warn!(group = %group, "Group has no usable samples");
                report.violations.push(format!("{group} has no usable samples"));
            }
        }
    }

    for (i, a) in report.stats.iter().enumerate() {
        for b in &report.stats[i + 1..] {
            let dist = (a.mean - b.mean).abs();
            if dist > a.std.min(b.std) {
                report.violations.push(format!(
                    "{} and {} samples are farther apart than expected",
                    a.group, b.group
                ));
            }
        }
    }
    report
}
