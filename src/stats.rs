//! Per-feature summary statistics.
//!
//! [`FeatureStats::from_column`] is a pure function of one window's values
//! for one feature. Nulls are excluded from every moment but counted in
//! `null_count` and `null_percentage`.

#![allow(clippy::cast_precision_loss)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{schema::FeatureKind, window::FeatureColumn};

/// Summary statistics of one feature in one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    /// Declared kind.
    pub kind: FeatureKind,
    /// Rows in the window, nulls included.
    pub total_count: usize,
    /// Non-null values.
    pub count: usize,
    /// Null values.
    pub null_count: usize,
    /// Nulls as a percentage of `total_count` (0 to 100).
    pub null_percentage: f64,
    /// Arithmetic mean.
    pub mean: Option<f64>,
    /// Median (same as `p50`).
    pub median: Option<f64>,
    /// Sample standard deviation; 0 for fewer than two values.
    pub std: Option<f64>,
    /// Smallest value.
    pub min: Option<f64>,
    /// Largest value.
    pub max: Option<f64>,
    /// 25th percentile.
    pub p25: Option<f64>,
    /// 50th percentile.
    pub p50: Option<f64>,
    /// 75th percentile.
    pub p75: Option<f64>,
    /// Category proportions over observed categories (categorical only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequencies: Option<BTreeMap<String, f64>>,
}

impl FeatureStats {
    /// Compute statistics for one window's column.
    pub fn from_column(column: &FeatureColumn) -> Self {
        let total_count = column.len();
        let count = column.non_null_count();
        let null_count = total_count - count;
        let null_percentage = if total_count == 0 {
            0.0
        } else {
            null_count as f64 / total_count as f64 * 100.0
        };

        let mut stats = Self {
            kind: FeatureKind::Numeric,
            total_count,
            count,
            null_count,
            null_percentage,
            mean: None,
            median: None,
            std: None,
            min: None,
            max: None,
            p25: None,
            p50: None,
            p75: None,
            frequencies: None,
        };

        match column {
            FeatureColumn::Numeric(_) => {
                let mut values = column.numeric_values();
                if values.is_empty() {
                    return stats;
                }
                values.sort_by(f64::total_cmp);

                let mean = mean(&values);
                stats.mean = Some(mean);
                stats.std = Some(sample_std(&values, mean));
                stats.min = values.first().copied();
                stats.max = values.last().copied();
                stats.p25 = quantile_sorted(&values, 0.25);
                stats.p50 = quantile_sorted(&values, 0.5);
                stats.p75 = quantile_sorted(&values, 0.75);
                stats.median = stats.p50;
            }
            FeatureColumn::Categorical(values) => {
                stats.kind = FeatureKind::Categorical;
                let counts = category_counts(values);
                stats.frequencies = Some(
                    counts
                        .into_iter()
                        .map(|(k, c)| (k, c as f64 / count as f64))
                        .collect(),
                );
            }
        }

        stats
    }
}

/// Arithmetic mean; 0 for an empty slice.
///
/// Falls back to summing `v / n` when the plain sum overflows, so finite
/// inputs always give a finite mean.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let sum: f64 = values.iter().sum();
    if sum.is_finite() {
        sum / n
    } else {
        values.iter().map(|v| v / n).sum()
    }
}

/// Sample standard deviation (n - 1); 0 for fewer than two values.
///
/// Squared deviations that overflow are recomputed on values scaled by the
/// largest magnitude present.
pub fn sample_std(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let dof = (values.len() - 1) as f64;
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    if ss.is_finite() {
        return (ss / dof).sqrt();
    }

    let scale = values
        .iter()
        .fold(mean.abs(), |acc, v| acc.max(v.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return ss;
    }
    let scaled: f64 = values
        .iter()
        .map(|v| (v / scale - mean / scale).powi(2))
        .sum();
    (scaled / dof).sqrt() * scale
}

/// Quantile of sorted values by linear interpolation between closest ranks.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Count non-null categories.
pub fn category_counts(values: &[Option<String>]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for v in values.iter().flatten() {
        *counts.entry(v.clone()).or_insert(0) += 1;
    }
    counts
}
