//! Statistical drift tests.
//!
//! Each test compares one feature between the baseline and current windows
//! and returns a [`TestResult`]. Numeric features run the mean, median and
//! variance shift tests on summary statistics, plus KS and PSI on the raw
//! values. Categorical features run categorical PSI and a chi-squared
//! homogeneity test on category counts.
//!
//! # Example
//!
//! ```
//! use vigilar::drift::{mean_shift, DriftTest};
//!
//! let result = mean_shift(100.0, 115.0, 0.10);
//! assert_eq!(result.test, DriftTest::MeanShift);
//! assert!(result.drift_detected);
//! ```

// Statistical computation requires casts, similar variable names, and float literals
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::similar_names)]
#![allow(clippy::unreadable_literal)]
#![allow(clippy::suboptimal_flops)]

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use serde::{Deserialize, Serialize};

use crate::{
    config::{CategorySmoothing, DriftConfig, PsiBands},
    error::{Error, Result},
    stats::{category_counts, FeatureStats},
    window::{FeatureColumn, WindowRole},
};

/// Denominator floor for relative-change ratios.
pub const EPSILON: f64 = 1e-9;

/// Floor applied to bin proportions in PSI.
pub const PSI_FLOOR: f64 = 1e-4;

/// Statistical tests run by the battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftTest {
    /// Relative change of the mean.
    MeanShift,
    /// Relative change of the median.
    MedianShift,
    /// Relative change of the variance.
    VarianceShift,
    /// Two-sample Kolmogorov-Smirnov test.
    #[serde(rename = "ks_test")]
    KolmogorovSmirnov,
    /// Population Stability Index.
    Psi,
    /// Chi-squared homogeneity test on category counts.
    ChiSquared,
}

impl DriftTest {
    /// Tests run on numeric features.
    pub const NUMERIC: [Self; 5] = [
        Self::MeanShift,
        Self::MedianShift,
        Self::VarianceShift,
        Self::KolmogorovSmirnov,
        Self::Psi,
    ];

    /// Tests run on categorical features.
    pub const CATEGORICAL: [Self; 2] = [Self::Psi, Self::ChiSquared];

    /// Stable snake_case name used in reports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MeanShift => "mean_shift",
            Self::MedianShift => "median_shift",
            Self::VarianceShift => "variance_shift",
            Self::KolmogorovSmirnov => "ks_test",
            Self::Psi => "psi",
            Self::ChiSquared => "chi_squared",
        }
    }
}

impl fmt::Display for DriftTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// PSI severity band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PsiSeverity {
    /// Below the moderate band.
    Low,
    /// Soft warning.
    Moderate,
    /// Hard drift.
    High,
}

impl PsiSeverity {
    /// Classify a PSI value.
    pub fn from_psi(psi: f64, bands: &PsiBands) -> Self {
        if psi < bands.moderate {
            Self::Low
        } else if psi < bands.high {
            Self::Moderate
        } else {
            Self::High
        }
    }

    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
        }
    }
}

/// Outcome of one test on one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Test that produced this result.
    #[serde(rename = "test_name")]
    pub test: DriftTest,
    /// Raw statistic (relative change, D, PSI, or chi-squared).
    pub value: f64,
    /// Configured cutoff.
    pub threshold: f64,
    /// Whether the test fired.
    pub drift_detected: bool,
    /// p-value for KS and chi-squared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,
    /// Severity band for PSI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<PsiSeverity>,
}

impl TestResult {
    /// Whether this result counts toward the per-feature failing-test tally.
    pub fn counts_as_failure(&self, config: &DriftConfig) -> bool {
        self.drift_detected
            || (config.psi_moderate_counts_as_failure
                && self.severity == Some(PsiSeverity::Moderate))
    }
}

/// Results of every test run on one feature, keyed by test.
pub type FeatureTests = BTreeMap<DriftTest, TestResult>;

/// Number of results counting toward the alert tally.
pub fn failing_tests(tests: &FeatureTests, config: &DriftConfig) -> usize {
    tests
        .values()
        .filter(|r| r.counts_as_failure(config))
        .count()
}

// ========== Relative-change tests ==========

/// `|current - baseline| / |baseline|`.
///
/// # Errors
///
/// Returns [`Error::NumericInstability`] if `|baseline|` is below [`EPSILON`]
/// or either input is not finite.
pub fn relative_change(baseline: f64, current: f64) -> Result<f64> {
    if !baseline.is_finite() || !current.is_finite() {
        return Err(Error::numeric_instability(format!(
            "non-finite input: baseline={} current={}",
            baseline, current
        )));
    }
    if baseline.abs() < EPSILON {
        return Err(Error::numeric_instability(format!(
            "baseline value {} is too close to zero",
            baseline
        )));
    }
    Ok((current - baseline).abs() / baseline.abs())
}

/// Relative change with the denominator floored at [`EPSILON`].
fn floored_relative_change(test: DriftTest, baseline: f64, current: f64) -> f64 {
    let value = match relative_change(baseline, current) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(test = %test, error = %e, "Resolved with epsilon floor");
            (current - baseline).abs() / baseline.abs().max(EPSILON)
        }
    };
    saturate(test, value)
}

/// Non-finite statistics saturate to `f64::MAX`, which exceeds any threshold.
fn saturate(test: DriftTest, value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        tracing::warn!(test = %test, value = %value, "Statistic overflowed, reporting as drift");
        f64::MAX
    }
}

fn threshold_result(test: DriftTest, value: f64, threshold: f64) -> TestResult {
    TestResult {
        test,
        value,
        threshold,
        drift_detected: value > threshold,
        p_value: None,
        severity: None,
    }
}

/// Mean shift: fires when the relative mean change exceeds `threshold`.
pub fn mean_shift(baseline_mean: f64, current_mean: f64, threshold: f64) -> TestResult {
    let value = floored_relative_change(DriftTest::MeanShift, baseline_mean, current_mean);
    threshold_result(DriftTest::MeanShift, value, threshold)
}

/// Median shift: fires when the relative median change exceeds `threshold`.
pub fn median_shift(baseline_median: f64, current_median: f64, threshold: f64) -> TestResult {
    let value = floored_relative_change(DriftTest::MedianShift, baseline_median, current_median);
    threshold_result(DriftTest::MedianShift, value, threshold)
}

/// Variance shift: relative change of `std²`.
///
/// When either variance overflows, the change is computed from the std
/// ratio as `|(current / baseline)² - 1|`.
pub fn variance_shift(baseline_std: f64, current_std: f64, threshold: f64) -> TestResult {
    let baseline_var = baseline_std * baseline_std;
    let current_var = current_std * current_std;
    let value = if baseline_var.is_finite() && current_var.is_finite() {
        floored_relative_change(DriftTest::VarianceShift, baseline_var, current_var)
    } else {
        let ratio = current_std / baseline_std;
        saturate(DriftTest::VarianceShift, (ratio * ratio - 1.0).abs())
    };
    threshold_result(DriftTest::VarianceShift, value, threshold)
}

// ========== Kolmogorov-Smirnov ==========

/// Two-sample KS test; fires when the p-value is below `threshold`.
///
/// # Errors
///
/// Returns an error if either sample has no finite values.
pub fn ks_test(baseline: &[f64], current: &[f64], threshold: f64) -> Result<TestResult> {
    let mut base_sorted: Vec<f64> = baseline.iter().copied().filter(|x| x.is_finite()).collect();
    let mut cur_sorted: Vec<f64> = current.iter().copied().filter(|x| x.is_finite()).collect();

    if base_sorted.is_empty() {
        return Err(Error::insufficient_data(WindowRole::Baseline, 0, 1));
    }
    if cur_sorted.is_empty() {
        return Err(Error::insufficient_data(WindowRole::Current, 0, 1));
    }

    base_sorted.sort_by(f64::total_cmp);
    cur_sorted.sort_by(f64::total_cmp);

    let d = ks_statistic(&base_sorted, &cur_sorted);
    let p_value = ks_p_value(d, base_sorted.len(), cur_sorted.len());

    Ok(TestResult {
        test: DriftTest::KolmogorovSmirnov,
        value: d,
        threshold,
        drift_detected: p_value < threshold,
        p_value: Some(p_value),
        severity: None,
    })
}

/// Maximum distance between the empirical CDFs of two sorted samples.
pub fn ks_statistic(a_sorted: &[f64], b_sorted: &[f64]) -> f64 {
    if a_sorted.is_empty() || b_sorted.is_empty() {
        return 0.0;
    }

    let n1 = a_sorted.len() as f64;
    let n2 = b_sorted.len() as f64;
    let (mut i, mut j) = (0usize, 0usize);
    let mut d = 0.0_f64;

    while i < a_sorted.len() && j < b_sorted.len() {
        let x = a_sorted[i].min(b_sorted[j]);
        while i < a_sorted.len() && a_sorted[i] <= x {
            i += 1;
        }
        while j < b_sorted.len() && b_sorted[j] <= x {
            j += 1;
        }
        d = d.max((i as f64 / n1 - j as f64 / n2).abs());
    }

    d
}

/// Asymptotic p-value of a KS statistic for sample sizes `n1` and `n2`.
pub fn ks_p_value(d: f64, n1: usize, n2: usize) -> f64 {
    if d <= 0.0 || n1 == 0 || n2 == 0 {
        return 1.0;
    }
    let (n1, n2) = (n1 as f64, n2 as f64);
    let en = (n1 * n2 / (n1 + n2)).sqrt();
    kolmogorov_survival((en + 0.12 + 0.11 / en) * d)
}

/// `P(K > lambda)` for the Kolmogorov distribution.
fn kolmogorov_survival(lambda: f64) -> f64 {
    use std::f64::consts::PI;

    if lambda <= 0.0 {
        return 1.0;
    }

    if lambda < 1.18 {
        // Jacobi theta form converges quickly for small lambda
        let y = (-PI * PI / (8.0 * lambda * lambda)).exp();
        let cdf = (2.0 * PI).sqrt() / lambda * (y + y.powi(9) + y.powi(25) + y.powi(49));
        return (1.0 - cdf).clamp(0.0, 1.0);
    }

    let mut p = 0.0;
    for k in 1..=100 {
        let k_f = f64::from(k);
        let term = (-1.0_f64).powi(k - 1) * (-2.0 * k_f * k_f * lambda * lambda).exp();
        p += term;
        if term.abs() < 1e-12 {
            break;
        }
    }

    (2.0 * p).clamp(0.0, 1.0)
}

// ========== Population Stability Index ==========

/// Bin edges from baseline quantiles, outer edges at ±∞.
///
/// `sorted` must be sorted ascending and non-empty.
pub fn psi_bin_edges(sorted: &[f64], bins: usize) -> Vec<f64> {
    let mut edges: Vec<f64> = (0..=bins)
        .map(|i| crate::stats::quantile_sorted(sorted, i as f64 / bins as f64).unwrap_or(0.0))
        .collect();
    if let Some(first) = edges.first_mut() {
        *first = f64::NEG_INFINITY;
    }
    if let Some(last) = edges.last_mut() {
        *last = f64::INFINITY;
    }
    edges
}

/// Proportion of `values` falling in each bin.
///
/// Bins are half-open `[e_i, e_{i+1})` except the last, which is closed.
pub fn bin_proportions(values: &[f64], edges: &[f64]) -> Vec<f64> {
    let bins = edges.len().saturating_sub(1).max(1);
    let mut counts = vec![0usize; bins];
    for &v in values {
        let idx = edges.partition_point(|e| *e <= v).saturating_sub(1);
        counts[idx.min(bins - 1)] += 1;
    }
    let total = values.len().max(1) as f64;
    counts.into_iter().map(|c| c as f64 / total).collect()
}

/// `Σ (cur - base) · ln(cur / base)` with both proportions floored at [`PSI_FLOOR`].
pub fn psi(baseline: &[f64], current: &[f64]) -> f64 {
    baseline
        .iter()
        .zip(current)
        .map(|(b, c)| {
            let b = b.max(PSI_FLOOR);
            let c = c.max(PSI_FLOOR);
            (c - b) * (c / b).ln()
        })
        .sum()
}

fn psi_result(value: f64, bands: &PsiBands) -> TestResult {
    let severity = PsiSeverity::from_psi(value, bands);
    TestResult {
        test: DriftTest::Psi,
        value,
        threshold: bands.high,
        drift_detected: severity == PsiSeverity::High,
        p_value: None,
        severity: Some(severity),
    }
}

/// PSI of a numeric feature over baseline-quantile bins.
///
/// # Errors
///
/// Returns an error if either sample has no finite values.
pub fn psi_test(
    baseline: &[f64],
    current: &[f64],
    bins: usize,
    bands: &PsiBands,
) -> Result<TestResult> {
    let mut sorted: Vec<f64> = baseline.iter().copied().filter(|x| x.is_finite()).collect();
    let cur: Vec<f64> = current.iter().copied().filter(|x| x.is_finite()).collect();

    if sorted.is_empty() {
        return Err(Error::insufficient_data(WindowRole::Baseline, 0, 1));
    }
    if cur.is_empty() {
        return Err(Error::insufficient_data(WindowRole::Current, 0, 1));
    }
    sorted.sort_by(f64::total_cmp);

    let edges = psi_bin_edges(&sorted, bins.max(1));
    let value = psi(
        &bin_proportions(&sorted, &edges),
        &bin_proportions(&cur, &edges),
    );

    Ok(psi_result(value, bands))
}

/// PSI of a categorical feature, one bin per category.
pub fn categorical_psi(
    baseline: &BTreeMap<String, usize>,
    current: &BTreeMap<String, usize>,
    smoothing: CategorySmoothing,
    bands: &PsiBands,
) -> TestResult {
    let categories: BTreeSet<&String> = baseline.keys().chain(current.keys()).collect();
    let base_total = baseline.values().sum::<usize>() as f64;
    let cur_total = current.values().sum::<usize>() as f64;
    let k = categories.len() as f64;

    let proportion = |counts: &BTreeMap<String, usize>, total: f64, cat: &String| -> f64 {
        let count = counts.get(cat).copied().unwrap_or(0) as f64;
        match smoothing {
            CategorySmoothing::Floor => {
                if total > 0.0 {
                    count / total
                } else {
                    0.0
                }
            }
            CategorySmoothing::Additive { alpha } => (count + alpha) / (total + alpha * k),
        }
    };

    let base: Vec<f64> = categories
        .iter()
        .map(|c| proportion(baseline, base_total, c))
        .collect();
    let cur: Vec<f64> = categories
        .iter()
        .map(|c| proportion(current, cur_total, c))
        .collect();

    psi_result(psi(&base, &cur), bands)
}

// ========== Chi-squared ==========

/// Chi-squared homogeneity test on category counts.
///
/// Fires when the Wilson-Hilferty p-value is below `threshold`.
pub fn chi_squared_test(
    baseline: &BTreeMap<String, usize>,
    current: &BTreeMap<String, usize>,
    threshold: f64,
) -> TestResult {
    let categories: BTreeSet<&String> = baseline.keys().chain(current.keys()).collect();
    let n_base = baseline.values().sum::<usize>() as f64;
    let n_cur = current.values().sum::<usize>() as f64;
    let total = n_base + n_cur;

    let mut chi_sq = 0.0;
    if total > 0.0 {
        for cat in &categories {
            let b = baseline.get(*cat).copied().unwrap_or(0) as f64;
            let c = current.get(*cat).copied().unwrap_or(0) as f64;
            let row_total = b + c;

            let expected_b = row_total * n_base / total;
            let expected_c = row_total * n_cur / total;
            if expected_b > 0.0 {
                chi_sq += (b - expected_b).powi(2) / expected_b;
            }
            if expected_c > 0.0 {
                chi_sq += (c - expected_c).powi(2) / expected_c;
            }
        }
    }

    let df = categories.len().saturating_sub(1);
    let p_value = chi_squared_p_value(chi_sq, df);

    TestResult {
        test: DriftTest::ChiSquared,
        value: chi_sq,
        threshold,
        drift_detected: p_value < threshold,
        p_value: Some(p_value),
        severity: None,
    }
}

/// Upper-tail chi-squared p-value via the Wilson-Hilferty transformation.
pub fn chi_squared_p_value(chi_sq: f64, df: usize) -> f64 {
    if df == 0 || chi_sq <= 0.0 {
        return 1.0;
    }

    let k = df as f64;
    let z = ((chi_sq / k).cbrt() - (1.0 - 2.0 / (9.0 * k))) / (2.0 / (9.0 * k)).sqrt();

    (1.0 - standard_normal_cdf(z)).clamp(0.0, 1.0)
}

/// Standard normal CDF.
pub fn standard_normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Error function (Abramowitz and Stegun 7.1.26).
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}

// ========== Battery ==========

fn required(value: Option<f64>, role: WindowRole, stats: &FeatureStats) -> Result<f64> {
    value.ok_or_else(|| Error::insufficient_data(role, stats.count, 1))
}

/// Run every applicable test on one feature.
///
/// The columns must be of the same kind; the stats must have been computed
/// from those columns.
///
/// # Errors
///
/// Returns an error if a window has no usable values or the columns
/// disagree on kind.
pub fn run_battery(
    baseline: &FeatureColumn,
    current: &FeatureColumn,
    baseline_stats: &FeatureStats,
    current_stats: &FeatureStats,
    config: &DriftConfig,
) -> Result<FeatureTests> {
    let mut tests = FeatureTests::new();

    match (baseline, current) {
        (FeatureColumn::Numeric(_), FeatureColumn::Numeric(_)) => {
            let b = baseline_stats;
            let c = current_stats;

            let result = mean_shift(
                required(b.mean, WindowRole::Baseline, b)?,
                required(c.mean, WindowRole::Current, c)?,
                config.mean_threshold,
            );
            tests.insert(result.test, result);

            let result = median_shift(
                required(b.median, WindowRole::Baseline, b)?,
                required(c.median, WindowRole::Current, c)?,
                config.median_threshold,
            );
            tests.insert(result.test, result);

            let result = variance_shift(
                required(b.std, WindowRole::Baseline, b)?,
                required(c.std, WindowRole::Current, c)?,
                config.variance_threshold,
            );
            tests.insert(result.test, result);

            let base_values = baseline.numeric_values();
            let cur_values = current.numeric_values();

            let result = ks_test(&base_values, &cur_values, config.ks_pvalue_threshold)?;
            tests.insert(result.test, result);

            let result = psi_test(&base_values, &cur_values, config.psi_bins, &config.psi_bands)?;
            tests.insert(result.test, result);
        }
        (FeatureColumn::Categorical(base), FeatureColumn::Categorical(cur)) => {
            let base_counts = category_counts(base);
            let cur_counts = category_counts(cur);

            let result = categorical_psi(
                &base_counts,
                &cur_counts,
                config.category_smoothing,
                &config.psi_bands,
            );
            tests.insert(result.test, result);

            let result =
                chi_squared_test(&base_counts, &cur_counts, config.chi_squared_pvalue_threshold);
            tests.insert(result.test, result);
        }
        _ => {
            return Err(Error::schema_mismatch(
                "baseline and current columns have different kinds",
            ))
        }
    }

    Ok(tests)
}
