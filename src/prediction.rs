//! Drift in model outputs.
//!
//! [`PredictionDriftMonitor`] compares baseline and current predictions of a
//! regression or classification model. Each test that fires is one signal;
//! an alert is raised when at least `alert_threshold` signals fire.

#![allow(clippy::cast_precision_loss)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    config::DriftConfig,
    drift::{
        categorical_psi, chi_squared_test, ks_test, mean_shift, median_shift, psi_test,
        relative_change, variance_shift, FeatureTests,
    },
    error::Result,
    schema::FeatureKind,
    stats::{category_counts, mean, quantile_sorted, sample_std},
    window::{FeatureColumn, Window},
};

/// Alert name for drifting regression outputs.
pub const REGRESSION_OUTPUT_DRIFT: &str = "regression_output_drift";

/// Alert name for drifting class distributions.
pub const CLASSIFICATION_OUTPUT_DRIFT: &str = "classification_output_drift";

/// Kind of model whose outputs are monitored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Continuous predictions.
    Regression,
    /// Class labels.
    Classification,
}

impl TaskType {
    fn kind(self) -> FeatureKind {
        match self {
            Self::Regression => FeatureKind::Numeric,
            Self::Classification => FeatureKind::Categorical,
        }
    }
}

/// Relative change of one prediction quantile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileShift {
    /// Quantile in `[0, 1]`.
    pub quantile: f64,
    /// Baseline value at the quantile.
    pub baseline: f64,
    /// Current value at the quantile.
    pub current: f64,
    /// Relative change.
    pub value: f64,
    /// Whether the change exceeds the variance threshold.
    pub drift_detected: bool,
}

/// Change in the share of one predicted class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassShift {
    /// Share of baseline predictions with this class.
    pub baseline_share: f64,
    /// Share of current predictions with this class.
    pub current_share: f64,
    /// Relative change of the share.
    pub value: f64,
    /// Whether the change exceeds the mean threshold.
    pub drift_detected: bool,
}

/// Outcome of comparing two sets of predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionDriftResult {
    /// Monitored task.
    pub task: TaskType,
    /// Non-null baseline predictions.
    pub baseline_samples: usize,
    /// Non-null current predictions.
    pub current_samples: usize,
    /// True when a window had fewer than `min_samples` predictions and no
    /// test ran.
    pub insufficient_samples: bool,
    /// Distribution tests.
    pub tests: FeatureTests,
    /// Quantile changes (regression only).
    pub quantile_drift: Vec<QuantileShift>,
    /// Per-class share changes (classification only).
    pub class_ratio_drift: BTreeMap<String, ClassShift>,
    /// Number of signals that fired.
    pub signals: usize,
    /// Raised alerts.
    pub alerts: Vec<String>,
    /// Whether any alert was raised.
    pub overall_drift: bool,
}

impl PredictionDriftResult {
    fn empty(task: TaskType, baseline_samples: usize, current_samples: usize) -> Self {
        Self {
            task,
            baseline_samples,
            current_samples,
            insufficient_samples: true,
            tests: FeatureTests::new(),
            quantile_drift: Vec::new(),
            class_ratio_drift: BTreeMap::new(),
            signals: 0,
            alerts: Vec::new(),
            overall_drift: false,
        }
    }
}

/// Compares baseline and current model outputs.
///
/// # Example
///
/// ```
/// use vigilar::{DriftConfig, PredictionDriftMonitor};
///
/// let monitor = PredictionDriftMonitor::new(DriftConfig::default()).unwrap();
/// let baseline: Vec<f64> = (0..200).map(|i| f64::from(i % 50)).collect();
/// let current: Vec<f64> = (0..200).map(|i| f64::from(i % 50) + 40.0).collect();
///
/// let result = monitor.regression(&baseline, &current).unwrap();
/// assert!(result.overall_drift);
/// assert_eq!(result.alerts, vec!["regression_output_drift".to_string()]);
/// ```
#[derive(Debug, Clone)]
pub struct PredictionDriftMonitor {
    config: DriftConfig,
    quantiles: Vec<f64>,
}

impl PredictionDriftMonitor {
    /// Creates a monitor checking the 0.25, 0.5, 0.75 and 0.95 quantiles.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid.
    pub fn new(config: DriftConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            quantiles: vec![0.25, 0.5, 0.75, 0.95],
        })
    }

    /// Replace the checked quantiles. Values outside `[0, 1]` are dropped.
    #[must_use]
    pub fn with_quantiles(mut self, quantiles: &[f64]) -> Self {
        self.quantiles = quantiles
            .iter()
            .copied()
            .filter(|q| (0.0..=1.0).contains(q))
            .collect();
        self
    }

    /// The thresholds in use.
    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Compare the prediction column of two windows.
    ///
    /// # Errors
    ///
    /// Returns an error if the column is missing from a window or cannot be
    /// read as the task's kind.
    pub fn compare(
        &self,
        task: TaskType,
        baseline: &Window,
        current: &Window,
        column: &str,
    ) -> Result<PredictionDriftResult> {
        let base = baseline.column(column, task.kind())?;
        let cur = current.column(column, task.kind())?;

        match (base, cur) {
            (FeatureColumn::Categorical(b), FeatureColumn::Categorical(c)) => {
                let b: Vec<String> = b.into_iter().flatten().collect();
                let c: Vec<String> = c.into_iter().flatten().collect();
                self.classification(&b, &c)
            }
            (b, c) => self.regression(&b.numeric_values(), &c.numeric_values()),
        }
    }

    /// Compare regression outputs. Non-finite values are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if a distribution test cannot run.
    pub fn regression(&self, baseline: &[f64], current: &[f64]) -> Result<PredictionDriftResult> {
        let mut base: Vec<f64> = baseline.iter().copied().filter(|v| v.is_finite()).collect();
        let mut cur: Vec<f64> = current.iter().copied().filter(|v| v.is_finite()).collect();

        let cfg = &self.config;
        if base.len() < cfg.min_samples || cur.len() < cfg.min_samples {
            tracing::debug!(
                baseline = base.len(),
                current = cur.len(),
                required = cfg.min_samples,
                "Prediction drift skipped: insufficient samples"
            );
            return Ok(PredictionDriftResult::empty(TaskType::Regression, base.len(), cur.len()));
        }

        base.sort_by(f64::total_cmp);
        cur.sort_by(f64::total_cmp);

        let base_mean = mean(&base);
        let cur_mean = mean(&cur);
        let base_median = quantile_sorted(&base, 0.5).unwrap_or(base_mean);
        let cur_median = quantile_sorted(&cur, 0.5).unwrap_or(cur_mean);

        let mut tests = FeatureTests::new();
        for result in [
            mean_shift(base_mean, cur_mean, cfg.mean_threshold),
            median_shift(base_median, cur_median, cfg.median_threshold),
            variance_shift(
                sample_std(&base, base_mean),
                sample_std(&cur, cur_mean),
                cfg.variance_threshold,
            ),
            ks_test(&base, &cur, cfg.ks_pvalue_threshold)?,
            psi_test(&base, &cur, cfg.psi_bins, &cfg.psi_bands)?,
        ] {
            tests.insert(result.test, result);
        }

        let quantile_drift = self
            .quantiles
            .iter()
            .filter_map(|&q| {
                let b = quantile_sorted(&base, q)?;
                let c = quantile_sorted(&cur, q)?;
                // Undefined for a zero baseline quantile.
                let value = relative_change(b, c).ok()?;
                Some(QuantileShift {
                    quantile: q,
                    baseline: b,
                    current: c,
                    value,
                    drift_detected: value > cfg.variance_threshold,
                })
            })
            .collect();

        let signals = tests.values().filter(|r| r.counts_as_failure(cfg)).count();
        Ok(self.finish(
            TaskType::Regression,
            base.len(),
            cur.len(),
            tests,
            quantile_drift,
            BTreeMap::new(),
            signals,
        ))
    }

    /// Compare predicted class labels.
    ///
    /// # Errors
    ///
    /// Currently infallible for non-empty inputs; the signature matches
    /// [`Self::regression`].
    pub fn classification<S: AsRef<str>>(
        &self,
        baseline: &[S],
        current: &[S],
    ) -> Result<PredictionDriftResult> {
        let cfg = &self.config;
        if baseline.len() < cfg.min_samples || current.len() < cfg.min_samples {
            tracing::debug!(
                baseline = baseline.len(),
                current = current.len(),
                required = cfg.min_samples,
                "Prediction drift skipped: insufficient samples"
            );
            return Ok(PredictionDriftResult::empty(
                TaskType::Classification,
                baseline.len(),
                current.len(),
            ));
        }

        let to_counts = |labels: &[S]| {
            let owned: Vec<Option<String>> =
                labels.iter().map(|s| Some(s.as_ref().to_string())).collect();
            category_counts(&owned)
        };
        let base_counts = to_counts(baseline);
        let cur_counts = to_counts(current);
        let n_base = baseline.len() as f64;
        let n_cur = current.len() as f64;

        let class_ratio_drift: BTreeMap<String, ClassShift> = base_counts
            .iter()
            .filter_map(|(class, &count)| {
                let baseline_share = count as f64 / n_base;
                let current_share = cur_counts.get(class).copied().unwrap_or(0) as f64 / n_cur;
                let value = relative_change(baseline_share, current_share).ok()?;
                Some((
                    class.clone(),
                    ClassShift {
                        baseline_share,
                        current_share,
                        value,
                        drift_detected: value > cfg.mean_threshold,
                    },
                ))
            })
            .collect();

        let mut tests = FeatureTests::new();
        for result in [
            categorical_psi(&base_counts, &cur_counts, cfg.category_smoothing, &cfg.psi_bands),
            chi_squared_test(&base_counts, &cur_counts, cfg.chi_squared_pvalue_threshold),
        ] {
            tests.insert(result.test, result);
        }

        let ratio_signal = class_ratio_drift.values().any(|s| s.drift_detected);
        let signals = usize::from(ratio_signal)
            + tests.values().filter(|r| r.counts_as_failure(cfg)).count();

        Ok(self.finish(
            TaskType::Classification,
            baseline.len(),
            current.len(),
            tests,
            Vec::new(),
            class_ratio_drift,
            signals,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        task: TaskType,
        baseline_samples: usize,
        current_samples: usize,
        tests: FeatureTests,
        quantile_drift: Vec<QuantileShift>,
        class_ratio_drift: BTreeMap<String, ClassShift>,
        signals: usize,
    ) -> PredictionDriftResult {
        let mut alerts = Vec::new();
        if signals >= self.config.alert_threshold {
            alerts.push(
                match task {
                    TaskType::Regression => REGRESSION_OUTPUT_DRIFT,
                    TaskType::Classification => CLASSIFICATION_OUTPUT_DRIFT,
                }
                .to_string(),
            );
        }
        let overall_drift = !alerts.is_empty();
        if overall_drift {
            tracing::info!(task = ?task, signals, "Prediction drift detected");
        }

        PredictionDriftResult {
            task,
            baseline_samples,
            current_samples,
            insufficient_samples: false,
            tests,
            quantile_drift,
            class_ratio_drift,
            signals,
            alerts,
            overall_drift,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::{
        array::{Float64Array, RecordBatch, StringArray},
        datatypes::{DataType, Field, Schema},
    };

    use super::*;
    use crate::{
        drift::DriftTest,
        window::{WindowRange, WindowRole},
    };

    fn monitor() -> PredictionDriftMonitor {
        PredictionDriftMonitor::new(DriftConfig::default()).unwrap()
    }

    fn cycle(n: usize, period: usize, offset: f64) -> Vec<f64> {
        (0..n).map(|i| offset + (i % period) as f64).collect()
    }

    // ========== Regression tests ==========

    #[test]
    fn test_regression_stable() {
        let result = monitor()
            .regression(&cycle(500, 50, 100.0), &cycle(500, 50, 100.0))
            .unwrap();
        assert!(!result.insufficient_samples);
        assert_eq!(result.signals, 0);
        assert!(!result.overall_drift);
        assert_eq!(result.tests.len(), 5);
        assert_eq!(result.quantile_drift.len(), 4);
        assert!(result.quantile_drift.iter().all(|q| !q.drift_detected));
    }

    #[test]
    fn test_regression_shift_alerts() {
        let result = monitor()
            .regression(&cycle(500, 50, 100.0), &cycle(500, 50, 150.0))
            .unwrap();
        assert!(result.tests[&DriftTest::MeanShift].drift_detected);
        assert!(result.tests[&DriftTest::KolmogorovSmirnov].drift_detected);
        assert!(result.signals >= 2);
        assert_eq!(result.alerts, vec![REGRESSION_OUTPUT_DRIFT.to_string()]);
        assert!(result.quantile_drift.iter().any(|q| q.drift_detected));
    }

    #[test]
    fn test_regression_below_min_samples() {
        let result = monitor()
            .regression(&cycle(10, 5, 0.0), &cycle(500, 50, 0.0))
            .unwrap();
        assert!(result.insufficient_samples);
        assert!(result.tests.is_empty());
        assert!(!result.overall_drift);
        assert_eq!(result.baseline_samples, 10);
    }

    #[test]
    fn test_regression_ignores_non_finite() {
        let mut base = cycle(100, 10, 1.0);
        base.push(f64::NAN);
        let result = monitor().regression(&base, &cycle(100, 10, 1.0)).unwrap();
        assert_eq!(result.baseline_samples, 100);
    }

    #[test]
    fn test_zero_baseline_quantile_is_skipped() {
        let base: Vec<f64> = (0..100).map(|i| if i < 60 { 0.0 } else { 1.0 }).collect();
        let result = monitor()
            .with_quantiles(&[0.25, 0.95])
            .regression(&base, &base)
            .unwrap();
        assert_eq!(result.quantile_drift.len(), 1);
        assert_eq!(result.quantile_drift[0].quantile, 0.95);
    }

    // ========== Classification tests ==========

    fn labels(n: usize, yes_every: usize) -> Vec<String> {
        (0..n)
            .map(|i| if i % yes_every == 0 { "yes" } else { "no" }.to_string())
            .collect()
    }

    #[test]
    fn test_classification_stable() {
        let result = monitor()
            .classification(&labels(400, 4), &labels(400, 4))
            .unwrap();
        assert_eq!(result.signals, 0);
        assert!(!result.overall_drift);
        assert_eq!(result.class_ratio_drift.len(), 2);
        assert!((result.class_ratio_drift["yes"].baseline_share - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_classification_shift_alerts() {
        let result = monitor()
            .classification(&labels(400, 4), &labels(400, 2))
            .unwrap();
        assert!(result.class_ratio_drift["yes"].drift_detected);
        assert!(result.tests[&DriftTest::ChiSquared].drift_detected);
        assert_eq!(result.alerts, vec![CLASSIFICATION_OUTPUT_DRIFT.to_string()]);
    }

    #[test]
    fn test_classification_below_min_samples() {
        let result = monitor()
            .classification(&labels(10, 2), &labels(400, 2))
            .unwrap();
        assert!(result.insufficient_samples);
        assert_eq!(result.task, TaskType::Classification);
    }

    // ========== Window tests ==========

    fn window(role: WindowRole, preds: Vec<f64>, classes: Vec<&str>) -> Window {
        let n = preds.len();
        let schema = Arc::new(Schema::new(vec![
            Field::new("score", DataType::Float64, true),
            Field::new("label", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Float64Array::from(preds)),
                Arc::new(StringArray::from(classes)),
            ],
        )
        .unwrap();
        Window::new(role, WindowRange::new(0, n), vec![batch])
    }

    #[test]
    fn test_compare_windows_by_column() {
        let base = window(WindowRole::Baseline, cycle(100, 10, 5.0), vec!["a"; 100]);
        let cur = window(WindowRole::Current, cycle(100, 10, 5.0), vec!["a"; 100]);
        let m = monitor();

        let reg = m.compare(TaskType::Regression, &base, &cur, "score").unwrap();
        assert_eq!(reg.task, TaskType::Regression);
        assert!(!reg.overall_drift);

        let cls = m.compare(TaskType::Classification, &base, &cur, "label").unwrap();
        assert_eq!(cls.task, TaskType::Classification);
        assert!(!cls.overall_drift);

        assert!(m.compare(TaskType::Regression, &base, &cur, "missing").is_err());
    }
}
