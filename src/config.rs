//! Per-project drift configuration.
//!
//! [`DriftConfig`] is read before every comparison and may change between
//! cycles. Every entry point calls [`DriftConfig::validate`] before doing any
//! work.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// PSI severity bands.
///
/// Below `moderate` is low, below `high` is moderate, anything else is high.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsiBands {
    /// Lower bound of the moderate band.
    pub moderate: f64,
    /// Lower bound of the high band.
    pub high: f64,
}

impl Default for PsiBands {
    fn default() -> Self {
        Self {
            moderate: 0.10,
            high: 0.25,
        }
    }
}

/// How categories seen in only one window are handled by categorical PSI.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum CategorySmoothing {
    /// Floor both proportions at the PSI floor (1e-4).
    #[default]
    Floor,
    /// Add `alpha` to every category count over the union of categories.
    Additive {
        /// Pseudo-count added to each category.
        alpha: f64,
    },
}

/// Rule combining per-feature alerts and the model-based result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverallDriftPolicy {
    /// Alerted features needed to call the comparison drifted.
    pub min_alerted_features: usize,
    /// Whether a triggered model-based alert alone marks overall drift.
    pub include_model_based: bool,
}

impl Default for OverallDriftPolicy {
    fn default() -> Self {
        Self {
            min_alerted_features: 1,
            include_model_based: true,
        }
    }
}

/// Score used by the model-based detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelMetric {
    /// Area under the ROC curve on held-out rows.
    #[default]
    RocAuc,
    /// Held-out accuracy at a 0.5 cutoff.
    Accuracy,
}

impl ModelMetric {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RocAuc => "roc_auc",
            Self::Accuracy => "accuracy",
        }
    }
}

/// Settings of the model-based detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelDriftConfig {
    /// Run the detector at all.
    pub enabled: bool,
    /// Score above which the detector alerts.
    pub alert_threshold: f64,
    /// Score reported as `drift_score`.
    pub metric: ModelMetric,
    /// Trees in the forest.
    pub n_estimators: usize,
    /// Maximum tree depth.
    pub max_depth: usize,
    /// Minimum rows in a leaf.
    pub min_samples_leaf: usize,
    /// Held-out fraction of each class.
    pub test_size: f64,
    /// Seed for sampling and splits.
    pub seed: u64,
    /// Minimum rows each window must contribute.
    pub min_rows_per_class: usize,
}

impl Default for ModelDriftConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            alert_threshold: 0.75,
            metric: ModelMetric::RocAuc,
            n_estimators: 100,
            max_depth: 10,
            min_samples_leaf: 2,
            test_size: 0.2,
            seed: 42,
            min_rows_per_class: 10,
        }
    }
}

/// Thresholds and window sizes for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Relative mean change above which the mean test fires.
    pub mean_threshold: f64,
    /// Relative median change above which the median test fires.
    pub median_threshold: f64,
    /// Relative variance change above which the variance test fires.
    pub variance_threshold: f64,
    /// KS p-value below which the KS test fires.
    pub ks_pvalue_threshold: f64,
    /// Chi-squared p-value below which the categorical test fires.
    pub chi_squared_pvalue_threshold: f64,
    /// PSI severity bands.
    pub psi_bands: PsiBands,
    /// Number of PSI bins for numeric features.
    pub psi_bins: usize,
    /// Count a moderate PSI toward the per-feature failing-test tally.
    pub psi_moderate_counts_as_failure: bool,
    /// Unseen-category handling for categorical PSI.
    pub category_smoothing: CategorySmoothing,
    /// Non-null values each window needs before a feature is tested.
    pub min_samples: usize,
    /// Failing tests needed to alert on a feature.
    pub alert_threshold: usize,
    /// Rows in the baseline window.
    pub baseline_batch_size: usize,
    /// Rows in each monitor window.
    pub monitor_batch_size: usize,
    /// Overall drift rule.
    pub overall_policy: OverallDriftPolicy,
    /// Model-based detector settings.
    pub model_based: ModelDriftConfig,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            mean_threshold: 0.10,
            median_threshold: 0.10,
            variance_threshold: 0.20,
            ks_pvalue_threshold: 0.05,
            chi_squared_pvalue_threshold: 0.05,
            psi_bands: PsiBands::default(),
            psi_bins: 10,
            psi_moderate_counts_as_failure: false,
            category_smoothing: CategorySmoothing::Floor,
            min_samples: 50,
            alert_threshold: 2,
            baseline_batch_size: 1000,
            monitor_batch_size: 500,
            overall_policy: OverallDriftPolicy::default(),
            model_based: ModelDriftConfig::default(),
        }
    }
}

impl DriftConfig {
    /// Create a config with default thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the mean threshold.
    #[must_use]
    pub fn with_mean_threshold(mut self, threshold: f64) -> Self {
        self.mean_threshold = threshold;
        self
    }

    /// Set the median threshold.
    #[must_use]
    pub fn with_median_threshold(mut self, threshold: f64) -> Self {
        self.median_threshold = threshold;
        self
    }

    /// Set the variance threshold.
    #[must_use]
    pub fn with_variance_threshold(mut self, threshold: f64) -> Self {
        self.variance_threshold = threshold;
        self
    }

    /// Set the KS p-value threshold.
    #[must_use]
    pub fn with_ks_pvalue_threshold(mut self, threshold: f64) -> Self {
        self.ks_pvalue_threshold = threshold;
        self
    }

    /// Set the PSI bands.
    #[must_use]
    pub fn with_psi_bands(mut self, moderate: f64, high: f64) -> Self {
        self.psi_bands = PsiBands { moderate, high };
        self
    }

    /// Set the number of PSI bins.
    #[must_use]
    pub fn with_psi_bins(mut self, bins: usize) -> Self {
        self.psi_bins = bins;
        self
    }

    /// Count moderate PSI as a failing test.
    #[must_use]
    pub fn with_psi_moderate_counts_as_failure(mut self, counts: bool) -> Self {
        self.psi_moderate_counts_as_failure = counts;
        self
    }

    /// Set the categorical smoothing policy.
    #[must_use]
    pub fn with_category_smoothing(mut self, smoothing: CategorySmoothing) -> Self {
        self.category_smoothing = smoothing;
        self
    }

    /// Set the per-feature minimum sample count.
    #[must_use]
    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    /// Set the failing-test count needed to alert on a feature.
    #[must_use]
    pub fn with_alert_threshold(mut self, threshold: usize) -> Self {
        self.alert_threshold = threshold;
        self
    }

    /// Set the baseline and monitor window sizes.
    #[must_use]
    pub fn with_batch_sizes(mut self, baseline: usize, monitor: usize) -> Self {
        self.baseline_batch_size = baseline;
        self.monitor_batch_size = monitor;
        self
    }

    /// Set the overall drift policy.
    #[must_use]
    pub fn with_overall_policy(mut self, policy: OverallDriftPolicy) -> Self {
        self.overall_policy = policy;
        self
    }

    /// Set the model-based detector settings.
    #[must_use]
    pub fn with_model_based(mut self, model: ModelDriftConfig) -> Self {
        self.model_based = model;
        self
    }

    /// Disable the model-based detector.
    #[must_use]
    pub fn without_model_based(mut self) -> Self {
        self.model_based.enabled = false;
        self
    }

    /// Check every threshold and size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first malformed setting.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("mean_threshold", self.mean_threshold),
            ("median_threshold", self.median_threshold),
            ("variance_threshold", self.variance_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::invalid_config(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        for (name, value) in [
            ("ks_pvalue_threshold", self.ks_pvalue_threshold),
            (
                "chi_squared_pvalue_threshold",
                self.chi_squared_pvalue_threshold,
            ),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(Error::invalid_config(format!(
                    "{} must be in (0, 1), got {}",
                    name, value
                )));
            }
        }

        let bands = self.psi_bands;
        if !(bands.moderate.is_finite() && bands.high.is_finite())
            || bands.moderate <= 0.0
            || bands.moderate >= bands.high
        {
            return Err(Error::invalid_config(format!(
                "psi bands must satisfy 0 < moderate < high, got moderate={} high={}",
                bands.moderate, bands.high
            )));
        }

        if self.psi_bins < 2 {
            return Err(Error::invalid_config("psi_bins must be at least 2"));
        }

        if let CategorySmoothing::Additive { alpha } = self.category_smoothing {
            if !alpha.is_finite() || alpha <= 0.0 {
                return Err(Error::invalid_config(format!(
                    "additive smoothing alpha must be positive, got {}",
                    alpha
                )));
            }
        }

        if self.min_samples == 0 {
            return Err(Error::invalid_config("min_samples must be at least 1"));
        }
        if self.alert_threshold == 0 {
            return Err(Error::invalid_config("alert_threshold must be at least 1"));
        }
        if self.baseline_batch_size == 0 || self.monitor_batch_size == 0 {
            return Err(Error::invalid_config("batch sizes must be positive"));
        }

        self.validate_model()
    }

    fn validate_model(&self) -> Result<()> {
        let model = &self.model_based;
        if !(model.alert_threshold.is_finite()
            && model.alert_threshold >= 0.0
            && model.alert_threshold <= 1.0)
        {
            return Err(Error::invalid_config(format!(
                "model alert_threshold must be in [0, 1], got {}",
                model.alert_threshold
            )));
        }
        if !(model.test_size > 0.0 && model.test_size < 1.0) {
            return Err(Error::invalid_config(format!(
                "model test_size must be in (0, 1), got {}",
                model.test_size
            )));
        }
        if model.n_estimators == 0 || model.max_depth == 0 || model.min_samples_leaf == 0 {
            return Err(Error::invalid_config(
                "model n_estimators, max_depth and min_samples_leaf must be positive",
            ));
        }
        if model.min_rows_per_class < 2 {
            return Err(Error::invalid_config(
                "model min_rows_per_class must be at least 2",
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON config.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the config is invalid.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| Error::io(e, path))?;
        Self::from_json_str(&json)
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DriftConfig::default();
        assert_eq!(config.mean_threshold, 0.10);
        assert_eq!(config.median_threshold, 0.10);
        assert_eq!(config.variance_threshold, 0.20);
        assert_eq!(config.ks_pvalue_threshold, 0.05);
        assert_eq!(config.psi_bands.moderate, 0.10);
        assert_eq!(config.psi_bands.high, 0.25);
        assert_eq!(config.alert_threshold, 2);
        assert_eq!(config.baseline_batch_size, 1000);
        assert_eq!(config.monitor_batch_size, 500);
        assert_eq!(config.model_based.alert_threshold, 0.75);
        assert!(!config.psi_moderate_counts_as_failure);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let config = DriftConfig::new().with_mean_threshold(-0.1);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("mean_threshold"));
    }

    #[test]
    fn test_nan_threshold_rejected() {
        assert!(DriftConfig::new()
            .with_variance_threshold(f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_pvalue_bounds() {
        assert!(DriftConfig::new()
            .with_ks_pvalue_threshold(0.0)
            .validate()
            .is_err());
        assert!(DriftConfig::new()
            .with_ks_pvalue_threshold(1.0)
            .validate()
            .is_err());
        assert!(DriftConfig::new()
            .with_ks_pvalue_threshold(0.01)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_psi_bands_out_of_order() {
        let err = DriftConfig::new()
            .with_psi_bands(0.3, 0.2)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
        assert!(DriftConfig::new()
            .with_psi_bands(0.0, 0.2)
            .validate()
            .is_err());
    }

    #[test]
    fn test_zero_sizes_rejected() {
        assert!(DriftConfig::new().with_batch_sizes(0, 10).validate().is_err());
        assert!(DriftConfig::new().with_alert_threshold(0).validate().is_err());
        assert!(DriftConfig::new().with_min_samples(0).validate().is_err());
        assert!(DriftConfig::new().with_psi_bins(1).validate().is_err());
    }

    #[test]
    fn test_additive_smoothing_alpha() {
        assert!(DriftConfig::new()
            .with_category_smoothing(CategorySmoothing::Additive { alpha: 0.0 })
            .validate()
            .is_err());
        assert!(DriftConfig::new()
            .with_category_smoothing(CategorySmoothing::Additive { alpha: 0.5 })
            .validate()
            .is_ok());
    }

    #[test]
    fn test_model_settings_validated() {
        let model = ModelDriftConfig {
            test_size: 1.5,
            ..ModelDriftConfig::default()
        };
        assert!(DriftConfig::new().with_model_based(model).validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = DriftConfig::from_json_str(
            r#"{"mean_threshold": 0.2, "model_based": {"metric": "accuracy"}}"#,
        )
        .unwrap();
        assert_eq!(config.mean_threshold, 0.2);
        assert_eq!(config.median_threshold, 0.10);
        assert_eq!(config.model_based.metric, ModelMetric::Accuracy);
        assert_eq!(config.model_based.n_estimators, 100);
    }

    #[test]
    fn test_json_rejects_invalid_bands() {
        let result = DriftConfig::from_json_str(r#"{"psi_bands": {"moderate": 0.5, "high": 0.1}}"#);
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_smoothing_json_shape() {
        let config = DriftConfig::from_json_str(
            r#"{"category_smoothing": {"strategy": "additive", "alpha": 1.0}}"#,
        )
        .unwrap();
        assert_eq!(
            config.category_smoothing,
            CategorySmoothing::Additive { alpha: 1.0 }
        );
    }

    #[test]
    fn test_json_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = DriftConfig::new().with_alert_threshold(3).without_model_based();
        std::fs::write(&path, config.to_json_pretty().unwrap()).unwrap();
        let loaded = DriftConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
