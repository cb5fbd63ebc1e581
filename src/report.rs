//! Drift reports and the aggregator that builds them.
//!
//! A [`DriftReport`] is built once per comparison cycle by
//! [`ReportBuilder`] and never mutated afterwards. `alerts` is derived from
//! the per-feature test tallies and `drift_score` is always recomputed from
//! `alerts` and `feature_stats`; it is emitted when serialising and ignored
//! when a stored report is loaded back.

#![allow(clippy::cast_precision_loss)]

use std::{
    collections::BTreeMap,
    fmt::{self, Write as _},
};

use serde::{Deserialize, Serialize};

use crate::{
    config::DriftConfig,
    drift::{failing_tests, FeatureTests},
    error::Result,
    model_drift::ModelDriftResult,
    stats::FeatureStats,
    window::WindowRange,
};

/// Why a feature was not tested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The feature has no column in the current window.
    MissingFromCurrent,
    /// The feature has no column in the baseline window.
    MissingFromBaseline,
    /// A window has fewer non-null values than `min_samples`.
    InsufficientSamples,
    /// The feature's values could not be read or tested.
    InvalidData,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MissingFromCurrent => "missing from current window",
            Self::MissingFromBaseline => "missing from baseline window",
            Self::InsufficientSamples => "insufficient samples",
            Self::InvalidData => "invalid data",
        };
        f.write_str(s)
    }
}

/// A feature left out of the test battery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFeature {
    /// Feature name.
    pub feature: String,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// Baseline and current statistics of one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStatsPair {
    /// Baseline window statistics.
    pub baseline: FeatureStats,
    /// Current window statistics.
    pub current: FeatureStats,
}

/// Result of one comparison cycle.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DriftReport {
    project_id: String,
    run_id: u64,
    timestamp: u64,
    baseline_window: WindowRange,
    current_window: WindowRange,
    feature_stats: BTreeMap<String, FeatureStatsPair>,
    drift_tests: BTreeMap<String, FeatureTests>,
    alerts: Vec<String>,
    overall_drift: bool,
    #[serde(default)]
    model_based_drift: Option<ModelDriftResult>,
    #[serde(default)]
    model_based_error: Option<String>,
    #[serde(default)]
    skipped_features: Vec<SkippedFeature>,
    #[serde(default)]
    interpretation: Option<String>,
}

#[derive(Serialize)]
struct ReportView<'a> {
    project_id: &'a str,
    run_id: u64,
    timestamp: u64,
    baseline_window: WindowRange,
    current_window: WindowRange,
    feature_stats: &'a BTreeMap<String, FeatureStatsPair>,
    drift_tests: &'a BTreeMap<String, FeatureTests>,
    alerts: &'a [String],
    overall_drift: bool,
    drift_score: f64,
    model_based_drift: &'a Option<ModelDriftResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_based_error: Option<&'a str>,
    skipped_features: &'a [SkippedFeature],
    #[serde(skip_serializing_if = "Option::is_none")]
    interpretation: Option<&'a str>,
}

impl Serialize for DriftReport {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        ReportView {
            project_id: &self.project_id,
            run_id: self.run_id,
            timestamp: self.timestamp,
            baseline_window: self.baseline_window,
            current_window: self.current_window,
            feature_stats: &self.feature_stats,
            drift_tests: &self.drift_tests,
            alerts: &self.alerts,
            overall_drift: self.overall_drift,
            drift_score: self.drift_score(),
            model_based_drift: &self.model_based_drift,
            model_based_error: self.model_based_error.as_deref(),
            skipped_features: &self.skipped_features,
            interpretation: self.interpretation.as_deref(),
        }
        .serialize(serializer)
    }
}

impl DriftReport {
    /// Project the report belongs to.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Run identifier, increasing per project.
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Creation time in Unix seconds.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Baseline row range.
    pub fn baseline_window(&self) -> WindowRange {
        self.baseline_window
    }

    /// Current row range.
    pub fn current_window(&self) -> WindowRange {
        self.current_window
    }

    /// Statistics of every tested feature.
    pub fn feature_stats(&self) -> &BTreeMap<String, FeatureStatsPair> {
        &self.feature_stats
    }

    /// Test results per feature.
    pub fn drift_tests(&self) -> &BTreeMap<String, FeatureTests> {
        &self.drift_tests
    }

    /// Features whose failing-test count reached the alert threshold.
    pub fn alerts(&self) -> &[String] {
        &self.alerts
    }

    /// Overall verdict under the configured policy.
    pub fn overall_drift(&self) -> bool {
        self.overall_drift
    }

    /// `len(alerts) / len(feature_stats)`, or 0 with no features.
    pub fn drift_score(&self) -> f64 {
        if self.feature_stats.is_empty() {
            0.0
        } else {
            self.alerts.len() as f64 / self.feature_stats.len() as f64
        }
    }

    /// Model-based result, if the detector ran.
    pub fn model_based_drift(&self) -> Option<&ModelDriftResult> {
        self.model_based_drift.as_ref()
    }

    /// Why the model-based detector produced no result.
    pub fn model_based_error(&self) -> Option<&str> {
        self.model_based_error.as_deref()
    }

    /// Features that were not tested.
    pub fn skipped_features(&self) -> &[SkippedFeature] {
        &self.skipped_features
    }

    /// Natural-language summary, if an interpreter supplied one.
    pub fn interpretation(&self) -> Option<&str> {
        self.interpretation.as_deref()
    }

    /// Attach a summary before the report is handed off.
    #[must_use]
    pub fn with_interpretation(mut self, text: impl Into<String>) -> Self {
        self.interpretation = Some(text.into());
        self
    }

    /// Pretty JSON with nested structures kept structured.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Single-line JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Load a stored report. A stored `drift_score` is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not describe a report.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Plain-text table.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Drift Report");
        let _ = writeln!(out, "============");
        let _ = writeln!(out, "Project:  {}", self.project_id);
        let _ = writeln!(out, "Run:      {}", self.run_id);
        let _ = writeln!(out, "Baseline: rows {}", self.baseline_window);
        let _ = writeln!(out, "Current:  rows {}", self.current_window);
        let _ = writeln!(out);

        if self.overall_drift {
            let _ = writeln!(out, "\u{26A0}\u{FE0F}  DRIFT DETECTED");
        } else {
            let _ = writeln!(out, "\u{2713} No significant drift detected");
        }
        let _ = writeln!(
            out,
            "Drift score: {:.4} ({} of {} features alerted)",
            self.drift_score(),
            self.alerts.len(),
            self.feature_stats.len()
        );
        let _ = writeln!(out);

        let _ = writeln!(
            out,
            "{:<20} {:<15} {:<12} {:<12} {:<10} DRIFT",
            "FEATURE", "TEST", "VALUE", "THRESHOLD", "P-VALUE"
        );
        let _ = writeln!(out, "{}", "-".repeat(80));

        for (feature, tests) in &self.drift_tests {
            for result in tests.values() {
                let p_value = result
                    .p_value
                    .map_or_else(|| "N/A".to_string(), |p| format!("{:.4}", p));
                let mut drift = if result.drift_detected { "YES" } else { "no" }.to_string();
                if let Some(severity) = result.severity {
                    drift = format!("{} ({})", drift, severity.as_str());
                }
                let _ = writeln!(
                    out,
                    "{:<20} {:<15} {:<12.4} {:<12.4} {:<10} {}",
                    feature,
                    result.test.name(),
                    result.value,
                    result.threshold,
                    p_value,
                    drift
                );
            }
        }

        if !self.alerts.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Alerts: {}", self.alerts.join(", "));
        }

        if !self.skipped_features.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Skipped:");
            for skipped in &self.skipped_features {
                let _ = writeln!(out, "  {}: {}", skipped.feature, skipped.reason);
            }
        }

        let _ = writeln!(out);
        match (&self.model_based_drift, &self.model_based_error) {
            (Some(model), _) => {
                let _ = writeln!(
                    out,
                    "Model-based drift: {} {:.4} (threshold {:.2}) {}",
                    model.metric.as_str(),
                    model.drift_score,
                    model.alert_threshold,
                    if model.alert_triggered {
                        "ALERT"
                    } else {
                        "ok"
                    }
                );
            }
            (None, Some(error)) => {
                let _ = writeln!(out, "Model-based drift: unavailable ({})", error);
            }
            (None, None) => {
                let _ = writeln!(out, "Model-based drift: disabled");
            }
        }

        if let Some(text) = &self.interpretation {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", text);
        }

        out
    }
}

/// Accumulates per-feature verdicts into a [`DriftReport`].
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    project_id: String,
    run_id: u64,
    timestamp: u64,
    baseline_window: WindowRange,
    current_window: WindowRange,
    features: Vec<(String, FeatureStatsPair, Option<FeatureTests>)>,
    skipped: Vec<SkippedFeature>,
    model: Option<std::result::Result<ModelDriftResult, String>>,
}

impl ReportBuilder {
    /// Start a report for one comparison cycle.
    pub fn new(
        project_id: impl Into<String>,
        run_id: u64,
        baseline_window: WindowRange,
        current_window: WindowRange,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            run_id,
            timestamp: unix_now(),
            baseline_window,
            current_window,
            features: Vec::new(),
            skipped: Vec::new(),
            model: None,
        }
    }

    /// Override the creation time.
    #[must_use]
    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Record a tested feature.
    pub fn add_feature(&mut self, feature: impl Into<String>, stats: FeatureStatsPair, tests: FeatureTests) {
        self.features.push((feature.into(), stats, Some(tests)));
    }

    /// Record a feature whose statistics are reported but which was not tested.
    pub fn add_untested(
        &mut self,
        feature: impl Into<String>,
        stats: FeatureStatsPair,
        reason: SkipReason,
    ) {
        let feature = feature.into();
        self.skipped.push(SkippedFeature {
            feature: feature.clone(),
            reason,
        });
        self.features.push((feature, stats, None));
    }

    /// Record a feature left out entirely.
    pub fn skip(&mut self, feature: impl Into<String>, reason: SkipReason) {
        self.skipped.push(SkippedFeature {
            feature: feature.into(),
            reason,
        });
    }

    /// Record the model-based outcome.
    pub fn model_result(&mut self, result: std::result::Result<ModelDriftResult, String>) {
        self.model = Some(result);
    }

    /// Apply thresholds and the overall policy.
    pub fn build(self, config: &DriftConfig) -> DriftReport {
        let mut feature_stats = BTreeMap::new();
        let mut drift_tests = BTreeMap::new();
        let mut alerts = Vec::new();

        for (feature, stats, tests) in self.features {
            if let Some(tests) = tests {
                if failing_tests(&tests, config) >= config.alert_threshold {
                    alerts.push(feature.clone());
                }
                drift_tests.insert(feature.clone(), tests);
            }
            feature_stats.insert(feature, stats);
        }

        let (model_based_drift, model_based_error) = match self.model {
            Some(Ok(result)) => (Some(result), None),
            Some(Err(reason)) => (None, Some(reason)),
            None => (None, None),
        };

        let policy = config.overall_policy;
        let model_alert = model_based_drift
            .as_ref()
            .map_or(false, |m| m.alert_triggered);
        let overall_drift = alerts.len() >= policy.min_alerted_features.max(1)
            || (policy.include_model_based && model_alert);

        DriftReport {
            project_id: self.project_id,
            run_id: self.run_id,
            timestamp: self.timestamp,
            baseline_window: self.baseline_window,
            current_window: self.current_window,
            feature_stats,
            drift_tests,
            alerts,
            overall_drift,
            model_based_drift,
            model_based_error,
            skipped_features: self.skipped,
            interpretation: None,
        }
    }
}

/// Current time in Unix seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{ModelMetric, OverallDriftPolicy},
        drift::{DriftTest, TestResult},
        window::FeatureColumn,
    };

    fn stats() -> FeatureStatsPair {
        let column = FeatureColumn::Numeric(vec![Some(1.0), Some(2.0)]);
        FeatureStatsPair {
            baseline: FeatureStats::from_column(&column),
            current: FeatureStats::from_column(&column),
        }
    }

    fn tests_failing(failing: &[DriftTest]) -> FeatureTests {
        DriftTest::NUMERIC
            .iter()
            .map(|t| {
                (
                    *t,
                    TestResult {
                        test: *t,
                        value: 0.0,
                        threshold: 0.1,
                        drift_detected: failing.contains(t),
                        p_value: None,
                        severity: None,
                    },
                )
            })
            .collect()
    }

    fn model(triggered: bool) -> ModelDriftResult {
        ModelDriftResult {
            drift_score: if triggered { 0.9 } else { 0.5 },
            alert_threshold: 0.75,
            alert_triggered: triggered,
            metric: ModelMetric::RocAuc,
            baseline_samples: 100,
            current_samples: 50,
            feature_importances: BTreeMap::new(),
        }
    }

    fn builder() -> ReportBuilder {
        ReportBuilder::new("proj", 1, WindowRange::new(0, 1000), WindowRange::new(1000, 1500))
            .timestamp(1_700_000_000)
    }

    #[test]
    fn test_alert_threshold_two_of_five() {
        let mut b = builder();
        b.add_feature(
            "both",
            stats(),
            tests_failing(&[DriftTest::MeanShift, DriftTest::KolmogorovSmirnov]),
        );
        b.add_feature("one", stats(), tests_failing(&[DriftTest::MeanShift]));
        let report = b.build(&DriftConfig::default());

        assert_eq!(report.alerts(), ["both".to_string()]);
        assert!(report.overall_drift());
        assert_eq!(report.drift_score(), 0.5);
    }

    #[test]
    fn test_empty_report_scores_zero() {
        let report = builder().build(&DriftConfig::default());
        assert_eq!(report.drift_score(), 0.0);
        assert!(!report.overall_drift());
    }

    #[test]
    fn test_alerts_follow_insertion_order() {
        let failing = [DriftTest::MeanShift, DriftTest::MedianShift];
        let mut b = builder();
        b.add_feature("zeta", stats(), tests_failing(&failing));
        b.add_feature("alpha", stats(), tests_failing(&failing));
        let report = b.build(&DriftConfig::default());
        assert_eq!(report.alerts(), ["zeta".to_string(), "alpha".to_string()]);
    }

    #[test]
    fn test_model_alert_drives_overall_drift() {
        let mut b = builder();
        b.add_feature("f", stats(), tests_failing(&[]));
        b.model_result(Ok(model(true)));
        let report = b.clone().build(&DriftConfig::default());
        assert!(report.alerts().is_empty());
        assert!(report.overall_drift());

        let config = DriftConfig::default().with_overall_policy(OverallDriftPolicy {
            min_alerted_features: 1,
            include_model_based: false,
        });
        assert!(!b.build(&config).overall_drift());
    }

    #[test]
    fn test_min_alerted_features_policy() {
        let failing = [DriftTest::MeanShift, DriftTest::MedianShift];
        let mut b = builder();
        b.add_feature("a", stats(), tests_failing(&failing));
        b.add_feature("b", stats(), tests_failing(&[]));
        let config = DriftConfig::default().with_overall_policy(OverallDriftPolicy {
            min_alerted_features: 2,
            include_model_based: true,
        });
        let report = b.build(&config);
        assert_eq!(report.alerts().len(), 1);
        assert!(!report.overall_drift());
    }

    #[test]
    fn test_model_error_is_recorded() {
        let mut b = builder();
        b.model_result(Err("single class".to_string()));
        let report = b.build(&DriftConfig::default());
        assert!(report.model_based_drift().is_none());
        assert_eq!(report.model_based_error(), Some("single class"));
        assert!(report.render_text().contains("unavailable (single class)"));
    }

    #[test]
    fn test_untested_features_count_in_score() {
        let failing = [DriftTest::MeanShift, DriftTest::MedianShift];
        let mut b = builder();
        b.add_feature("a", stats(), tests_failing(&failing));
        b.add_untested("b", stats(), SkipReason::InsufficientSamples);
        b.skip("c", SkipReason::MissingFromCurrent);
        let report = b.build(&DriftConfig::default());
        assert_eq!(report.feature_stats().len(), 2);
        assert_eq!(report.drift_tests().len(), 1);
        assert_eq!(report.skipped_features().len(), 2);
        assert_eq!(report.drift_score(), 0.5);
    }

    #[test]
    fn test_json_emits_and_ignores_drift_score() {
        let mut b = builder();
        b.add_feature(
            "f",
            stats(),
            tests_failing(&[DriftTest::MeanShift, DriftTest::Psi]),
        );
        b.model_result(Ok(model(false)));
        let report = b.build(&DriftConfig::default());

        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["drift_score"], 1.0);
        assert!(value["drift_tests"]["f"]["mean_shift"]["drift_detected"]
            .as_bool()
            .unwrap());
        assert!(value["feature_stats"]["f"]["baseline"].is_object());

        let mut tampered = value.clone();
        tampered["drift_score"] = serde_json::json!(0.123);
        let loaded = DriftReport::from_json(&tampered.to_string()).unwrap();
        assert_eq!(loaded.drift_score(), 1.0);
        assert_eq!(loaded, report);
    }

    #[test]
    fn test_render_text() {
        let mut b = builder();
        b.add_feature(
            "income",
            stats(),
            tests_failing(&[DriftTest::MeanShift, DriftTest::VarianceShift]),
        );
        b.skip("age", SkipReason::MissingFromCurrent);
        let text = b.build(&DriftConfig::default()).with_interpretation("summary text").render_text();
        assert!(text.contains("DRIFT DETECTED"));
        assert!(text.contains("income"));
        assert!(text.contains("mean_shift"));
        assert!(text.contains("Alerts: income"));
        assert!(text.contains("age: missing from current window"));
        assert!(text.contains("Model-based drift: disabled"));
        assert!(text.contains("summary text"));
    }
}
