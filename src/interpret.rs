//! Natural-language summaries of drift reports.
//!
//! Interpretation is optional enrichment. The monitor attaches whatever an
//! interpreter returns to the report and logs and ignores failures.

use std::fmt::Write as _;

use crate::{error::Result, report::DriftReport};

/// Turns a finished report into a short human-readable summary.
pub trait DriftInterpreter: Send + Sync {
    /// Summarize the report.
    ///
    /// # Errors
    ///
    /// Returns an error if no summary can be produced. Callers treat this as
    /// non-fatal.
    fn interpret(&self, report: &DriftReport) -> Result<String>;
}

/// Deterministic, template-based interpreter.
///
/// # Example
///
/// ```
/// use vigilar::{DriftConfig, DriftInterpreter, ReportBuilder, SummaryInterpreter, WindowRange};
///
/// let report = ReportBuilder::new("p", 1, WindowRange::new(0, 10), WindowRange::new(10, 20))
///     .build(&DriftConfig::default());
/// let text = SummaryInterpreter::new().interpret(&report).unwrap();
/// assert!(text.starts_with("No significant drift"));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SummaryInterpreter {
    max_features: usize,
}

impl Default for SummaryInterpreter {
    fn default() -> Self {
        Self { max_features: 5 }
    }
}

impl SummaryInterpreter {
    /// Creates an interpreter listing at most five alerted features.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit how many alerted features are named individually.
    #[must_use]
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = max_features.max(1);
        self
    }
}

impl DriftInterpreter for SummaryInterpreter {
    fn interpret(&self, report: &DriftReport) -> Result<String> {
        let mut out = String::new();
        let total = report.feature_stats().len();
        let alerts = report.alerts();

        if alerts.is_empty() {
            let _ = write!(
                out,
                "No significant drift detected across {total} feature{}.",
                plural(total)
            );
        } else {
            let _ = write!(
                out,
                "Drift detected in {} of {total} feature{} (drift score {:.2}).",
                alerts.len(),
                plural(total),
                report.drift_score()
            );

            for feature in alerts.iter().take(self.max_features) {
                let failed: Vec<&str> = report
                    .drift_tests()
                    .get(feature)
                    .map(|tests| {
                        tests
                            .values()
                            .filter(|r| r.drift_detected)
                            .map(|r| r.test.name())
                            .collect()
                    })
                    .unwrap_or_default();
                if failed.is_empty() {
                    let _ = write!(out, " {feature} crossed the alert threshold.");
                } else {
                    let _ = write!(out, " {feature}: {}.", failed.join(", "));
                }
            }
            if alerts.len() > self.max_features {
                let _ = write!(out, " {} more alerted.", alerts.len() - self.max_features);
            }
        }

        if let Some(model) = report.model_based_drift() {
            let verdict = if model.alert_triggered {
                "can distinguish"
            } else {
                "cannot reliably distinguish"
            };
            let _ = write!(
                out,
                " A classifier {verdict} baseline from current rows ({} {:.3}, threshold {:.2}).",
                model.metric.as_str(),
                model.drift_score,
                model.alert_threshold
            );
        } else if let Some(reason) = report.model_based_error() {
            let _ = write!(out, " Model-based check unavailable: {reason}.");
        }

        let skipped = report.skipped_features().len();
        if skipped > 0 {
            let _ = write!(out, " {skipped} feature{} skipped.", plural(skipped));
        }

        Ok(out)
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
