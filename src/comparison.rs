//! One comparison cycle: statistics, test battery, model-based detector,
//! aggregation.
//!
//! [`compare_windows`] is the pure core behind every monitor operation. It
//! either returns a complete [`DriftReport`] or fails without side effects.

use crate::{
    config::DriftConfig,
    drift::run_battery,
    error::{Error, Result},
    model_drift,
    report::{DriftReport, FeatureStatsPair, ReportBuilder, SkipReason},
    schema::FeatureSchema,
    stats::FeatureStats,
    window::{Window, WindowRole},
};

/// Compare a current window against a baseline window.
///
/// Features missing from a window, below `min_samples`, or with unreadable
/// values are listed as skipped; they never abort the comparison. A failed
/// model-based detector leaves `model_based_drift` empty and records the
/// reason.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] for a malformed config and
/// [`Error::InsufficientData`] if either window has no rows.
pub fn compare_windows(
    project_id: &str,
    run_id: u64,
    baseline: &Window,
    current: &Window,
    schema: &FeatureSchema,
    config: &DriftConfig,
) -> Result<DriftReport> {
    config.validate()?;

    if baseline.is_empty() {
        return Err(Error::insufficient_data(WindowRole::Baseline, 0, 1));
    }
    if current.is_empty() {
        return Err(Error::insufficient_data(WindowRole::Current, 0, 1));
    }

    let mut builder = ReportBuilder::new(project_id, run_id, baseline.range(), current.range());

    for feature in schema.features() {
        let name = feature.name.as_str();

        let base_col = match baseline.column(name, feature.kind) {
            Ok(col) => col,
            Err(Error::FeatureMismatch { .. }) => {
                tracing::debug!(feature = name, "Skipped: missing from baseline");
                builder.skip(name, SkipReason::MissingFromBaseline);
                continue;
            }
            Err(e) => {
                tracing::warn!(feature = name, error = %e, "Skipped: unreadable baseline values");
                builder.skip(name, SkipReason::InvalidData);
                continue;
            }
        };
        let cur_col = match current.column(name, feature.kind) {
            Ok(col) => col,
            Err(Error::FeatureMismatch { .. }) => {
                tracing::debug!(feature = name, "Skipped: missing from current");
                builder.skip(name, SkipReason::MissingFromCurrent);
                continue;
            }
            Err(e) => {
                tracing::warn!(feature = name, error = %e, "Skipped: unreadable current values");
                builder.skip(name, SkipReason::InvalidData);
                continue;
            }
        };

        let stats = FeatureStatsPair {
            baseline: FeatureStats::from_column(&base_col),
            current: FeatureStats::from_column(&cur_col),
        };

        if stats.baseline.count < config.min_samples || stats.current.count < config.min_samples {
            tracing::debug!(
                feature = name,
                baseline = stats.baseline.count,
                current = stats.current.count,
                required = config.min_samples,
                "Skipped: insufficient samples"
            );
            builder.add_untested(name, stats, SkipReason::InsufficientSamples);
            continue;
        }

        match run_battery(&base_col, &cur_col, &stats.baseline, &stats.current, config) {
            Ok(tests) => builder.add_feature(name, stats, tests),
            Err(e) => {
                tracing::warn!(feature = name, error = %e, "Test battery failed");
                builder.add_untested(name, stats, SkipReason::InvalidData);
            }
        }
    }

    if config.model_based.enabled {
        let outcome = model_drift::detect(baseline, current, schema, &config.model_based)
            .map_err(|e| {
                tracing::warn!(error = %e, "Model-based drift omitted");
                e.to_string()
            });
        builder.model_result(outcome);
    }

    let report = builder.build(config);
    tracing::info!(
        project = project_id,
        run_id,
        alerts = report.alerts().len(),
        overall_drift = report.overall_drift(),
        "Comparison complete"
    );

    Ok(report)
}
