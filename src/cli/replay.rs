//! Replay a dataset through the drift monitor.

use std::{path::PathBuf, sync::Arc};

use super::basic::{infer_schema, load_config};
use crate::{
    backend::{JsonLinesSink, MemoryConfigStore, MemoryReportSink, MemoryRowSource, ReportSink},
    DriftMonitor, Frame,
};

/// Arguments of the replay command.
pub(crate) struct ReplayArgs<'a> {
    pub input: &'a PathBuf,
    pub config: Option<&'a PathBuf>,
    pub baseline_batch_size: Option<usize>,
    pub monitor_batch_size: Option<usize>,
    pub chunk_rows: usize,
    pub exclude: &'a [String],
    pub project: &'a str,
    pub output: Option<&'a PathBuf>,
    pub no_model: bool,
}

/// Stream a dataset through the monitor, one summary line per comparison.
pub(crate) fn cmd_replay(args: &ReplayArgs<'_>) -> crate::Result<()> {
    let mut config = load_config(args.config)?;
    if args.no_model {
        config = config.without_model_based();
    }
    let baseline_size = args.baseline_batch_size.unwrap_or(config.baseline_batch_size);
    let monitor_size = args.monitor_batch_size.unwrap_or(config.monitor_batch_size);
    config = config.with_batch_sizes(baseline_size, monitor_size);
    config.validate()?;

    if args.chunk_rows == 0 {
        return Err(crate::Error::invalid_config("chunk_rows must be at least 1"));
    }

    let frame = Frame::load(args.input)?;
    let schema = infer_schema(&frame, args.exclude)?;

    let sink: Arc<dyn ReportSink> = match args.output {
        Some(path) => Arc::new(JsonLinesSink::new(path)),
        None => Arc::new(MemoryReportSink::new()),
    };
    let monitor = DriftMonitor::new(
        Arc::new(MemoryRowSource::new()),
        Arc::new(MemoryConfigStore::with_defaults(config)),
        sink,
    );
    monitor.register(args.project, schema)?;

    println!(
        "Replaying {} ({} rows, baseline {}, monitor {})",
        args.input.display(),
        frame.len(),
        baseline_size,
        monitor_size
    );
    println!();
    println!(
        "{:<6} {:<14} {:<14} {:<8} {:<8} DRIFT",
        "RUN", "BASELINE", "CURRENT", "ALERTS", "SCORE"
    );
    println!("{}", "-".repeat(60));

    let mut comparisons = 0usize;
    let mut drifted = 0usize;
    let mut failed = 0usize;

    for chunk in frame.chunks(args.chunk_rows) {
        let summary = monitor.ingest(args.project, chunk)?;

        for report in &summary.reports {
            comparisons += 1;
            if report.overall_drift() {
                drifted += 1;
            }
            println!(
                "{:<6} {:<14} {:<14} {:<8} {:<8.2} {}",
                report.run_id(),
                report.baseline_window().to_string(),
                report.current_window().to_string(),
                report.alerts().len(),
                report.drift_score(),
                if report.overall_drift() { "YES" } else { "no" }
            );
        }
        for failure in &summary.failures {
            failed += 1;
            println!(
                "{:<6} {:<14} {:<14} failed: {}",
                "-",
                failure.windows.baseline.to_string(),
                failure.windows.current.to_string(),
                failure.reason
            );
        }
    }

    println!();
    println!(
        "{} comparisons, {} with drift, {} failed",
        comparisons, drifted, failed
    );
    if let Some(path) = args.output {
        println!("Reports appended to {}", path.display());
    }

    Ok(())
}
