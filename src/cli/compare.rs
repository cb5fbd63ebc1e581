//! Dataset comparison and report rendering commands.

use std::path::{Path, PathBuf};

use super::basic::{infer_schema, load_config, write_file};
use crate::{
    backend::JsonLinesSink, compare_windows, DriftInterpreter, DriftReport, Frame,
    SummaryInterpreter, Window, WindowRange, WindowRole,
};

/// Arguments of the compare command.
pub(crate) struct CompareArgs<'a> {
    pub baseline: &'a PathBuf,
    pub current: &'a PathBuf,
    pub config: Option<&'a PathBuf>,
    pub exclude: &'a [String],
    pub project: &'a str,
    pub format: &'a str,
    pub output: Option<&'a PathBuf>,
    pub no_model: bool,
    pub interpret: bool,
}

/// Compare a current dataset against a baseline dataset.
pub(crate) fn cmd_compare(args: &CompareArgs<'_>) -> crate::Result<()> {
    let mut config = load_config(args.config)?;
    if args.no_model {
        config = config.without_model_based();
    }

    let baseline = Frame::load(args.baseline)?;
    let current = Frame::load(args.current)?;
    let schema = infer_schema(&baseline, args.exclude)?;

    // Current rows follow the baseline rows, as if both came from one stream.
    let base_range = WindowRange::new(0, baseline.len());
    let cur_range = WindowRange::new(baseline.len(), baseline.len() + current.len());
    let base_window = Window::new(WindowRole::Baseline, base_range, baseline.batches().to_vec());
    let cur_window = Window::new(WindowRole::Current, cur_range, current.batches().to_vec());

    let mut report =
        compare_windows(args.project, 1, &base_window, &cur_window, &schema, &config)?;

    if args.interpret {
        match SummaryInterpreter::new().interpret(&report) {
            Ok(text) => report = report.with_interpretation(text),
            Err(e) => tracing::warn!(error = %e, "Interpretation skipped"),
        }
    }

    if let Some(path) = args.output {
        write_file(path, &report.to_json_pretty()?)?;
        eprintln!("Report written to {}", path.display());
    }

    print_report(&report, args.format)
}

/// Re-render a stored report.
pub(crate) fn cmd_render(path: &Path, format: &str) -> crate::Result<()> {
    let report = if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
        JsonLinesSink::read_all(path)?
            .pop()
            .ok_or_else(|| crate::Error::storage(format!("{} holds no reports", path.display())))?
    } else {
        let json = std::fs::read_to_string(path).map_err(|e| crate::Error::io(e, path))?;
        DriftReport::from_json(&json)?
    };

    print_report(&report, format)
}

fn print_report(report: &DriftReport, format: &str) -> crate::Result<()> {
    if format == "json" {
        println!("{}", report.to_json_pretty()?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}
