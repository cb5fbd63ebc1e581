//! JSON Lines report sink.

use std::{
    fs::OpenOptions,
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use super::ReportSink;
use crate::{
    error::{Error, Result},
    report::DriftReport,
};

/// Appends one JSON document per report to a file.
///
/// The file is created on first write. Writes are serialized so concurrent
/// monitors never interleave lines.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesSink {
    /// Creates a sink writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The file this sink appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every report in the file, oldest first.
    ///
    /// Blank lines are ignored. A missing file reads as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a line is not a report.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<DriftReport>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = std::fs::File::open(path).map_err(|e| Error::io(e, path))?;
        let mut reports = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| Error::io(e, path))?;
            if line.trim().is_empty() {
                continue;
            }
            reports.push(DriftReport::from_json(&line)?);
        }
        Ok(reports)
    }
}

impl ReportSink for JsonLinesSink {
    fn persist(&self, report: &DriftReport) -> Result<()> {
        let line = report.to_json()?;

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::storage("Failed to acquire write lock"))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| Error::io(e, parent))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::io(e, &self.path))?;
        writeln!(file, "{line}").map_err(|e| Error::io(e, &self.path))?;

        tracing::debug!(
            path = %self.path.display(),
            project = report.project_id(),
            run_id = report.run_id(),
            "Report appended"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::DriftConfig, report::ReportBuilder, window::WindowRange};

    fn report(run_id: u64) -> DriftReport {
        ReportBuilder::new("p", run_id, WindowRange::new(0, 10), WindowRange::new(10, 20))
            .timestamp(1_700_000_000)
            .build(&DriftConfig::default())
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("drift.jsonl");
        let sink = JsonLinesSink::new(&path);

        sink.persist(&report(1)).unwrap();
        sink.persist(&report(2)).unwrap();

        let reports = JsonLinesSink::read_all(&path).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].run_id(), 1);
        assert_eq!(reports[1].run_id(), 2);
        assert_eq!(reports[1].timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let reports = JsonLinesSink::read_all(dir.path().join("none.jsonl")).unwrap();
        assert!(reports.is_empty());
    }

    #[test]
    fn test_garbage_line_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "not json\n").unwrap();
        assert!(JsonLinesSink::read_all(&path).is_err());
    }
}
