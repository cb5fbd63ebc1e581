//! In-memory collaborators.

use std::{collections::HashMap, sync::RwLock};

use arrow::array::RecordBatch;

use super::{ConfigStore, ReportSink, RowSource};
use crate::{
    config::DriftConfig,
    error::{Error, Result},
    frame::slice_batches,
    report::DriftReport,
    window::WindowRange,
};

#[derive(Debug, Default)]
struct Stream {
    batches: Vec<RecordBatch>,
    rows: usize,
}

/// An in-memory row source.
///
/// Batches are kept as appended; reads slice them without copying.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use arrow::{array::{Float64Array, RecordBatch}, datatypes::{DataType, Field, Schema}};
/// use vigilar::{backend::{MemoryRowSource, RowSource}, WindowRange};
///
/// let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Float64, false)]));
/// let batch = RecordBatch::try_new(schema, vec![Arc::new(Float64Array::from(vec![1.0, 2.0, 3.0]))]).unwrap();
///
/// let source = MemoryRowSource::new();
/// source.append("p", batch).unwrap();
/// let rows = source.read("p", WindowRange::new(1, 3)).unwrap();
/// assert_eq!(rows[0].num_rows(), 2);
/// ```
#[derive(Debug, Default)]
pub struct MemoryRowSource {
    streams: RwLock<HashMap<String, Stream>>,
}

impl MemoryRowSource {
    /// Creates an empty row source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of projects with stored rows.
    pub fn num_projects(&self) -> usize {
        self.streams.read().map(|s| s.len()).unwrap_or(0)
    }
}

impl RowSource for MemoryRowSource {
    fn append(&self, project_id: &str, batch: RecordBatch) -> Result<usize> {
        let mut streams = self
            .streams
            .write()
            .map_err(|_| Error::storage("Failed to acquire write lock"))?;

        let stream = streams.entry(project_id.to_string()).or_default();
        stream.rows += batch.num_rows();
        if batch.num_rows() > 0 {
            stream.batches.push(batch);
        }
        Ok(stream.rows)
    }

    fn read(&self, project_id: &str, range: WindowRange) -> Result<Vec<RecordBatch>> {
        let streams = self
            .streams
            .read()
            .map_err(|_| Error::storage("Failed to acquire read lock"))?;

        let stream = streams
            .get(project_id)
            .ok_or_else(|| Error::unknown_project(project_id))?;
        if range.end > stream.rows {
            return Err(Error::storage(format!(
                "Range {} exceeds {} stored rows",
                range, stream.rows
            )));
        }

        Ok(slice_batches(&stream.batches, range.start, range.end))
    }

    fn len(&self, project_id: &str) -> Result<usize> {
        let streams = self
            .streams
            .read()
            .map_err(|_| Error::storage("Failed to acquire read lock"))?;

        Ok(streams.get(project_id).map_or(0, |s| s.rows))
    }
}

/// An in-memory config store falling back to [`DriftConfig::default`].
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    configs: RwLock<HashMap<String, DriftConfig>>,
    defaults: DriftConfig,
}

impl MemoryConfigStore {
    /// Creates a store using the built-in defaults as fallback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with custom fallback defaults.
    pub fn with_defaults(defaults: DriftConfig) -> Self {
        Self {
            configs: RwLock::new(HashMap::new()),
            defaults,
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, project_id: &str) -> Result<DriftConfig> {
        let configs = self
            .configs
            .read()
            .map_err(|_| Error::storage("Failed to acquire read lock"))?;

        Ok(configs
            .get(project_id)
            .cloned()
            .unwrap_or_else(|| self.defaults.clone()))
    }

    fn put(&self, project_id: &str, config: DriftConfig) -> Result<()> {
        config.validate()?;
        let mut configs = self
            .configs
            .write()
            .map_err(|_| Error::storage("Failed to acquire write lock"))?;

        configs.insert(project_id.to_string(), config);
        Ok(())
    }
}

/// An in-memory report sink, mostly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryReportSink {
    reports: RwLock<Vec<DriftReport>>,
}

impl MemoryReportSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All persisted reports in arrival order.
    pub fn reports(&self) -> Vec<DriftReport> {
        self.reports.read().map(|r| r.clone()).unwrap_or_default()
    }

    /// Reports persisted for one project.
    pub fn reports_for(&self, project_id: &str) -> Vec<DriftReport> {
        self.reports()
            .into_iter()
            .filter(|r| r.project_id() == project_id)
            .collect()
    }

    /// Returns the number of persisted reports.
    pub fn len(&self) -> usize {
        self.reports.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Returns true if nothing was persisted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReportSink for MemoryReportSink {
    fn persist(&self, report: &DriftReport) -> Result<()> {
        let mut reports = self
            .reports
            .write()
            .map_err(|_| Error::storage("Failed to acquire write lock"))?;

        reports.push(report.clone());
        Ok(())
    }
}
