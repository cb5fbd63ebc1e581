//! Collaborators consumed by the drift monitor.
//!
//! The monitor reads rows from a [`RowSource`], thresholds from a
//! [`ConfigStore`], and hands finished reports to a [`ReportSink`]. In-memory
//! implementations are provided for embedding and tests, plus a JSON Lines
//! report sink for simple on-disk persistence.

pub mod jsonl;
pub mod memory;

use arrow::array::RecordBatch;
pub use jsonl::JsonLinesSink;
pub use memory::{MemoryConfigStore, MemoryReportSink, MemoryRowSource};

use crate::{config::DriftConfig, error::Result, report::DriftReport, window::WindowRange};

/// Append-only, ordered rows per project, addressable by row offset.
///
/// Reading the same range twice must return the same rows so that
/// comparisons can be recomputed deterministically.
pub trait RowSource: Send + Sync {
    /// Appends a batch to the project's stream.
    ///
    /// Returns the stream length after the append.
    ///
    /// # Errors
    ///
    /// Returns an error if the rows cannot be stored.
    fn append(&self, project_id: &str, batch: RecordBatch) -> Result<usize>;

    /// Reads rows `[range.start, range.end)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range exceeds the stream or reading fails.
    fn read(&self, project_id: &str, range: WindowRange) -> Result<Vec<RecordBatch>>;

    /// Number of rows stored for the project.
    ///
    /// # Errors
    ///
    /// Returns an error if the length cannot be determined.
    fn len(&self, project_id: &str) -> Result<usize>;
}

/// Per-project drift configuration.
pub trait ConfigStore: Send + Sync {
    /// Returns the project's config, or the defaults if none is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, project_id: &str) -> Result<DriftConfig>;

    /// Stores a config for the project.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or cannot be stored.
    fn put(&self, project_id: &str, config: DriftConfig) -> Result<()>;
}

/// Destination for completed reports.
///
/// Reports arrive with their project, run identifier and timestamp set; the
/// sink owns retention and querying.
pub trait ReportSink: Send + Sync {
    /// Persists one report.
    ///
    /// # Errors
    ///
    /// Returns an error if the report cannot be written.
    fn persist(&self, report: &DriftReport) -> Result<()>;
}
