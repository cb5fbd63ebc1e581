//! Async wrapper around [`DriftMonitor`].
//!
//! Comparisons are CPU-bound and never yield mid-way, so each call runs on
//! tokio's blocking pool. That includes state reads, which wait on the same
//! per-project lock that serializes ingestion for one project.

use std::sync::Arc;

use arrow::array::RecordBatch;

use crate::{
    config::DriftConfig,
    error::{Error, Result},
    monitor::{DriftMonitor, IngestSummary},
    report::DriftReport,
    schema::FeatureSchema,
    window::WindowState,
};

/// A [`DriftMonitor`] usable from async code.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
///
/// use vigilar::{async_monitor::AsyncDriftMonitor, DriftMonitor};
///
/// #[tokio::main]
/// async fn main() {
///     let monitor = AsyncDriftMonitor::new(Arc::new(build_monitor()));
///     let summary = monitor.ingest("shop", batch).await.unwrap();
///     println!("{} reports", summary.reports.len());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AsyncDriftMonitor {
    inner: Arc<DriftMonitor>,
}

impl AsyncDriftMonitor {
    /// Wraps a shared monitor.
    pub fn new(inner: Arc<DriftMonitor>) -> Self {
        Self { inner }
    }

    /// The wrapped monitor.
    pub fn inner(&self) -> &Arc<DriftMonitor> {
        &self.inner
    }

    /// See [`DriftMonitor::register`].
    ///
    /// # Errors
    ///
    /// Returns an error if registration fails or the task panics.
    pub async fn register(&self, project_id: &str, schema: FeatureSchema) -> Result<()> {
        let monitor = Arc::clone(&self.inner);
        let project_id = project_id.to_string();
        blocking(move || monitor.register(&project_id, schema)).await
    }

    /// See [`DriftMonitor::ingest`].
    ///
    /// # Errors
    ///
    /// Returns an error if ingestion fails or the task panics.
    pub async fn ingest(&self, project_id: &str, batch: RecordBatch) -> Result<IngestSummary> {
        let monitor = Arc::clone(&self.inner);
        let project_id = project_id.to_string();
        blocking(move || monitor.ingest(&project_id, batch)).await
    }

    /// See [`DriftMonitor::compare`].
    ///
    /// # Errors
    ///
    /// Returns an error if the comparison fails or the task panics.
    pub async fn compare(&self, project_id: &str, config: DriftConfig) -> Result<DriftReport> {
        let monitor = Arc::clone(&self.inner);
        let project_id = project_id.to_string();
        blocking(move || monitor.compare(&project_id, &config)).await
    }

    /// See [`DriftMonitor::reset_baseline`].
    ///
    /// # Errors
    ///
    /// Returns an error if the project is unknown or the task panics.
    pub async fn reset_baseline(&self, project_id: &str) -> Result<()> {
        let monitor = Arc::clone(&self.inner);
        let project_id = project_id.to_string();
        blocking(move || monitor.reset_baseline(&project_id)).await
    }

    /// See [`DriftMonitor::state`].
    ///
    /// Waits for any comparison running on the project.
    ///
    /// # Errors
    ///
    /// Returns an error if the project is unknown or the task panics.
    pub async fn state(&self, project_id: &str) -> Result<WindowState> {
        let monitor = Arc::clone(&self.inner);
        let project_id = project_id.to_string();
        blocking(move || monitor.state(&project_id)).await
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::storage(format!("Monitor task failed: {}", e)))?
}
