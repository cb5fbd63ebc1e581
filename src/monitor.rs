//! Per-project drift monitoring.
//!
//! [`DriftMonitor`] ties the pieces together: it validates incoming batches
//! against each project's [`FeatureSchema`], appends them to the
//! [`RowSource`], advances the project's [`WindowManager`], and runs one
//! comparison per monitor window that fills up. Reports go to the
//! [`ReportSink`], optionally enriched by a [`DriftInterpreter`].
//!
//! Each project's state sits behind its own mutex, held from append through
//! the last comparison the append triggers. Two ingests for the same project
//! therefore never compare overlapping monitor windows, while different
//! projects proceed in parallel.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use arrow::array::RecordBatch;
use serde::Serialize;

use crate::{
    backend::{ConfigStore, ReportSink, RowSource},
    comparison::compare_windows,
    config::DriftConfig,
    error::{Error, Result},
    interpret::DriftInterpreter,
    report::DriftReport,
    schema::FeatureSchema,
    window::{ComparisonWindows, Window, WindowManager, WindowRange, WindowRole, WindowState},
};

#[derive(Debug)]
struct ProjectState {
    schema: FeatureSchema,
    windows: WindowManager,
    next_run_id: u64,
}

/// An automatic comparison that produced no report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonFailure {
    /// The windows that were consumed.
    pub windows: ComparisonWindows,
    /// Why no report was produced.
    pub reason: String,
}

/// Outcome of one [`DriftMonitor::ingest`] call.
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    /// Rows appended by this call.
    pub rows_appended: usize,
    /// Rows stored for the project after this call.
    pub total_rows: usize,
    /// Window state after this call.
    pub state: WindowState,
    /// Reports produced, oldest first.
    pub reports: Vec<DriftReport>,
    /// Comparisons that fired but failed.
    pub failures: Vec<ComparisonFailure>,
}

impl IngestSummary {
    /// Whether any produced report flags overall drift.
    pub fn drift_detected(&self) -> bool {
        self.reports.iter().any(DriftReport::overall_drift)
    }
}

/// Drift monitor over many projects.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use arrow::{array::{Float64Array, RecordBatch}, datatypes::{DataType, Field, Schema}};
/// use vigilar::{
///     backend::{MemoryConfigStore, MemoryReportSink, MemoryRowSource},
///     DriftConfig, DriftMonitor, FeatureSchema,
/// };
///
/// let configs = Arc::new(MemoryConfigStore::with_defaults(
///     DriftConfig::default().with_batch_sizes(100, 50).without_model_based(),
/// ));
/// let sink = Arc::new(MemoryReportSink::new());
/// let monitor = DriftMonitor::new(Arc::new(MemoryRowSource::new()), configs, sink.clone());
/// monitor.register("shop", FeatureSchema::new().numeric("price")).unwrap();
///
/// let schema = Arc::new(Schema::new(vec![Field::new("price", DataType::Float64, false)]));
/// let prices: Vec<f64> = (0..150).map(|i| f64::from(i % 10)).collect();
/// let batch = RecordBatch::try_new(schema, vec![Arc::new(Float64Array::from(prices))]).unwrap();
///
/// let summary = monitor.ingest("shop", batch).unwrap();
/// assert_eq!(summary.reports.len(), 1);
/// assert_eq!(sink.len(), 1);
/// ```
pub struct DriftMonitor {
    rows: Arc<dyn RowSource>,
    configs: Arc<dyn ConfigStore>,
    sink: Arc<dyn ReportSink>,
    interpreter: Option<Arc<dyn DriftInterpreter>>,
    projects: RwLock<HashMap<String, Arc<Mutex<ProjectState>>>>,
}

impl std::fmt::Debug for DriftMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriftMonitor")
            .field("projects", &self.projects().len())
            .field("interpreter", &self.interpreter.is_some())
            .finish_non_exhaustive()
    }
}

impl DriftMonitor {
    /// Creates a monitor over the given collaborators.
    pub fn new(
        rows: Arc<dyn RowSource>,
        configs: Arc<dyn ConfigStore>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        Self {
            rows,
            configs,
            sink,
            interpreter: None,
            projects: RwLock::new(HashMap::new()),
        }
    }

    /// Attach an interpreter whose summary is added to every report.
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: Arc<dyn DriftInterpreter>) -> Self {
        self.interpreter = Some(interpreter);
        self
    }

    /// Register a project, or replace the schema of a registered one.
    ///
    /// Replacing a schema keeps the project's windows and run counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema is empty or the registry is unavailable.
    pub fn register(&self, project_id: &str, schema: FeatureSchema) -> Result<()> {
        if schema.is_empty() {
            return Err(Error::schema_mismatch(format!(
                "schema for project '{}' declares no features",
                project_id
            )));
        }

        // The map lock is never held while waiting on a project's mutex.
        if let Ok(existing) = self.project(project_id) {
            return replace_schema(project_id, &existing, schema);
        }

        // Rows stored before registration are history, not baseline.
        let resumed = self.rows.len(project_id)?;

        let mut projects = self
            .projects
            .write()
            .map_err(|_| Error::storage("Failed to acquire write lock"))?;

        if let Some(existing) = projects.get(project_id).cloned() {
            drop(projects);
            return replace_schema(project_id, &existing, schema);
        }

        projects.insert(
            project_id.to_string(),
            Arc::new(Mutex::new(ProjectState {
                schema,
                windows: WindowManager::starting_at(resumed),
                next_run_id: 1,
            })),
        );
        tracing::info!(project = project_id, skipped_rows = resumed, "Project registered");
        Ok(())
    }

    /// Registered project identifiers, sorted.
    pub fn projects(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .projects
            .read()
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Append a batch and run every comparison it triggers.
    ///
    /// The config is read from the [`ConfigStore`] once per call; batch
    /// sizes in effect now decide which boundaries this batch crosses.
    /// Failed comparisons still consume their monitor window and are listed
    /// in [`IngestSummary::failures`].
    ///
    /// # Errors
    ///
    /// Returns an error if the project is unknown, the batch does not match
    /// the schema, the config is invalid, or the rows cannot be stored.
    pub fn ingest(&self, project_id: &str, batch: RecordBatch) -> Result<IngestSummary> {
        let project = self.project(project_id)?;
        let mut state = lock(&project)?;

        state.schema.validate_batch(&batch)?;
        let config = self.configs.get(project_id)?;
        config.validate()?;

        let rows_appended = batch.num_rows();
        let total_rows = self.rows.append(project_id, batch)?;
        let fired = state.windows.append(
            rows_appended,
            config.baseline_batch_size,
            config.monitor_batch_size,
        );

        let mut reports = Vec::new();
        let mut failures = Vec::new();
        for windows in fired {
            tracing::info!(
                project = project_id,
                baseline = %windows.baseline,
                current = %windows.current,
                "Comparison fired"
            );
            match self.run_cycle(project_id, &mut state, windows, &config) {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::warn!(project = project_id, error = %e, "Comparison failed");
                    failures.push(ComparisonFailure {
                        windows,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(IngestSummary {
            rows_appended,
            total_rows,
            state: state.windows.state(),
            reports,
            failures,
        })
    }

    /// Compare the open monitor window against the sealed baseline now.
    ///
    /// The window is not cleared; later automatic comparisons are
    /// unaffected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownProject`], [`Error::InvalidConfig`], or
    /// [`Error::InsufficientData`] if the baseline is not sealed or the open
    /// window has fewer than `min_samples` rows.
    pub fn compare(&self, project_id: &str, config: &DriftConfig) -> Result<DriftReport> {
        config.validate()?;
        let project = self.project(project_id)?;
        let mut state = lock(&project)?;

        let baseline = state.windows.baseline().ok_or_else(|| {
            Error::insufficient_data(
                WindowRole::Baseline,
                state.windows.baseline_rows(),
                config.baseline_batch_size,
            )
        })?;
        let current = state.windows.current();
        if current.len() < config.min_samples {
            return Err(Error::insufficient_data(
                WindowRole::Current,
                current.len(),
                config.min_samples,
            ));
        }

        self.run_cycle(project_id, &mut state, ComparisonWindows { baseline, current }, config)
    }

    /// Discard the project's baseline; the next rows start a new one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownProject`] if the project is not registered.
    pub fn reset_baseline(&self, project_id: &str) -> Result<()> {
        let project = self.project(project_id)?;
        let mut state = lock(&project)?;
        state.windows.reset_baseline();
        Ok(())
    }

    /// Window state of a project.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownProject`] if the project is not registered.
    pub fn state(&self, project_id: &str) -> Result<WindowState> {
        let project = self.project(project_id)?;
        let state = lock(&project)?;
        Ok(state.windows.state())
    }

    /// Snapshot of a project's window manager.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownProject`] if the project is not registered.
    pub fn windows(&self, project_id: &str) -> Result<WindowManager> {
        let project = self.project(project_id)?;
        let state = lock(&project)?;
        Ok(state.windows.clone())
    }

    fn project(&self, project_id: &str) -> Result<Arc<Mutex<ProjectState>>> {
        let projects = self
            .projects
            .read()
            .map_err(|_| Error::storage("Failed to acquire read lock"))?;

        projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| Error::unknown_project(project_id))
    }

    fn run_cycle(
        &self,
        project_id: &str,
        state: &mut ProjectState,
        windows: ComparisonWindows,
        config: &DriftConfig,
    ) -> Result<DriftReport> {
        let baseline = self.load_window(project_id, WindowRole::Baseline, windows.baseline)?;
        let current = self.load_window(project_id, WindowRole::Current, windows.current)?;

        let run_id = state.next_run_id;
        let mut report =
            compare_windows(project_id, run_id, &baseline, &current, &state.schema, config)?;

        if let Some(interpreter) = &self.interpreter {
            match interpreter.interpret(&report) {
                Ok(text) => report = report.with_interpretation(text),
                Err(e) => {
                    tracing::warn!(project = project_id, run_id, error = %e, "Interpretation skipped");
                }
            }
        }

        self.sink.persist(&report)?;
        state.next_run_id += 1;
        tracing::info!(
            project = project_id,
            run_id,
            overall_drift = report.overall_drift(),
            "Report persisted"
        );
        Ok(report)
    }

    fn load_window(&self, project_id: &str, role: WindowRole, range: WindowRange) -> Result<Window> {
        let batches = self.rows.read(project_id, range)?;
        Ok(Window::new(role, range, batches))
    }
}

fn replace_schema(
    project_id: &str,
    project: &Mutex<ProjectState>,
    schema: FeatureSchema,
) -> Result<()> {
    let mut state = lock(project)?;
    state.schema = schema;
    tracing::info!(project = project_id, "Project schema replaced");
    Ok(())
}

fn lock(project: &Mutex<ProjectState>) -> Result<std::sync::MutexGuard<'_, ProjectState>> {
    project
        .lock()
        .map_err(|_| Error::storage("Failed to acquire project lock"))
}

#[cfg(test)]
mod tests {
    use arrow::{
        array::{Float64Array, StringArray},
        datatypes::{DataType, Field, Schema},
    };

    use super::*;
    use crate::{
        backend::{MemoryConfigStore, MemoryReportSink, MemoryRowSource},
        interpret::SummaryInterpreter,
    };

    fn batch(values: Vec<f64>) -> RecordBatch {
        let n = values.len();
        let schema = Arc::new(Schema::new(vec![
            Field::new("amount", DataType::Float64, true),
            Field::new("channel", DataType::Utf8, true),
        ]));
        let channels: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "web" } else { "app" }).collect();
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Float64Array::from(values)),
                Arc::new(StringArray::from(channels)),
            ],
        )
        .unwrap()
    }

    fn values(n: usize, offset: f64) -> Vec<f64> {
        (0..n).map(|i| offset + (i % 20) as f64).collect()
    }

    fn monitor(config: DriftConfig) -> (DriftMonitor, Arc<MemoryReportSink>) {
        let sink = Arc::new(MemoryReportSink::new());
        let monitor = DriftMonitor::new(
            Arc::new(MemoryRowSource::new()),
            Arc::new(MemoryConfigStore::with_defaults(config)),
            sink.clone(),
        );
        monitor
            .register(
                "p",
                FeatureSchema::new().numeric("amount").categorical("channel"),
            )
            .unwrap();
        (monitor, sink)
    }

    fn config() -> DriftConfig {
        DriftConfig::default()
            .with_batch_sizes(100, 50)
            .with_min_samples(10)
            .without_model_based()
    }

    #[test]
    fn test_unknown_project() {
        let (monitor, _) = monitor(config());
        assert!(matches!(
            monitor.ingest("nope", batch(values(10, 0.0))),
            Err(Error::UnknownProject { .. })
        ));
        assert!(monitor.state("nope").is_err());
    }

    #[test]
    fn test_empty_schema_rejected() {
        let (monitor, _) = monitor(config());
        assert!(monitor.register("q", FeatureSchema::new()).is_err());
    }

    #[test]
    fn test_ingest_fires_and_persists() {
        let (monitor, sink) = monitor(config());

        let summary = monitor.ingest("p", batch(values(100, 50.0))).unwrap();
        assert!(summary.reports.is_empty());
        assert_eq!(summary.state, WindowState::BaselineSealed);

        let summary = monitor.ingest("p", batch(values(50, 50.0))).unwrap();
        assert_eq!(summary.reports.len(), 1);
        assert_eq!(summary.total_rows, 150);
        assert!(!summary.drift_detected());
        assert_eq!(sink.len(), 1);

        let report = &summary.reports[0];
        assert_eq!(report.run_id(), 1);
        assert_eq!(report.baseline_window(), WindowRange::new(0, 100));
        assert_eq!(report.current_window(), WindowRange::new(100, 150));
    }

    #[test]
    fn test_run_ids_increase() {
        let (monitor, sink) = monitor(config());
        monitor.ingest("p", batch(values(250, 50.0))).unwrap();
        let ids: Vec<u64> = sink.reports().iter().map(DriftReport::run_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_shift_is_flagged() {
        let (monitor, _) = monitor(config());
        monitor.ingest("p", batch(values(100, 50.0))).unwrap();
        let summary = monitor.ingest("p", batch(values(50, 80.0))).unwrap();
        assert!(summary.drift_detected());
        assert_eq!(summary.reports[0].alerts(), ["amount".to_string()]);
    }

    #[test]
    fn test_schema_violation_rejected_before_append() {
        let (monitor, _) = monitor(config());
        let schema = Arc::new(Schema::new(vec![Field::new("amount", DataType::Utf8, true)]));
        let bad = RecordBatch::try_new(schema, vec![Arc::new(StringArray::from(vec!["x"]))]).unwrap();
        assert!(monitor.ingest("p", bad).is_err());
        assert_eq!(monitor.windows("p").unwrap().total_rows(), 0);
    }

    #[test]
    fn test_compare_on_demand() {
        let (monitor, sink) = monitor(config());
        let cfg = config();

        let err = monitor.compare("p", &cfg).unwrap_err();
        assert!(err.is_recoverable());

        monitor.ingest("p", batch(values(100, 50.0))).unwrap();
        assert!(monitor.compare("p", &cfg).unwrap_err().is_recoverable());

        monitor.ingest("p", batch(values(20, 50.0))).unwrap();
        let report = monitor.compare("p", &cfg).unwrap();
        assert_eq!(report.current_window(), WindowRange::new(100, 120));
        assert_eq!(sink.len(), 1);

        // The open window is untouched.
        assert_eq!(monitor.windows("p").unwrap().pending_current(), 20);
        let summary = monitor.ingest("p", batch(values(30, 50.0))).unwrap();
        assert_eq!(summary.reports[0].current_window(), WindowRange::new(100, 150));
        assert_eq!(summary.reports[0].run_id(), 2);
    }

    #[test]
    fn test_compare_rejects_invalid_config() {
        let (monitor, _) = monitor(config());
        let bad = config().with_alert_threshold(0);
        assert!(matches!(
            monitor.compare("p", &bad),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_reset_baseline() {
        let (monitor, _) = monitor(config());
        monitor.ingest("p", batch(values(120, 50.0))).unwrap();
        monitor.reset_baseline("p").unwrap();
        assert_eq!(monitor.state("p").unwrap(), WindowState::AccumulatingBaseline);

        monitor.ingest("p", batch(values(100, 80.0))).unwrap();
        let summary = monitor.ingest("p", batch(values(50, 80.0))).unwrap();
        assert_eq!(summary.reports[0].baseline_window(), WindowRange::new(120, 220));
        assert!(!summary.drift_detected());
    }

    struct UnreadableRows(MemoryRowSource);

    impl RowSource for UnreadableRows {
        fn append(&self, project_id: &str, batch: RecordBatch) -> Result<usize> {
            self.0.append(project_id, batch)
        }

        fn read(&self, _project_id: &str, _range: WindowRange) -> Result<Vec<RecordBatch>> {
            Err(Error::storage("row store offline"))
        }

        fn len(&self, project_id: &str) -> Result<usize> {
            self.0.len(project_id)
        }
    }

    #[test]
    fn test_failed_comparison_consumes_window() {
        let sink = Arc::new(MemoryReportSink::new());
        let monitor = DriftMonitor::new(
            Arc::new(UnreadableRows(MemoryRowSource::new())),
            Arc::new(MemoryConfigStore::with_defaults(config())),
            sink.clone(),
        );
        monitor
            .register("p", FeatureSchema::new().numeric("amount"))
            .unwrap();

        let summary = monitor.ingest("p", batch(values(150, 50.0))).unwrap();
        assert!(summary.reports.is_empty());
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].windows.current, WindowRange::new(100, 150));
        assert!(summary.failures[0].reason.contains("row store offline"));
        assert!(sink.is_empty());
        assert_eq!(monitor.windows("p").unwrap().pending_current(), 0);
    }

    #[test]
    fn test_register_after_restart_skips_stored_rows() {
        let rows = Arc::new(MemoryRowSource::new());
        rows.append("p", batch(values(70, 50.0))).unwrap();
        let monitor = DriftMonitor::new(
            rows,
            Arc::new(MemoryConfigStore::with_defaults(config())),
            Arc::new(MemoryReportSink::new()),
        );
        monitor
            .register("p", FeatureSchema::new().numeric("amount"))
            .unwrap();

        monitor.ingest("p", batch(values(100, 50.0))).unwrap();
        let windows = monitor.windows("p").unwrap();
        assert_eq!(windows.baseline(), Some(WindowRange::new(70, 170)));
    }

    #[test]
    fn test_interpreter_attaches_summary() {
        let sink = Arc::new(MemoryReportSink::new());
        let monitor = DriftMonitor::new(
            Arc::new(MemoryRowSource::new()),
            Arc::new(MemoryConfigStore::with_defaults(config())),
            sink.clone(),
        )
        .with_interpreter(Arc::new(SummaryInterpreter::new()));
        monitor
            .register("p", FeatureSchema::new().numeric("amount"))
            .unwrap();

        monitor.ingest("p", batch(values(150, 50.0))).unwrap();
        let reports = sink.reports();
        assert!(reports[0]
            .interpretation()
            .unwrap()
            .starts_with("No significant drift"));
    }

    struct SlowInterpreter(std::time::Duration);

    impl DriftInterpreter for SlowInterpreter {
        fn interpret(&self, _report: &DriftReport) -> Result<String> {
            std::thread::sleep(self.0);
            Ok("slow".to_string())
        }
    }

    #[test]
    fn test_reregister_during_comparison_does_not_block_other_projects() {
        use std::time::{Duration, Instant};

        let sink = Arc::new(MemoryReportSink::new());
        let monitor = DriftMonitor::new(
            Arc::new(MemoryRowSource::new()),
            Arc::new(MemoryConfigStore::with_defaults(config())),
            sink.clone(),
        )
        .with_interpreter(Arc::new(SlowInterpreter(Duration::from_millis(1000))));
        let schema = FeatureSchema::new().numeric("amount").categorical("channel");
        monitor.register("a", schema.clone()).unwrap();
        monitor.register("b", schema.clone()).unwrap();

        let elapsed = std::thread::scope(|scope| {
            let ingest_a = scope.spawn(|| monitor.ingest("a", batch(values(150, 50.0))));
            let register_a = scope.spawn(|| {
                std::thread::sleep(Duration::from_millis(100));
                monitor.register("a", schema.clone())
            });

            std::thread::sleep(Duration::from_millis(200));
            let start = Instant::now();
            monitor.ingest("b", batch(values(10, 50.0))).unwrap();
            let elapsed = start.elapsed();

            assert_eq!(ingest_a.join().unwrap().unwrap().reports.len(), 1);
            register_a.join().unwrap().unwrap();
            elapsed
        });

        assert!(
            elapsed < Duration::from_millis(500),
            "project b waited {:?} on project a",
            elapsed
        );
        assert_eq!(sink.len(), 1);
        assert_eq!(monitor.windows("b").unwrap().total_rows(), 10);
    }

    #[test]
    fn test_reregister_keeps_windows() {
        let (monitor, _) = monitor(config());
        monitor.ingest("p", batch(values(60, 50.0))).unwrap();
        monitor
            .register("p", FeatureSchema::new().numeric("amount"))
            .unwrap();
        assert_eq!(monitor.windows("p").unwrap().total_rows(), 60);
        assert_eq!(monitor.projects(), vec!["p".to_string()]);
    }
}
