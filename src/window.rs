//! Baseline/current windows and the window state machine.
//!
//! [`WindowManager`] only tracks row offsets into a project's append-only row
//! stream. It decides when the baseline seals and when a monitor window is
//! full; the rows themselves are read back from a [`crate::backend::RowSource`]
//! by range so every comparison is reproducible.

use std::fmt;

use arrow::{
    array::{Array, Float64Array, RecordBatch, StringArray},
    compute::cast,
    datatypes::DataType,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    schema::FeatureKind,
};

/// Which side of a comparison a window is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowRole {
    /// Reference sample.
    Baseline,
    /// Sample checked against the baseline.
    Current,
}

impl fmt::Display for WindowRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Baseline => write!(f, "baseline"),
            Self::Current => write!(f, "current"),
        }
    }
}

/// Half-open row range `[start, end)` into a project's row stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowRange {
    /// First row (inclusive).
    pub start: usize,
    /// Last row (exclusive).
    pub end: usize,
}

impl WindowRange {
    /// Create a range.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Rows covered by the range.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Returns true if the range covers no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for WindowRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Raw values of one feature within one window.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureColumn {
    /// Numeric values; nulls and non-finite values are `None`.
    Numeric(Vec<Option<f64>>),
    /// Categorical labels; nulls are `None`.
    Categorical(Vec<Option<String>>),
}

impl FeatureColumn {
    /// Total rows, nulls included.
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Categorical(v) => v.len(),
        }
    }

    /// Returns true if the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Non-null values, in row order. Empty for categorical columns.
    pub fn numeric_values(&self) -> Vec<f64> {
        match self {
            Self::Numeric(v) => v.iter().flatten().copied().collect(),
            Self::Categorical(_) => Vec::new(),
        }
    }

    /// Number of non-null values.
    pub fn non_null_count(&self) -> usize {
        match self {
            Self::Numeric(v) => v.iter().filter(|x| x.is_some()).count(),
            Self::Categorical(v) => v.iter().filter(|x| x.is_some()).count(),
        }
    }
}

/// A window's rows, tagged with its role and range.
#[derive(Debug, Clone)]
pub struct Window {
    role: WindowRole,
    range: WindowRange,
    batches: Vec<RecordBatch>,
}

impl Window {
    /// Create a window over already-sliced batches.
    pub fn new(role: WindowRole, range: WindowRange, batches: Vec<RecordBatch>) -> Self {
        Self {
            role,
            range,
            batches,
        }
    }

    /// Role of this window.
    pub fn role(&self) -> WindowRole {
        self.role
    }

    /// Row range of this window.
    pub fn range(&self) -> WindowRange {
        self.range
    }

    /// Underlying batches.
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Number of rows actually held.
    pub fn len(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Returns true if the window holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Extract one feature's values.
    ///
    /// Batches that lack the column contribute null rows, so the column
    /// length always equals the window length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FeatureMismatch`] if no batch carries the column, or
    /// an Arrow error if the column cannot be cast to `kind`.
    pub fn column(&self, name: &str, kind: FeatureKind) -> Result<FeatureColumn> {
        let present = self
            .batches
            .iter()
            .any(|b| b.schema().column_with_name(name).is_some());
        if !present {
            return Err(Error::feature_mismatch(name));
        }

        match kind {
            FeatureKind::Numeric => {
                let mut values = Vec::with_capacity(self.len());
                for batch in &self.batches {
                    match batch.column_by_name(name) {
                        Some(array) => {
                            let casted = cast(array, &DataType::Float64)?;
                            let floats = casted
                                .as_any()
                                .downcast_ref::<Float64Array>()
                                .ok_or_else(|| Error::column_not_found(name))?;
                            values.extend(floats.iter().map(|v| v.filter(|x| x.is_finite())));
                        }
                        None => values.extend(std::iter::repeat(None).take(batch.num_rows())),
                    }
                }
                Ok(FeatureColumn::Numeric(values))
            }
            FeatureKind::Categorical => {
                let mut values = Vec::with_capacity(self.len());
                for batch in &self.batches {
                    match batch.column_by_name(name) {
                        Some(array) => {
                            let casted = cast(array, &DataType::Utf8)?;
                            let strings = casted
                                .as_any()
                                .downcast_ref::<StringArray>()
                                .ok_or_else(|| Error::column_not_found(name))?;
                            values.extend(strings.iter().map(|v| v.map(str::to_owned)));
                        }
                        None => values.extend(std::iter::repeat(None).take(batch.num_rows())),
                    }
                }
                Ok(FeatureColumn::Categorical(values))
            }
        }
    }
}

/// Window manager state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    /// Filling the first baseline window.
    AccumulatingBaseline,
    /// Baseline sealed, no monitor rows yet.
    BaselineSealed,
    /// Filling a monitor window.
    AccumulatingCurrent,
    /// A full monitor window is waiting to be compared.
    ReadyToCompare,
}

impl fmt::Display for WindowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AccumulatingBaseline => "accumulating_baseline",
            Self::BaselineSealed => "baseline_sealed",
            Self::AccumulatingCurrent => "accumulating_current",
            Self::ReadyToCompare => "ready_to_compare",
        };
        f.write_str(s)
    }
}

/// Ranges of one comparison cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonWindows {
    /// Sealed baseline range.
    pub baseline: WindowRange,
    /// Monitor range being compared.
    pub current: WindowRange,
}

/// Offset state machine deciding when baselines seal and comparisons fire.
#[derive(Debug, Clone, Default)]
pub struct WindowManager {
    total_rows: usize,
    baseline_start: usize,
    baseline: Option<WindowRange>,
    current_start: usize,
    monitor_batch_size: usize,
    comparisons: u64,
}

impl WindowManager {
    /// Create a manager at row offset 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager whose first baseline starts at row `offset`.
    pub fn starting_at(offset: usize) -> Self {
        Self {
            total_rows: offset,
            baseline_start: offset,
            current_start: offset,
            ..Self::default()
        }
    }

    /// Record `rows` newly appended rows.
    ///
    /// Seals the baseline once `baseline_batch_size` rows have accumulated
    /// (only on the first fill). `monitor_batch_size` becomes the size of the
    /// monitor window from this point on.
    pub fn record(&mut self, rows: usize, baseline_batch_size: usize, monitor_batch_size: usize) {
        self.total_rows += rows;
        self.monitor_batch_size = monitor_batch_size;

        if self.baseline.is_none() && self.total_rows - self.baseline_start >= baseline_batch_size {
            let range = WindowRange::new(self.baseline_start, self.baseline_start + baseline_batch_size);
            self.baseline = Some(range);
            self.current_start = range.end;
            tracing::info!(baseline = %range, "Baseline window sealed");
        }
    }

    /// Take the next full monitor window, clearing it from the manager.
    pub fn take_comparison(&mut self) -> Option<ComparisonWindows> {
        let baseline = self.baseline?;
        if self.monitor_batch_size == 0 || self.pending_current() < self.monitor_batch_size {
            return None;
        }

        let current = WindowRange::new(
            self.current_start,
            self.current_start + self.monitor_batch_size,
        );
        self.current_start = current.end;
        self.comparisons += 1;

        Some(ComparisonWindows { baseline, current })
    }

    /// Record rows and drain every comparison they trigger, oldest first.
    pub fn append(
        &mut self,
        rows: usize,
        baseline_batch_size: usize,
        monitor_batch_size: usize,
    ) -> Vec<ComparisonWindows> {
        self.record(rows, baseline_batch_size, monitor_batch_size);
        std::iter::from_fn(|| self.take_comparison()).collect()
    }

    /// Discard the sealed baseline; the next rows start a new one.
    pub fn reset_baseline(&mut self) {
        self.baseline = None;
        self.baseline_start = self.total_rows;
        self.current_start = self.total_rows;
        self.comparisons = 0;
        tracing::info!(from_row = self.total_rows, "Baseline reset");
    }

    /// Current state.
    pub fn state(&self) -> WindowState {
        match self.baseline {
            None => WindowState::AccumulatingBaseline,
            Some(_) if self.monitor_batch_size > 0
                && self.pending_current() >= self.monitor_batch_size =>
            {
                WindowState::ReadyToCompare
            }
            Some(_) if self.pending_current() == 0 && self.comparisons == 0 => {
                WindowState::BaselineSealed
            }
            Some(_) => WindowState::AccumulatingCurrent,
        }
    }

    /// Sealed baseline range, if any.
    pub fn baseline(&self) -> Option<WindowRange> {
        self.baseline
    }

    /// Rows accumulated in the open monitor window.
    pub fn current(&self) -> WindowRange {
        WindowRange::new(self.current_start, self.total_rows.max(self.current_start))
    }

    /// Rows gathered toward the baseline, capped at its sealed size.
    pub fn baseline_rows(&self) -> usize {
        match self.baseline {
            Some(range) => range.len(),
            None => self.total_rows - self.baseline_start,
        }
    }

    /// Rows in the open monitor window.
    pub fn pending_current(&self) -> usize {
        self.total_rows.saturating_sub(self.current_start)
    }

    /// Total rows recorded.
    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    /// Comparisons fired against the current baseline.
    pub fn comparisons(&self) -> u64 {
        self.comparisons
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::{
        array::{BooleanArray, Int64Array},
        datatypes::{Field, Schema},
    };

    use super::*;

    // ========== WindowManager tests ==========

    #[test]
    fn test_baseline_then_one_comparison() {
        let mut manager = WindowManager::new();
        assert!(manager.append(1000, 1000, 500).is_empty());
        assert_eq!(manager.state(), WindowState::BaselineSealed);
        assert_eq!(manager.baseline(), Some(WindowRange::new(0, 1000)));

        let fired = manager.append(500, 1000, 500);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].baseline, WindowRange::new(0, 1000));
        assert_eq!(fired[0].current, WindowRange::new(1000, 1500));

        let fired = manager.append(500, 1000, 500);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].baseline, WindowRange::new(0, 1000));
        assert_eq!(fired[0].current, WindowRange::new(1500, 2000));
        assert_eq!(manager.pending_current(), 0);
        assert_eq!(manager.comparisons(), 2);
    }

    #[test]
    fn test_large_batch_fires_several_comparisons() {
        let mut manager = WindowManager::new();
        let fired = manager.append(2300, 1000, 500);
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[1].current, WindowRange::new(1500, 2000));
        assert_eq!(manager.pending_current(), 300);
        assert_eq!(manager.state(), WindowState::AccumulatingCurrent);
    }

    #[test]
    fn test_baseline_never_refreshes() {
        let mut manager = WindowManager::new();
        manager.append(1000, 1000, 100);
        manager.append(1000, 10, 100);
        assert_eq!(manager.baseline(), Some(WindowRange::new(0, 1000)));
    }

    #[test]
    fn test_monitor_size_change_applies_at_boundary() {
        let mut manager = WindowManager::new();
        manager.append(100, 100, 50);
        assert!(manager.append(30, 100, 50).is_empty());
        let fired = manager.append(10, 100, 40);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].current, WindowRange::new(100, 140));
    }

    #[test]
    fn test_record_then_take() {
        let mut manager = WindowManager::new();
        manager.record(150, 100, 50);
        assert_eq!(manager.state(), WindowState::ReadyToCompare);
        assert!(manager.take_comparison().is_some());
        assert!(manager.take_comparison().is_none());
        assert_eq!(manager.state(), WindowState::AccumulatingCurrent);
    }

    #[test]
    fn test_reset_baseline() {
        let mut manager = WindowManager::new();
        manager.append(120, 100, 50);
        manager.reset_baseline();
        assert_eq!(manager.state(), WindowState::AccumulatingBaseline);
        assert!(manager.append(99, 100, 50).is_empty());
        assert_eq!(manager.baseline_rows(), 99);
        manager.append(1, 100, 50);
        assert_eq!(manager.baseline_rows(), 100);
        assert_eq!(manager.baseline(), Some(WindowRange::new(120, 220)));
        assert_eq!(manager.current(), WindowRange::new(220, 220));
    }

    #[test]
    fn test_accumulating_baseline_state() {
        let mut manager = WindowManager::new();
        manager.append(10, 100, 50);
        assert_eq!(manager.state(), WindowState::AccumulatingBaseline);
        assert!(manager.take_comparison().is_none());
    }

    // ========== Column extraction tests ==========

    fn batch_with(name: &str, array: Arc<dyn Array>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new(
            name,
            array.data_type().clone(),
            true,
        )]));
        RecordBatch::try_new(schema, vec![array]).unwrap()
    }

    #[test]
    fn test_numeric_column_casts_and_drops_non_finite() {
        let b1 = batch_with("x", Arc::new(Int64Array::from(vec![Some(1), None, Some(3)])));
        let b2 = batch_with(
            "x",
            Arc::new(Float64Array::from(vec![f64::NAN, 2.5, f64::INFINITY])),
        );
        let window = Window::new(WindowRole::Current, WindowRange::new(0, 6), vec![b1, b2]);
        let col = window.column("x", FeatureKind::Numeric).unwrap();
        assert_eq!(
            col,
            FeatureColumn::Numeric(vec![Some(1.0), None, Some(3.0), None, Some(2.5), None])
        );
        assert_eq!(col.non_null_count(), 3);
        assert_eq!(col.numeric_values(), vec![1.0, 3.0, 2.5]);
    }

    #[test]
    fn test_categorical_column_from_bool() {
        let b = batch_with("flag", Arc::new(BooleanArray::from(vec![true, false])));
        let window = Window::new(WindowRole::Baseline, WindowRange::new(0, 2), vec![b]);
        let col = window.column("flag", FeatureKind::Categorical).unwrap();
        assert_eq!(
            col,
            FeatureColumn::Categorical(vec![Some("true".to_string()), Some("false".to_string())])
        );
    }

    #[test]
    fn test_missing_column_is_feature_mismatch() {
        let b = batch_with("x", Arc::new(Float64Array::from(vec![1.0])));
        let window = Window::new(WindowRole::Current, WindowRange::new(0, 1), vec![b]);
        let err = window.column("y", FeatureKind::Numeric).unwrap_err();
        assert!(matches!(err, Error::FeatureMismatch { .. }));
    }

    #[test]
    fn test_partially_missing_column_pads_nulls() {
        let b1 = batch_with("x", Arc::new(Float64Array::from(vec![1.0, 2.0])));
        let b2 = batch_with("z", Arc::new(Float64Array::from(vec![9.0])));
        let window = Window::new(WindowRole::Current, WindowRange::new(0, 3), vec![b1, b2]);
        let col = window.column("x", FeatureKind::Numeric).unwrap();
        assert_eq!(col.len(), 3);
        assert_eq!(col.non_null_count(), 2);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(WindowRole::Baseline.to_string(), "baseline");
        assert_eq!(WindowRole::Current.to_string(), "current");
        assert_eq!(WindowRange::new(3, 9).to_string(), "3..9");
    }
}
