//! vigilar - Data drift monitoring in Pure Rust
//!
//! Compares a baseline window of tabular data against a current window and
//! decides, per feature and overall, whether the distribution has shifted.
//!
//! # Design Principles
//!
//! 1. **Explicit schema** - every feature is declared numeric or categorical
//!    once, at ingestion
//! 2. **Atomic comparisons** - a comparison yields a complete report or an
//!    error, never a partial one
//! 3. **Serialized windows** - one lock per project around window state
//! 4. **Ecosystem aligned** - Arrow 53, Parquet 53
//!
//! # Components
//!
//! - [`stats`]: per-feature summary statistics
//! - [`drift`]: mean/median/variance shift, Kolmogorov-Smirnov, PSI and
//!   chi-squared tests
//! - [`model_drift`]: classifier-distinguishability drift on a random forest
//! - [`report`]: alert aggregation into a [`DriftReport`]
//! - [`window`]: baseline/monitor window accounting
//! - [`monitor`]: per-project ingestion driving all of the above
//!
//! # Quick Start
//!
//! ```no_run
//! use vigilar::{compare_windows, DriftConfig, FeatureSchema, Frame, Window, WindowRange, WindowRole};
//!
//! let baseline = Frame::load("data/baseline.parquet").unwrap();
//! let current = Frame::load("data/current.parquet").unwrap();
//! let schema = FeatureSchema::infer(&baseline.schema(), &["id"]);
//!
//! let n = baseline.len();
//! let report = compare_windows(
//!     "shop",
//!     1,
//!     &Window::new(WindowRole::Baseline, WindowRange::new(0, n), baseline.batches().to_vec()),
//!     &Window::new(WindowRole::Current, WindowRange::new(n, n + current.len()), current.batches().to_vec()),
//!     &schema,
//!     &DriftConfig::default(),
//! )
//! .unwrap();
//!
//! println!("{}", report.render_text());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
// Allow in tests
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::cast_lossless,
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_precision_loss,
        clippy::too_many_lines,
        clippy::float_cmp,
        clippy::similar_names,
        clippy::unreadable_literal
    )
)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::module_name_repetitions)]

#[cfg(feature = "tokio-runtime")]
pub mod async_monitor;
pub mod backend;
/// CLI module for command-line interface
#[cfg(feature = "cli")]
pub mod cli;
pub mod comparison;
pub mod config;
pub mod drift;
pub mod error;
pub mod forest;
pub mod frame;
pub mod interpret;
pub mod model_drift;
pub mod monitor;
pub mod prediction;
pub mod report;
pub mod schema;
pub mod stats;
pub mod window;

// Re-export arrow types commonly needed
pub use arrow::{
    array::RecordBatch,
    datatypes::{Schema, SchemaRef},
};
#[cfg(feature = "tokio-runtime")]
pub use async_monitor::AsyncDriftMonitor;
pub use comparison::compare_windows;
pub use config::{
    CategorySmoothing, DriftConfig, ModelDriftConfig, ModelMetric, OverallDriftPolicy, PsiBands,
};
pub use drift::{DriftTest, FeatureTests, PsiSeverity, TestResult};
pub use error::{Error, Result};
pub use frame::Frame;
pub use interpret::{DriftInterpreter, SummaryInterpreter};
pub use model_drift::ModelDriftResult;
pub use monitor::{ComparisonFailure, DriftMonitor, IngestSummary};
pub use prediction::{PredictionDriftMonitor, PredictionDriftResult, TaskType};
pub use report::{DriftReport, FeatureStatsPair, ReportBuilder, SkipReason, SkippedFeature};
pub use schema::{Feature, FeatureKind, FeatureSchema};
pub use stats::FeatureStats;
pub use window::{
    ComparisonWindows, FeatureColumn, Window, WindowManager, WindowRange, WindowRole, WindowState,
};
