//! Error types for vigilar.

use std::path::PathBuf;

use crate::window::WindowRole;

/// Result type alias for vigilar operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while monitoring drift.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// I/O error during file operations.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        /// The path where the error occurred, if known.
        path: Option<PathBuf>,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Arrow error during data processing.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error during file operations.
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A window holds fewer rows than a comparison requires.
    ///
    /// Recoverable: the caller should wait for more data.
    #[error("Insufficient data in {window} window: {rows} rows, {required} required")]
    InsufficientData {
        /// Which window is short.
        window: WindowRole,
        /// Rows currently in the window.
        rows: usize,
        /// Rows required.
        required: usize,
    },

    /// A feature present in one window is absent from the other.
    #[error("Feature '{feature}' is missing from one of the compared windows")]
    FeatureMismatch {
        /// The missing feature.
        feature: String,
    },

    /// A ratio or statistic became undefined (zero or degenerate denominator).
    ///
    /// Raised internally and resolved with an epsilon floor.
    #[error("Numeric instability: {message}")]
    NumericInstability {
        /// Description of the degenerate computation.
        message: String,
    },

    /// The model-based detector could not train or score its classifier.
    #[error("Model training failed: {message}")]
    ModelTraining {
        /// Description of the failure.
        message: String,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// Column not found in schema.
    #[error("Column '{name}' not found in schema")]
    ColumnNotFound {
        /// The name of the missing column.
        name: String,
    },

    /// Schema mismatch between a declared feature schema and incoming rows.
    #[error("Schema mismatch: {message}")]
    SchemaMismatch {
        /// Description of the schema mismatch.
        message: String,
    },

    /// No monitor state has been registered for the project.
    #[error("Unknown project '{project}'")]
    UnknownProject {
        /// The project identifier.
        project: String,
    },

    /// Unsupported file format.
    #[error("Unsupported format: {format}")]
    UnsupportedFormat {
        /// The unsupported format name or extension.
        format: String,
    },

    /// Row source, config store, or report sink failure.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The optional interpretation service failed.
    #[error("Interpretation failed: {message}")]
    Interpretation {
        /// Description of the failure.
        message: String,
    },
}

impl Error {
    /// Create an I/O error with a path context.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            path: Some(path.into()),
            source,
        }
    }

    /// Create an insufficient data error.
    pub fn insufficient_data(window: WindowRole, rows: usize, required: usize) -> Self {
        Self::InsufficientData {
            window,
            rows,
            required,
        }
    }

    /// Create a feature mismatch error.
    pub fn feature_mismatch(feature: impl Into<String>) -> Self {
        Self::FeatureMismatch {
            feature: feature.into(),
        }
    }

    /// Create a numeric instability error.
    pub fn numeric_instability(message: impl Into<String>) -> Self {
        Self::NumericInstability {
            message: message.into(),
        }
    }

    /// Create a model training error.
    pub fn model_training(message: impl Into<String>) -> Self {
        Self::ModelTraining {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a column not found error.
    pub fn column_not_found(name: impl Into<String>) -> Self {
        Self::ColumnNotFound { name: name.into() }
    }

    /// Create a schema mismatch error.
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }

    /// Create an unknown project error.
    pub fn unknown_project(project: impl Into<String>) -> Self {
        Self::UnknownProject {
            project: project.into(),
        }
    }

    /// Create an unsupported format error.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create an interpretation error.
    pub fn interpretation(message: impl Into<String>) -> Self {
        Self::Interpretation {
            message: message.into(),
        }
    }

    /// Whether the caller can recover by waiting for more rows.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }
}
