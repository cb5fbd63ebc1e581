//! Explicit feature schema.
//!
//! Every monitored column is declared once as [`FeatureKind::Numeric`] or
//! [`FeatureKind::Categorical`]. Incoming batches are validated against the
//! schema at ingestion so the test battery never probes column types at
//! comparison time.

use arrow::{
    array::RecordBatch,
    datatypes::{DataType, Schema},
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How a feature is analysed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// Continuous or integer values.
    Numeric,
    /// Discrete labels.
    Categorical,
}

impl FeatureKind {
    /// Classify an Arrow data type, or `None` if it cannot be monitored.
    pub fn from_data_type(data_type: &DataType) -> Option<Self> {
        match data_type {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float16
            | DataType::Float32
            | DataType::Float64
            | DataType::Decimal128(_, _)
            | DataType::Decimal256(_, _) => Some(Self::Numeric),
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Boolean => Some(Self::Categorical),
            DataType::Dictionary(_, value) => match value.as_ref() {
                DataType::Utf8 | DataType::LargeUtf8 => Some(Self::Categorical),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether a column of `data_type` can be read as this kind.
    pub fn accepts(&self, data_type: &DataType) -> bool {
        match (self, Self::from_data_type(data_type)) {
            (_, Some(kind)) if kind == *self => true,
            // Integer-coded categories are common in tabular exports
            (Self::Categorical, Some(Self::Numeric)) => !matches!(
                data_type,
                DataType::Float16 | DataType::Float32 | DataType::Float64
            ),
            (_, _) => matches!(data_type, DataType::Null),
        }
    }

    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Categorical => "categorical",
        }
    }
}

/// A declared feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    /// Column name.
    pub name: String,
    /// Declared kind.
    pub kind: FeatureKind,
}

/// Ordered mapping from feature name to declared kind.
///
/// Feature order is preserved in every report built against this schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    features: Vec<Feature>,
}

impl FeatureSchema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a feature. Re-declaring a name replaces its kind.
    #[must_use]
    pub fn with_feature(mut self, name: impl Into<String>, kind: FeatureKind) -> Self {
        let name = name.into();
        if let Some(existing) = self.features.iter_mut().find(|f| f.name == name) {
            existing.kind = kind;
        } else {
            self.features.push(Feature { name, kind });
        }
        self
    }

    /// Declare a numeric feature.
    #[must_use]
    pub fn numeric(self, name: impl Into<String>) -> Self {
        self.with_feature(name, FeatureKind::Numeric)
    }

    /// Declare a categorical feature.
    #[must_use]
    pub fn categorical(self, name: impl Into<String>) -> Self {
        self.with_feature(name, FeatureKind::Categorical)
    }

    /// Infer a schema from an Arrow schema.
    ///
    /// Columns whose types cannot be monitored (timestamps, binary, nested)
    /// and columns named in `exclude` are left out.
    pub fn infer(schema: &Schema, exclude: &[&str]) -> Self {
        schema
            .fields()
            .iter()
            .filter(|field| !exclude.contains(&field.name().as_str()))
            .filter_map(|field| {
                FeatureKind::from_data_type(field.data_type()).map(|kind| Feature {
                    name: field.name().clone(),
                    kind,
                })
            })
            .fold(Self::new(), |schema, f| schema.with_feature(f.name, f.kind))
    }

    /// All declared features in order.
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Number of declared features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns true if no features are declared.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Kind of a declared feature.
    pub fn kind(&self, name: &str) -> Option<FeatureKind> {
        self.features
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.kind)
    }

    /// Names of the numeric features, in order.
    pub fn numeric_features(&self) -> impl Iterator<Item = &str> {
        self.features
            .iter()
            .filter(|f| f.kind == FeatureKind::Numeric)
            .map(|f| f.name.as_str())
    }

    /// Validate an incoming batch.
    ///
    /// Declared columns that are present must be readable as their kind.
    /// Absent columns are allowed; undeclared columns are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] if a present column has an
    /// incompatible type, or if the schema declares no features.
    pub fn validate_batch(&self, batch: &RecordBatch) -> Result<()> {
        if self.features.is_empty() {
            return Err(Error::schema_mismatch("feature schema declares no features"));
        }

        let batch_schema = batch.schema();
        for feature in &self.features {
            if let Ok(field) = batch_schema.field_with_name(&feature.name) {
                if !feature.kind.accepts(field.data_type()) {
                    return Err(Error::schema_mismatch(format!(
                        "column '{}' is declared {} but has type {}",
                        feature.name,
                        feature.kind.as_str(),
                        field.data_type()
                    )));
                }
            }
        }

        Ok(())
    }
}
