//! Canonical column names and provider column mappings.

use polars::prelude::*;
use serde::{Deserialize, Serialize};

pub const TIMESTAMP: &str = "timestamp";
pub const OPEN: &str = "open";
pub const HIGH: &str = "high";
pub const LOW: &str = "low";
pub const CLOSE: &str = "close";
pub const VOLUME: &str = "volume";
pub const TURNOVER: &str = "turnover";

/// How integer timestamps from a provider are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpochUnit {
    #[default]
    Seconds,
    Milliseconds,
}

/// Maps provider-specific column labels onto the canonical OHLCV names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub timestamp: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
    pub turnover: Option<String>,
    pub epoch_unit: EpochUnit,
}

impl ColumnMap {
    /// Pairs of (provider label, canonical name) for every mapped column.
    pub fn renames(&self) -> Vec<(&str, &'static str)> {
        let mut pairs = vec![
            (self.timestamp.as_str(), TIMESTAMP),
            (self.open.as_str(), OPEN),
            (self.high.as_str(), HIGH),
            (self.low.as_str(), LOW),
            (self.close.as_str(), CLOSE),
            (self.volume.as_str(), VOLUME),
        ];
        if let Some(turnover) = &self.turnover {
            pairs.push((turnover.as_str(), TURNOVER));
        }
        pairs
    }

    /// Title-case labels as written by common spreadsheet exports
    /// (`Date`, `Open`, …, `Volume`).
    pub fn title_case(timestamp: &str) -> Self {
        Self {
            timestamp: timestamp.to_string(),
            open: "Open".into(),
            high: "High".into(),
            low: "Low".into(),
            close: "Close".into(),
            volume: "Volume".into(),
            turnover: None,
            epoch_unit: EpochUnit::Seconds,
        }
    }
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            timestamp: TIMESTAMP.into(),
            open: OPEN.into(),
            high: HIGH.into(),
            low: LOW.into(),
            close: CLOSE.into(),
            volume: VOLUME.into(),
            turnover: Some(TURNOVER.into()),
            epoch_unit: EpochUnit::Seconds,
        }
    }
}

/// Expected schema for canonical bar frames.
pub struct BarSchema;

impl BarSchema {
    pub fn schema() -> Schema {
        Schema::from_iter(vec![
            Field::new(
                TIMESTAMP.into(),
                DataType::Datetime(TimeUnit::Milliseconds, None),
            ),
            Field::new(OPEN.into(), DataType::Float64),
            Field::new(HIGH.into(), DataType::Float64),
            Field::new(LOW.into(), DataType::Float64),
            Field::new(CLOSE.into(), DataType::Float64),
            Field::new(VOLUME.into(), DataType::UInt64),
            Field::new(TURNOVER.into(), DataType::Float64),
        ])
    }

    /// Validate a DataFrame against the canonical schema.
    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        let expected = Self::schema();
        let actual = df.schema();

        for field in expected.iter_fields() {
            let actual_dtype = actual
                .get(field.name())
                .ok_or_else(|| SchemaError::MissingColumn(field.name().to_string()))?;
            if actual_dtype != field.dtype() {
                return Err(SchemaError::TypeMismatch {
                    column: field.name().to_string(),
                    expected: field.dtype().clone(),
                    actual: actual_dtype.clone(),
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },
}
