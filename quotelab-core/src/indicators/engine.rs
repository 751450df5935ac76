//! Indicator engine: applies a set of indicators to a price series.
//!
//! Every indicator reads the same immutable series and produces its own
//! column; nothing is shared between indicators or between calls.

use super::bollinger::BollingerBand;
use super::{Bollinger, Ema, Indicator, Sma};
use crate::data::schema;
use crate::domain::{Bar, PriceSeries};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorKind {
    Sma,
    Ema,
    Bollinger,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 3] = [
        IndicatorKind::Sma,
        IndicatorKind::Ema,
        IndicatorKind::Bollinger,
    ];
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IndicatorKind::Sma => "sma",
            IndicatorKind::Ema => "ema",
            IndicatorKind::Bollinger => "bollinger",
        })
    }
}

impl FromStr for IndicatorKind {
    type Err = IndicatorParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sma" => Ok(IndicatorKind::Sma),
            "ema" => Ok(IndicatorKind::Ema),
            "bollinger" | "bb" | "bbands" => Ok(IndicatorKind::Bollinger),
            other => Err(IndicatorParamError::UnknownIndicator(other.to_string())),
        }
    }
}

/// A subset of the available indicators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndicatorSet(BTreeSet<IndicatorKind>);

impl IndicatorSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        IndicatorKind::ALL.into_iter().collect()
    }

    pub fn insert(&mut self, kind: IndicatorKind) -> bool {
        self.0.insert(kind)
    }

    pub fn contains(&self, kind: IndicatorKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = IndicatorKind> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<IndicatorKind> for IndicatorSet {
    fn from_iter<I: IntoIterator<Item = IndicatorKind>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Comma-separated list, e.g. `"sma,bollinger"`. Empty string is the empty set.
impl FromStr for IndicatorSet {
    type Err = IndicatorParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for IndicatorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.iter().map(|k| k.to_string()).collect();
        f.write_str(&names.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndicatorParamError {
    #[error("unknown indicator '{0}' (expected sma, ema or bollinger)")]
    UnknownIndicator(String),

    #[error("{name} must be >= 1, got {value}")]
    WindowTooSmall { name: &'static str, value: usize },

    #[error("bollinger_k must be finite and >= 0, got {0}")]
    InvalidMultiplier(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorParams {
    pub sma_window: usize,
    pub ema_span: usize,
    pub bollinger_window: usize,
    pub bollinger_k: f64,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            sma_window: 20,
            ema_span: 20,
            bollinger_window: 20,
            bollinger_k: 2.0,
        }
    }
}

impl IndicatorParams {
    pub fn validate(&self) -> Result<(), IndicatorParamError> {
        for (name, value) in [
            ("sma_window", self.sma_window),
            ("ema_span", self.ema_span),
            ("bollinger_window", self.bollinger_window),
        ] {
            if value < 1 {
                return Err(IndicatorParamError::WindowTooSmall { name, value });
            }
        }
        if !self.bollinger_k.is_finite() || self.bollinger_k < 0.0 {
            return Err(IndicatorParamError::InvalidMultiplier(self.bollinger_k));
        }
        Ok(())
    }
}

/// One named output column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// A bar plus its indicator values, for row-oriented output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AugmentedRow {
    #[serde(flatten)]
    pub bar: Bar,
    pub indicators: BTreeMap<String, Option<f64>>,
}

/// The input series plus one column per computed indicator.
///
/// The base series is shared, not copied; with no indicators this is the
/// input unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedSeries {
    series: Arc<PriceSeries>,
    columns: Vec<IndicatorColumn>,
}

impl AugmentedSeries {
    pub fn series(&self) -> &Arc<PriceSeries> {
        &self.series
    }

    pub fn columns(&self) -> &[IndicatorColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Value of `name` at bar `index`; `None` if undefined or absent.
    pub fn value(&self, name: &str, index: usize) -> Option<f64> {
        self.column(name)?.get(index).copied().flatten()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn rows(&self) -> Vec<AugmentedRow> {
        self.series
            .bars()
            .iter()
            .enumerate()
            .map(|(i, bar)| AugmentedRow {
                bar: bar.clone(),
                indicators: self
                    .columns
                    .iter()
                    .map(|c| (c.name.clone(), c.values[i]))
                    .collect(),
            })
            .collect()
    }

    /// Last `n` rows (all rows if the series is shorter).
    pub fn tail_rows(&self, n: usize) -> Vec<AugmentedRow> {
        let mut rows = self.rows();
        let skip = rows.len().saturating_sub(n);
        rows.split_off(skip)
    }

    /// Base OHLCV columns plus indicator columns; undefined values are null.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let bars = self.series.bars();
        let millis: Vec<i64> = bars.iter().map(|b| b.timestamp.timestamp_millis()).collect();
        let timestamp = Column::new(schema::TIMESTAMP.into(), millis)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;

        let mut columns = vec![
            timestamp,
            Column::new(schema::OPEN.into(), bars.iter().map(|b| b.open).collect::<Vec<_>>()),
            Column::new(schema::HIGH.into(), bars.iter().map(|b| b.high).collect::<Vec<_>>()),
            Column::new(schema::LOW.into(), bars.iter().map(|b| b.low).collect::<Vec<_>>()),
            Column::new(schema::CLOSE.into(), bars.iter().map(|b| b.close).collect::<Vec<_>>()),
            Column::new(
                schema::VOLUME.into(),
                bars.iter().map(|b| b.volume).collect::<Vec<u64>>(),
            ),
            Column::new(
                schema::TURNOVER.into(),
                bars.iter().map(|b| b.turnover).collect::<Vec<_>>(),
            ),
        ];
        for c in &self.columns {
            columns.push(Column::new(c.name.as_str().into(), c.values.clone()));
        }
        DataFrame::new(columns)
    }

    pub fn tail_frame(&self, n: usize) -> PolarsResult<DataFrame> {
        Ok(self.to_dataframe()?.tail(Some(n)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct IndicatorEngine {
    params: IndicatorParams,
}

impl IndicatorEngine {
    pub fn new(params: IndicatorParams) -> Result<Self, IndicatorParamError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &IndicatorParams {
        &self.params
    }

    /// Indicator instances for a set, in output column order.
    pub fn indicators_for(&self, set: &IndicatorSet) -> Vec<Box<dyn Indicator>> {
        let p = &self.params;
        let mut out: Vec<Box<dyn Indicator>> = Vec::new();
        for kind in set.iter() {
            match kind {
                IndicatorKind::Sma => out.push(Box::new(Sma::new(p.sma_window))),
                IndicatorKind::Ema => out.push(Box::new(Ema::new(p.ema_span))),
                IndicatorKind::Bollinger => {
                    for band in BollingerBand::ALL {
                        out.push(Box::new(Bollinger::new(
                            p.bollinger_window,
                            p.bollinger_k,
                            band,
                        )));
                    }
                }
            }
        }
        out
    }

    pub fn compute(&self, series: Arc<PriceSeries>, set: &IndicatorSet) -> AugmentedSeries {
        let bars = series.bars();
        let columns = self
            .indicators_for(set)
            .iter()
            .map(|indicator| IndicatorColumn {
                name: indicator.name().to_string(),
                values: indicator.compute(bars),
            })
            .collect();

        tracing::debug!(bars = bars.len(), indicators = %set, "computed indicators");
        AugmentedSeries { series, columns }
    }
}
