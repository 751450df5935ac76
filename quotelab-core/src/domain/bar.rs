//! Bar and PriceSeries: the canonical market data units.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical OHLCV bar for one time bucket.
///
/// Field names are provider-agnostic; renaming from provider labels happens
/// once in `data::canonicalize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    /// Traded value, when the provider reports it.
    pub turnover: Option<f64>,
}

impl Bar {
    /// True when every price field is finite and non-negative.
    pub fn has_valid_prices(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        prices.iter().all(|p| p.is_finite() && *p >= 0.0)
            && self
                .turnover
                .map_or(true, |t| t.is_finite() && t >= 0.0)
    }
}

/// Invariant violations when building a `PriceSeries`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("timestamps not strictly increasing at index {index}: {previous} then {current}")]
    NotIncreasing {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("duplicate timestamp {timestamp} at index {index}")]
    DuplicateTimestamp {
        index: usize,
        timestamp: DateTime<Utc>,
    },

    #[error("invalid price at index {index} ({timestamp}): prices must be finite and non-negative")]
    InvalidPrice {
        index: usize,
        timestamp: DateTime<Utc>,
    },
}

/// Ordered OHLCV bars with strictly increasing timestamps.
///
/// The empty series is the explicit "no data" state. Construction goes through
/// [`PriceSeries::new`], so a value of this type always satisfies the
/// ordering and price invariants.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceSeries {
    bars: Vec<Bar>,
}

impl PriceSeries {
    /// Validate and wrap a bar vector.
    pub fn new(bars: Vec<Bar>) -> Result<Self, SeriesError> {
        for (index, bar) in bars.iter().enumerate() {
            if !bar.has_valid_prices() {
                return Err(SeriesError::InvalidPrice {
                    index,
                    timestamp: bar.timestamp,
                });
            }
        }

        for (i, pair) in bars.windows(2).enumerate() {
            let (previous, current) = (pair[0].timestamp, pair[1].timestamp);
            if current == previous {
                return Err(SeriesError::DuplicateTimestamp {
                    index: i + 1,
                    timestamp: current,
                });
            }
            if current < previous {
                return Err(SeriesError::NotIncreasing {
                    index: i + 1,
                    previous,
                    current,
                });
            }
        }

        Ok(Self { bars })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first(&self) -> Option<&Bar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Close prices in series order.
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}
