//! Technical indicators over close prices, and the engine that applies them.
//!
//! Indicators are pure functions: bar history in, one value per bar out.
//! `None` marks positions where the indicator is undefined (warmup).
//! Bollinger Bands are multi-series and exposed as one named instance per band.

pub mod bollinger;
pub mod ema;
pub mod engine;
pub mod sma;

pub use bollinger::{Bollinger, BollingerBand, BollingerBands};
pub use ema::Ema;
pub use engine::{
    AugmentedRow, AugmentedSeries, IndicatorColumn, IndicatorEngine, IndicatorKind,
    IndicatorParamError, IndicatorParams, IndicatorSet,
};
pub use sma::Sma;

use crate::domain::Bar;

/// An indicator over a full bar series.
///
/// The output has the same length as the input. No value at bar t may depend
/// on bars after t; truncating the input must leave the prefix unchanged.
pub trait Indicator: Send + Sync {
    /// Output column name (e.g. "sma_20").
    fn name(&self) -> &str;

    /// Number of leading bars without a value.
    fn lookback(&self) -> usize;

    fn compute(&self, bars: &[Bar]) -> Vec<Option<f64>>;
}

fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Create bars from close prices for testing.
///
/// Generates plausible OHLV: open = prev_close (or close for the first bar),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    use chrono::{TimeZone, Utc};
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                timestamp: base + chrono::Duration::days(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: (open.min(close) - 1.0).max(0.0),
                close,
                volume: 1000,
                turnover: None,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
