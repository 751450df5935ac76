//! Simple Moving Average (SMA).
//!
//! Mean of close prices over a trailing window.
//! Lookback: window - 1 (first value at index window-1).

use super::{closes, Indicator};
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Sma {
    window: usize,
    name: String,
}

impl Sma {
    pub fn new(window: usize) -> Self {
        assert!(window >= 1, "SMA window must be >= 1");
        Self {
            window,
            name: format!("sma_{window}"),
        }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.window.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<Option<f64>> {
        sma_of_series(&closes(bars), self.window)
    }
}

/// Trailing mean of an arbitrary series.
///
/// Each window is summed on its own, so a value depends only on its window.
/// Values are summed as offsets from the window's first value, which keeps a
/// constant window exactly equal to its value.
pub fn sma_of_series(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let n = values.len();
    if window == 0 {
        return vec![None; n];
    }
    (0..n)
        .map(|i| {
            (i + 1 >= window).then(|| {
                let slice = &values[i + 1 - window..=i];
                let base = slice[0];
                base + slice.iter().map(|v| v - base).sum::<f64>() / window as f64
            })
        })
        .collect()
}
