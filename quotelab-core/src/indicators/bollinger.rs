//! Bollinger Bands: moving average +/- a multiple of the standard deviation.
//!
//! Four series, each exposed as its own `Indicator` instance:
//! - Middle: SMA(close, window)
//! - StdDev: sample standard deviation of close over the window (divide by N-1)
//! - Upper: middle + k * stddev
//! - Lower: middle - k * stddev
//!
//! Lookback: window - 1. A one-element sample deviation is undefined, so with
//! window < 2 every band is undefined.

use super::sma::sma_of_series;
use super::{closes, Indicator};
use crate::domain::Bar;

/// Which series of the Bollinger Bands to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BollingerBand {
    Middle,
    StdDev,
    Upper,
    Lower,
}

impl BollingerBand {
    pub const ALL: [BollingerBand; 4] = [
        BollingerBand::Middle,
        BollingerBand::StdDev,
        BollingerBand::Upper,
        BollingerBand::Lower,
    ];
}

/// All four series for one (window, k).
#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub middle: Vec<Option<f64>>,
    pub stddev: Vec<Option<f64>>,
    pub upper: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

impl BollingerBands {
    pub fn band(&self, band: BollingerBand) -> &[Option<f64>] {
        match band {
            BollingerBand::Middle => &self.middle,
            BollingerBand::StdDev => &self.stddev,
            BollingerBand::Upper => &self.upper,
            BollingerBand::Lower => &self.lower,
        }
    }
}

/// Compute every band over an arbitrary series.
pub fn compute_bands(values: &[f64], window: usize, k: f64) -> BollingerBands {
    let n = values.len();
    if window < 2 {
        return BollingerBands {
            middle: vec![None; n],
            stddev: vec![None; n],
            upper: vec![None; n],
            lower: vec![None; n],
        };
    }

    let middle = sma_of_series(values, window);
    let stddev: Vec<Option<f64>> = middle
        .iter()
        .enumerate()
        .map(|(i, mean)| {
            mean.map(|mean| {
                let window_values = &values[i + 1 - window..=i];
                let sum_sq: f64 = window_values.iter().map(|v| (v - mean).powi(2)).sum();
                (sum_sq / (window - 1) as f64).sqrt()
            })
        })
        .collect();

    let offset = |sign: f64| -> Vec<Option<f64>> {
        middle
            .iter()
            .zip(&stddev)
            .map(|(m, sd)| Some((*m)? + sign * k * (*sd)?))
            .collect()
    };
    let upper = offset(1.0);
    let lower = offset(-1.0);

    BollingerBands {
        middle,
        stddev,
        upper,
        lower,
    }
}

#[derive(Debug, Clone)]
pub struct Bollinger {
    window: usize,
    k: f64,
    band: BollingerBand,
    name: String,
}

impl Bollinger {
    pub fn new(window: usize, k: f64, band: BollingerBand) -> Self {
        assert!(window >= 1, "Bollinger window must be >= 1");
        let name = match band {
            BollingerBand::Middle => format!("bollinger_middle_{window}"),
            BollingerBand::StdDev => format!("bollinger_stddev_{window}"),
            BollingerBand::Upper => format!("bollinger_upper_{window}_{k}"),
            BollingerBand::Lower => format!("bollinger_lower_{window}_{k}"),
        };
        Self {
            window,
            k,
            band,
            name,
        }
    }

    pub fn middle(window: usize, k: f64) -> Self {
        Self::new(window, k, BollingerBand::Middle)
    }

    pub fn upper(window: usize, k: f64) -> Self {
        Self::new(window, k, BollingerBand::Upper)
    }

    pub fn lower(window: usize, k: f64) -> Self {
        Self::new(window, k, BollingerBand::Lower)
    }
}

impl Indicator for Bollinger {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.window.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<Option<f64>> {
        let bands = compute_bands(&closes(bars), self.window, self.k);
        match self.band {
            BollingerBand::Middle => bands.middle,
            BollingerBand::StdDev => bands.stddev,
            BollingerBand::Upper => bands.upper,
            BollingerBand::Lower => bands.lower,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn middle_is_sma() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        let result = Bollinger::middle(3, 2.0).compute(&bars);

        assert!(result[0].is_none());
        assert!(result[1].is_none());
        assert_approx(result[2].unwrap(), 11.0, DEFAULT_EPSILON);
        assert_approx(result[3].unwrap(), 12.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sample_standard_deviation() {
        // Window [10, 11, 12]: mean 11, sum of squares 2, sample variance 1.
        let bands = compute_bands(&[10.0, 11.0, 12.0], 3, 2.0);
        assert_approx(bands.stddev[2].unwrap(), 1.0, DEFAULT_EPSILON);
        assert_approx(bands.upper[2].unwrap(), 13.0, DEFAULT_EPSILON);
        assert_approx(bands.lower[2].unwrap(), 9.0, DEFAULT_EPSILON);
    }

    #[test]
    fn bands_symmetric() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        let upper = Bollinger::upper(3, 2.0).compute(&bars);
        let middle = Bollinger::middle(3, 2.0).compute(&bars);
        let lower = Bollinger::lower(3, 2.0).compute(&bars);

        for i in 2..5 {
            let half_width = upper[i].unwrap() - middle[i].unwrap();
            assert_approx(middle[i].unwrap() - lower[i].unwrap(), half_width, DEFAULT_EPSILON);
        }
    }

    #[test]
    fn constant_price_zero_width() {
        let bands = compute_bands(&[100.0; 4], 3, 2.0);
        for i in 2..4 {
            assert_eq!(bands.stddev[i], Some(0.0));
            assert_eq!(bands.upper[i], Some(100.0));
            assert_eq!(bands.lower[i], Some(100.0));
        }
    }

    #[test]
    fn constant_inexact_price_zero_width() {
        for price in [0.1, 101.37] {
            let bands = compute_bands(&[price; 25], 20, 2.0);
            for i in 19..25 {
                assert_eq!(bands.middle[i], Some(price));
                assert_eq!(bands.stddev[i], Some(0.0));
                assert_eq!(bands.upper[i], bands.lower[i]);
                assert_eq!(bands.upper[i], bands.middle[i]);
            }
        }
    }

    #[test]
    fn window_below_two_is_undefined() {
        let bands = compute_bands(&[1.0, 2.0, 3.0], 1, 2.0);
        for band in BollingerBand::ALL {
            assert!(bands.band(band).iter().all(Option::is_none));
        }
    }

    #[test]
    fn column_names() {
        assert_eq!(Bollinger::middle(20, 2.0).name(), "bollinger_middle_20");
        assert_eq!(
            Bollinger::new(20, 2.0, BollingerBand::StdDev).name(),
            "bollinger_stddev_20"
        );
        assert_eq!(Bollinger::upper(20, 2.0).name(), "bollinger_upper_20_2");
        assert_eq!(Bollinger::lower(20, 2.5).name(), "bollinger_lower_20_2.5");
        assert_eq!(Bollinger::upper(20, 2.0).lookback(), 19);
    }
}
