//! Deterministic synthetic data for offline use and tests.
//!
//! Produces a random walk from a starting price of 100.0, seeded from the
//! symbol and interval so the same request always yields the same bars.

use super::provider::{DataError, DataProvider};
use super::schema::{self, ColumnMap};
use crate::domain::{FetchRequest, Interval};
use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Regular US session in UTC (09:30-16:00 New York, ignoring DST).
const SESSION_OPEN: (u32, u32) = (14, 30);
const SESSION_CLOSE: (u32, u32) = (21, 0);

const START_PRICE: f64 = 100.0;

/// Upper bound on bars per request.
pub const MAX_BARS: usize = 100_000;

/// Random-walk provider. Output is clearly fake; use it for demos and tests only.
#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    columns: ColumnMap,
}

impl SyntheticProvider {
    pub fn new() -> Self {
        Self {
            columns: ColumnMap::default(),
        }
    }

    fn rng_for(request: &FetchRequest) -> StdRng {
        let mut hasher = blake3::Hasher::new();
        hasher.update(request.symbol.as_bytes());
        hasher.update(request.interval.code().as_bytes());
        StdRng::from_seed(*hasher.finalize().as_bytes())
    }

    /// Bar open times covered by the request.
    fn timestamps(request: &FetchRequest) -> Vec<DateTime<Utc>> {
        let step = chrono::Duration::from_std(request.interval.duration())
            .unwrap_or(chrono::Duration::days(1));
        let mut out = Vec::new();
        let mut day = request.start;

        if request.interval.is_intraday() {
            let (open_h, open_m) = SESSION_OPEN;
            let (close_h, close_m) = SESSION_CLOSE;
            let open = NaiveTime::from_hms_opt(open_h, open_m, 0).unwrap_or_default();
            let close = NaiveTime::from_hms_opt(close_h, close_m, 0).unwrap_or_default();
            while day <= request.end && out.len() < MAX_BARS {
                if !is_weekend(day.weekday()) {
                    let session_end = day.and_time(close).and_utc();
                    let mut t = day.and_time(open).and_utc();
                    while t < session_end && out.len() < MAX_BARS {
                        out.push(t);
                        t += step;
                    }
                }
                day += chrono::Duration::days(1);
            }
        } else if request.interval == Interval::OneDay {
            while day <= request.end && out.len() < MAX_BARS {
                if !is_weekend(day.weekday()) {
                    out.push(day.and_time(NaiveTime::MIN).and_utc());
                }
                day += chrono::Duration::days(1);
            }
        } else {
            let end = request.end.and_time(NaiveTime::MIN).and_utc();
            let mut t = day.and_time(NaiveTime::MIN).and_utc();
            while t <= end && out.len() < MAX_BARS {
                out.push(t);
                t += step;
            }
        }
        out
    }
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}

impl DataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn column_map(&self) -> &ColumnMap {
        &self.columns
    }

    fn supports(&self, _interval: Interval) -> bool {
        true
    }

    fn fetch(&self, request: &FetchRequest) -> Result<DataFrame, DataError> {
        let timestamps = Self::timestamps(request);
        let mut rng = Self::rng_for(request);
        let n = timestamps.len();

        // Per-bar move scales with the square root of the bar length in days.
        let days = request.interval.duration().as_secs_f64() / 86_400.0;
        let range = 0.03 * days.sqrt();

        let mut ts = Vec::with_capacity(n);
        let mut open = Vec::with_capacity(n);
        let mut high = Vec::with_capacity(n);
        let mut low = Vec::with_capacity(n);
        let mut close = Vec::with_capacity(n);
        let mut volume = Vec::with_capacity(n);
        let mut turnover = Vec::with_capacity(n);

        let mut price = START_PRICE;
        for t in timestamps {
            let ret: f64 = rng.gen_range(-range..range);
            let o = price;
            let c = price * (1.0 + ret);
            let h = o.max(c) * (1.0 + rng.gen_range(0.0..0.01));
            let l = o.min(c) * (1.0 - rng.gen_range(0.0..0.01));
            let v = rng.gen_range(500_000..5_000_000u64);

            ts.push(t.timestamp());
            open.push(o);
            high.push(h);
            low.push(l);
            close.push(c);
            volume.push(v);
            turnover.push((h + l + c) / 3.0 * v as f64);
            price = c;
        }

        let frame = DataFrame::new(vec![
            Column::new(schema::TIMESTAMP.into(), ts),
            Column::new(schema::OPEN.into(), open),
            Column::new(schema::HIGH.into(), high),
            Column::new(schema::LOW.into(), low),
            Column::new(schema::CLOSE.into(), close),
            Column::new(schema::VOLUME.into(), volume),
            Column::new(schema::TURNOVER.into(), turnover),
        ])?;
        Ok(frame)
    }
}
