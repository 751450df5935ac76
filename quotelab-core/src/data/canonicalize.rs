//! Normalization of provider frames into a canonical `PriceSeries`.
//!
//! Runs exactly once per fetch, inside the fetcher:
//! 1. rename provider labels to canonical OHLCV names
//! 2. convert the timestamp column to `DateTime<Utc>`
//! 3. drop rows with missing price fields
//! 4. sort ascending by timestamp
//! 5. validate (duplicates, non-finite or negative prices are rejected)

use super::provider::DataError;
use super::schema::{self, ColumnMap, EpochUnit};
use crate::domain::{Bar, PriceSeries};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::*;

/// Canonicalizer for provider frames.
pub struct Canonicalizer;

impl Canonicalizer {
    /// Normalize a raw provider frame into a validated series.
    pub fn normalize(frame: DataFrame, columns: &ColumnMap) -> Result<PriceSeries, DataError> {
        if frame.height() == 0 {
            return Ok(PriceSeries::empty());
        }

        let frame = Self::rename_columns(frame, columns)?;
        let timestamps = timestamp_values(column(&frame, schema::TIMESTAMP)?, columns.epoch_unit)?;
        let opens = float_values(&frame, schema::OPEN)?;
        let highs = float_values(&frame, schema::HIGH)?;
        let lows = float_values(&frame, schema::LOW)?;
        let closes = float_values(&frame, schema::CLOSE)?;
        let volumes = float_values(&frame, schema::VOLUME)?;
        let turnovers = if frame.column(schema::TURNOVER).is_ok() {
            Some(float_values(&frame, schema::TURNOVER)?)
        } else {
            None
        };

        let mut bars = Vec::with_capacity(frame.height());
        let mut dropped = 0usize;

        for i in 0..frame.height() {
            let price = |values: &[Option<f64>]| values[i].filter(|v| !v.is_nan());
            let (Some(timestamp), Some(open), Some(high), Some(low), Some(close)) = (
                timestamps[i],
                price(&opens),
                price(&highs),
                price(&lows),
                price(&closes),
            ) else {
                dropped += 1;
                continue;
            };

            let volume = match volumes[i].filter(|v| !v.is_nan()) {
                None => 0,
                Some(v) if v.is_finite() && v >= 0.0 => v.round() as u64,
                Some(v) => {
                    return Err(DataError::Validation(format!(
                        "invalid volume {v} at {timestamp}"
                    )))
                }
            };

            bars.push(Bar {
                timestamp,
                open,
                high,
                low,
                close,
                volume,
                turnover: turnovers
                    .as_ref()
                    .and_then(|t| t[i])
                    .filter(|v| !v.is_nan()),
            });
        }

        if dropped > 0 {
            tracing::warn!(
                dropped,
                kept = bars.len(),
                "dropped rows with missing price fields"
            );
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(PriceSeries::new(bars)?)
    }

    /// Rename mapped provider labels to their canonical names.
    ///
    /// A canonical-named column that is not the mapping source is dropped first,
    /// so mapping e.g. `"Adj Close"` onto `close` replaces a raw `close` column.
    pub fn rename_columns(mut frame: DataFrame, columns: &ColumnMap) -> Result<DataFrame, DataError> {
        for (from, to) in columns.renames() {
            let optional = to == schema::TURNOVER;
            if frame.column(from).is_err() {
                if optional {
                    continue;
                }
                return Err(DataError::MissingColumn(from.to_string()));
            }
            if from == to {
                continue;
            }
            if frame.column(to).is_ok() {
                frame = frame.drop(to)?;
            }
            frame.rename(from, to.into())?;
        }
        Ok(frame)
    }
}

fn column<'a>(frame: &'a DataFrame, name: &str) -> Result<&'a Column, DataError> {
    frame
        .column(name)
        .map_err(|_| DataError::MissingColumn(name.to_string()))
}

fn float_values(frame: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, DataError> {
    let casted = column(frame, name)?.cast(&DataType::Float64)?;
    Ok(casted.f64()?.into_iter().collect())
}

/// Convert a timestamp column of any supported dtype to UTC datetimes.
pub(crate) fn timestamp_values(
    col: &Column,
    epoch_unit: EpochUnit,
) -> Result<Vec<Option<DateTime<Utc>>>, DataError> {
    match col.dtype() {
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            let raw = col.cast(&DataType::Int64)?;
            Ok(raw
                .i64()?
                .into_iter()
                .map(|v| v.and_then(|v| from_time_unit(v, unit)))
                .collect())
        }
        DataType::Date => {
            let raw = col.cast(&DataType::Int32)?;
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
            Ok(raw
                .i32()?
                .into_iter()
                .map(|v| {
                    v.and_then(|days| {
                        epoch.checked_add_signed(chrono::Duration::days(i64::from(days)))
                    })
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|dt| dt.and_utc())
                })
                .collect())
        }
        DataType::String => Ok(col
            .str()?
            .into_iter()
            .map(|v| v.and_then(parse_timestamp_str))
            .collect()),
        dtype if dtype.is_integer() || dtype.is_float() => {
            let raw = col.cast(&DataType::Int64)?;
            Ok(raw
                .i64()?
                .into_iter()
                .map(|v| {
                    v.and_then(|v| match epoch_unit {
                        EpochUnit::Seconds => DateTime::from_timestamp(v, 0),
                        EpochUnit::Milliseconds => DateTime::from_timestamp_millis(v),
                    })
                })
                .collect())
        }
        other => Err(DataError::ResponseFormatChanged(format!(
            "unsupported timestamp column type {other:?}"
        ))),
    }
}

fn from_time_unit(value: i64, unit: TimeUnit) -> Option<DateTime<Utc>> {
    match unit {
        TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(value)),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(value),
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(value),
    }
}

/// Parse the timestamp spellings common in CSV exports.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` with or without a UTC offset, and
/// bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
