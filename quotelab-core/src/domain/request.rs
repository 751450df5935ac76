//! Fetch requests: symbol, interval, and date range.
//!
//! A `FetchRequest` is the cache identity. Lookback periods are resolved into
//! explicit dates before a request is built, so two requests are equal exactly
//! when every field matches.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Caller-visible validation errors. Raised before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("symbol must not be empty")]
    EmptySymbol,

    #[error("start date {start} is after end date {end}")]
    StartAfterEnd { start: NaiveDate, end: NaiveDate },

    #[error("interval {interval} is not supported by provider '{provider}'")]
    UnsupportedInterval { interval: Interval, provider: String },

    #[error("interval {interval} allows at most {max_days} days per request, got {days}")]
    RangeTooLong {
        interval: Interval,
        max_days: i64,
        days: i64,
    },

    #[error("unknown interval '{0}' (expected one of 1m, 2m, 5m, 15m, 30m, 60m, 90m, 1h, 1d, 5d, 1wk, 1mo, 3mo)")]
    UnknownInterval(String),

    #[error("unknown lookback '{0}' (expected one of 1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd, max)")]
    UnknownLookback(String),
}

/// Bar granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Interval {
    OneMinute,
    TwoMinutes,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    SixtyMinutes,
    NinetyMinutes,
    OneHour,
    OneDay,
    FiveDays,
    OneWeek,
    OneMonth,
    ThreeMonths,
}

impl Interval {
    pub const ALL: [Interval; 13] = [
        Interval::OneMinute,
        Interval::TwoMinutes,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::SixtyMinutes,
        Interval::NinetyMinutes,
        Interval::OneHour,
        Interval::OneDay,
        Interval::FiveDays,
        Interval::OneWeek,
        Interval::OneMonth,
        Interval::ThreeMonths,
    ];

    /// Short code, e.g. "1m", "1d", "1wk".
    pub fn code(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::TwoMinutes => "2m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::SixtyMinutes => "60m",
            Interval::NinetyMinutes => "90m",
            Interval::OneHour => "1h",
            Interval::OneDay => "1d",
            Interval::FiveDays => "5d",
            Interval::OneWeek => "1wk",
            Interval::OneMonth => "1mo",
            Interval::ThreeMonths => "3mo",
        }
    }

    /// Nominal bucket length. Months are approximated as 30 days.
    pub fn duration(&self) -> Duration {
        const MINUTE: u64 = 60;
        const DAY: u64 = 24 * 60 * MINUTE;
        let secs = match self {
            Interval::OneMinute => MINUTE,
            Interval::TwoMinutes => 2 * MINUTE,
            Interval::FiveMinutes => 5 * MINUTE,
            Interval::FifteenMinutes => 15 * MINUTE,
            Interval::ThirtyMinutes => 30 * MINUTE,
            Interval::SixtyMinutes | Interval::OneHour => 60 * MINUTE,
            Interval::NinetyMinutes => 90 * MINUTE,
            Interval::OneDay => DAY,
            Interval::FiveDays => 5 * DAY,
            Interval::OneWeek => 7 * DAY,
            Interval::OneMonth => 30 * DAY,
            Interval::ThreeMonths => 90 * DAY,
        };
        Duration::from_secs(secs)
    }

    /// Anything finer than one day.
    pub fn is_intraday(&self) -> bool {
        self.duration() < Interval::OneDay.duration()
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Interval {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Interval::ALL
            .into_iter()
            .find(|i| i.code() == normalized)
            .or(match normalized.as_str() {
                "daily" => Some(Interval::OneDay),
                "weekly" => Some(Interval::OneWeek),
                "monthly" => Some(Interval::OneMonth),
                _ => None,
            })
            .ok_or_else(|| RequestError::UnknownInterval(s.to_string()))
    }
}

impl TryFrom<String> for Interval {
    type Error = RequestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.code().to_string()
    }
}

/// Relative period ending today, resolved into explicit dates at request time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Lookback {
    Days(u32),
    Months(u32),
    Years(u32),
    YearToDate,
    Max,
}

impl Lookback {
    /// Resolve to an inclusive `(start, end)` pair ending at `today`.
    pub fn resolve(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let start = match *self {
            Lookback::Days(n) => today
                .checked_sub_signed(chrono::Duration::days(i64::from(n)))
                .unwrap_or(NaiveDate::MIN),
            Lookback::Months(n) => today
                .checked_sub_months(Months::new(n))
                .unwrap_or(NaiveDate::MIN),
            Lookback::Years(n) => today
                .checked_sub_months(Months::new(n.saturating_mul(12)))
                .unwrap_or(NaiveDate::MIN),
            Lookback::YearToDate => NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
            Lookback::Max => NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN),
        };
        (start.min(today), today)
    }
}

impl fmt::Display for Lookback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookback::Days(n) => write!(f, "{n}d"),
            Lookback::Months(n) => write!(f, "{n}mo"),
            Lookback::Years(n) => write!(f, "{n}y"),
            Lookback::YearToDate => f.write_str("ytd"),
            Lookback::Max => f.write_str("max"),
        }
    }
}

impl FromStr for Lookback {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        let unknown = || RequestError::UnknownLookback(s.to_string());
        match normalized.as_str() {
            "ytd" => return Ok(Lookback::YearToDate),
            "max" => return Ok(Lookback::Max),
            _ => {}
        }

        let split = normalized
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(unknown)?;
        let (count, unit) = normalized.split_at(split);
        let count: u32 = count.parse().map_err(|_| unknown())?;
        if count == 0 {
            return Err(unknown());
        }
        match unit {
            "d" => Ok(Lookback::Days(count)),
            "mo" => Ok(Lookback::Months(count)),
            "y" => Ok(Lookback::Years(count)),
            _ => Err(unknown()),
        }
    }
}

impl TryFrom<String> for Lookback {
    type Error = RequestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Lookback> for String {
    fn from(value: Lookback) -> Self {
        value.to_string()
    }
}

/// Either an explicit inclusive date range or a lookback from today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateRange {
    Between { start: NaiveDate, end: NaiveDate },
    Lookback(Lookback),
}

impl DateRange {
    pub fn resolve(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        match *self {
            DateRange::Between { start, end } => (start, end),
            DateRange::Lookback(lookback) => lookback.resolve(today),
        }
    }
}

/// The exact identity of a retrieval: symbol, interval, and inclusive dates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchRequest {
    pub symbol: String,
    pub interval: Interval,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FetchRequest {
    pub fn new(
        symbol: impl Into<String>,
        interval: Interval,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            interval,
            start,
            end,
        }
    }

    /// Provider-independent checks.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.symbol.trim().is_empty() {
            return Err(RequestError::EmptySymbol);
        }
        if self.start > self.end {
            return Err(RequestError::StartAfterEnd {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Inclusive span in calendar days.
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl fmt::Display for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}..{}",
            self.symbol, self.interval, self.start, self.end
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn interval_codes_roundtrip() {
        for interval in Interval::ALL {
            assert_eq!(interval.code().parse::<Interval>().unwrap(), interval);
        }
        assert_eq!("daily".parse::<Interval>().unwrap(), Interval::OneDay);
        assert_eq!(" 1WK ".parse::<Interval>().unwrap(), Interval::OneWeek);
        assert!(matches!(
            "7m".parse::<Interval>(),
            Err(RequestError::UnknownInterval(_))
        ));
    }

    #[test]
    fn intraday_classification() {
        assert!(Interval::OneMinute.is_intraday());
        assert!(Interval::NinetyMinutes.is_intraday());
        assert!(!Interval::OneDay.is_intraday());
        assert!(!Interval::OneMonth.is_intraday());
    }

    #[test]
    fn lookback_parse_and_display() {
        assert_eq!("5d".parse::<Lookback>().unwrap(), Lookback::Days(5));
        assert_eq!("3mo".parse::<Lookback>().unwrap(), Lookback::Months(3));
        assert_eq!("10y".parse::<Lookback>().unwrap(), Lookback::Years(10));
        assert_eq!("YTD".parse::<Lookback>().unwrap(), Lookback::YearToDate);
        assert_eq!(Lookback::Months(6).to_string(), "6mo");
        assert!("0d".parse::<Lookback>().is_err());
        assert!("d".parse::<Lookback>().is_err());
        assert!("5w".parse::<Lookback>().is_err());
    }

    #[test]
    fn lookback_resolution() {
        let today = date(2024, 3, 31);
        assert_eq!(Lookback::Days(5).resolve(today), (date(2024, 3, 26), today));
        // Month arithmetic clamps to the last valid day
        assert_eq!(Lookback::Months(1).resolve(today), (date(2024, 2, 29), today));
        assert_eq!(Lookback::Years(1).resolve(today), (date(2023, 3, 31), today));
        assert_eq!(Lookback::YearToDate.resolve(today), (date(2024, 1, 1), today));
        assert_eq!(Lookback::Max.resolve(today).0, date(1970, 1, 1));
    }

    #[test]
    fn huge_lookback_clamps_instead_of_overflowing() {
        let today = date(2026, 10, 16);
        let lookback: Lookback = "100000000d".parse().unwrap();
        assert_eq!(lookback.resolve(today), (NaiveDate::MIN, today));
        let years: Lookback = "4000000000y".parse().unwrap();
        assert_eq!(years.resolve(today), (NaiveDate::MIN, today));
    }

    #[test]
    fn request_validation() {
        let ok = FetchRequest::new("AAPL", Interval::OneDay, date(2024, 1, 1), date(2024, 1, 31));
        assert!(ok.validate().is_ok());
        assert_eq!(ok.span_days(), 31);

        let backwards =
            FetchRequest::new("AAPL", Interval::OneDay, date(2024, 2, 1), date(2024, 1, 1));
        assert!(matches!(
            backwards.validate(),
            Err(RequestError::StartAfterEnd { .. })
        ));

        let blank = FetchRequest::new("  ", Interval::OneDay, date(2024, 1, 1), date(2024, 1, 1));
        assert_eq!(blank.validate(), Err(RequestError::EmptySymbol));
    }

    #[test]
    fn request_identity_is_field_for_field() {
        let a = FetchRequest::new("AAPL", Interval::OneDay, date(2024, 1, 1), date(2024, 1, 31));
        let mut b = a.clone();
        assert_eq!(a, b);
        b.interval = Interval::OneWeek;
        assert_ne!(a, b);
    }

    #[test]
    fn interval_serde_uses_codes() {
        let json = serde_json::to_string(&Interval::FifteenMinutes).unwrap();
        assert_eq!(json, "\"15m\"");
        let back: Interval = serde_json::from_str("\"1mo\"").unwrap();
        assert_eq!(back, Interval::OneMonth);
    }
}
