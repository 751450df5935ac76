//! Yahoo Finance data provider.
//!
//! Fetches OHLCV bars from Yahoo's v8 chart API at any supported interval.
//! Each `fetch` is a single HTTP attempt; retries belong to the fetcher.
//!
//! Yahoo Finance has no official API and is subject to unannounced format changes.
//! The CSV provider is the fallback when Yahoo is unavailable.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{DataError, DataProvider};
use super::schema::ColumnMap;
use crate::domain::{FetchRequest, Interval, RequestError};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Longest range Yahoo serves for one-minute bars.
pub const ONE_MINUTE_MAX_DAYS: i64 = 7;
/// Longest range Yahoo serves for other intraday intervals.
pub const INTRADAY_MAX_DAYS: i64 = 60;

const TIMESTAMP_LABEL: &str = "Datetime";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

/// Yahoo Finance data provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    columns: ColumnMap,
}

impl YahooProvider {
    pub fn new(circuit_breaker: Arc<CircuitBreaker>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            circuit_breaker,
            columns: Self::default_columns(),
        })
    }

    /// Use a different column mapping, e.g. to normalize `Adj Close` as `close`.
    pub fn with_columns(mut self, columns: ColumnMap) -> Self {
        self.columns = columns;
        self
    }

    /// Labels of the frames this provider returns.
    pub fn default_columns() -> ColumnMap {
        ColumnMap::title_case(TIMESTAMP_LABEL)
    }

    /// Chart API URL for a request. `end` is inclusive.
    fn chart_url(request: &FetchRequest) -> String {
        let start_ts = day_start_ts(request.start);
        let end_ts = day_start_ts(request.end) + 24 * 60 * 60 - 1;
        format!(
            "https://query2.finance.yahoo.com/v8/finance/chart/{symbol}\
             ?period1={start_ts}&period2={end_ts}&interval={interval}\
             &includeAdjustedClose=true",
            symbol = request.symbol,
            interval = request.interval.code(),
        )
    }

    /// Turn a chart response into a provider-labelled frame.
    ///
    /// Rows where every field is null (holidays, halted sessions) are skipped.
    /// A result without timestamps is an empty frame.
    fn parse_response(symbol: &str, resp: ChartResponse) -> Result<DataFrame, DataError> {
        let result = match (resp.chart.result, resp.chart.error) {
            (Some(result), _) => result,
            (None, Some(err)) if err.code == "Not Found" => {
                return Err(DataError::SymbolNotFound {
                    symbol: symbol.to_string(),
                })
            }
            (None, Some(err)) => {
                return Err(DataError::ResponseFormatChanged(format!(
                    "{}: {}",
                    err.code, err.description
                )))
            }
            (None, None) => {
                return Err(DataError::ResponseFormatChanged(
                    "empty result with no error".into(),
                ))
            }
        };

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("result array is empty".into()))?;

        let Some(timestamps) = data.timestamp else {
            return Ok(DataFrame::empty());
        };

        let quote = data.indicators.quote.into_iter().next().unwrap_or_default();
        let adj_closes = data
            .indicators
            .adjclose
            .and_then(|v| v.into_iter().next())
            .map(|a| a.adjclose)
            .unwrap_or_default();

        let at = |values: &[Option<f64>], i: usize| values.get(i).copied().flatten();

        let n = timestamps.len();
        let mut ts = Vec::with_capacity(n);
        let mut open = Vec::with_capacity(n);
        let mut high = Vec::with_capacity(n);
        let mut low = Vec::with_capacity(n);
        let mut close = Vec::with_capacity(n);
        let mut adj_close = Vec::with_capacity(n);
        let mut volume = Vec::with_capacity(n);

        for (i, &t) in timestamps.iter().enumerate() {
            let row = [
                at(&quote.open, i),
                at(&quote.high, i),
                at(&quote.low, i),
                at(&quote.close, i),
                at(&quote.volume, i),
            ];
            if row.iter().all(Option::is_none) {
                continue;
            }
            ts.push(t);
            open.push(row[0]);
            high.push(row[1]);
            low.push(row[2]);
            close.push(row[3]);
            volume.push(row[4]);
            adj_close.push(at(&adj_closes, i));
        }

        let frame = DataFrame::new(vec![
            Column::new(TIMESTAMP_LABEL.into(), ts),
            Column::new("Open".into(), open),
            Column::new("High".into(), high),
            Column::new("Low".into(), low),
            Column::new("Close".into(), close),
            Column::new("Adj Close".into(), adj_close),
            Column::new("Volume".into(), volume),
        ])?;
        Ok(frame)
    }
}

fn day_start_ts(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn column_map(&self) -> &ColumnMap {
        &self.columns
    }

    fn supports(&self, _interval: Interval) -> bool {
        true
    }

    fn validate(&self, request: &FetchRequest) -> Result<(), RequestError> {
        let max_days = match request.interval {
            Interval::OneMinute => ONE_MINUTE_MAX_DAYS,
            i if i.is_intraday() => INTRADAY_MAX_DAYS,
            _ => return Ok(()),
        };
        let days = request.span_days();
        if days > max_days {
            return Err(RequestError::RangeTooLong {
                interval: request.interval,
                max_days,
                days,
            });
        }
        Ok(())
    }

    fn fetch(&self, request: &FetchRequest) -> Result<DataFrame, DataError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(DataError::CircuitBreakerTripped);
        }

        let url = Self::chart_url(request);
        tracing::debug!(%url, "requesting chart");

        let resp = self.client.get(&url).send().map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                self.circuit_breaker.record_failure();
            }
            DataError::NetworkUnreachable(e.to_string())
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            self.circuit_breaker.trip();
            return Err(DataError::CircuitBreakerTripped);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            self.circuit_breaker.record_failure();
            let retry_after_secs = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(DataError::RateLimited { retry_after_secs });
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(DataError::AuthenticationRequired(
                "Yahoo Finance requires authentication".into(),
            ));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DataError::SymbolNotFound {
                symbol: request.symbol.clone(),
            });
        }
        if !status.is_success() {
            self.circuit_breaker.record_failure();
            return Err(DataError::Other(format!(
                "HTTP {status} for {}",
                request.symbol
            )));
        }

        let chart: ChartResponse = resp.json().map_err(|e| {
            DataError::ResponseFormatChanged(format!(
                "failed to parse response for {}: {e}",
                request.symbol
            ))
        })?;

        let frame = Self::parse_response(&request.symbol, chart)?;
        self.circuit_breaker.record_success();
        Ok(frame)
    }
}
