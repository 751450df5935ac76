//! Data provider trait and structured error types.
//!
//! The DataProvider trait abstracts over data sources (Yahoo Finance, CSV files,
//! synthetic data) so the fetcher can swap implementations and tests can stub
//! them. Providers return raw frames with their own column labels; mapping to
//! canonical names happens in `canonicalize`.

use super::schema::ColumnMap;
use crate::domain::{FetchRequest, Interval, RequestError, SeriesError};
use polars::prelude::{DataFrame, PolarsError};
use thiserror::Error;

/// Structured error types for data operations.
///
/// Every variant is a retryable failure cause from the fetcher's point of view.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("missing column '{0}' in provider response")]
    MissingColumn(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("data error: {0}")]
    Other(String),
}

impl From<SeriesError> for DataError {
    fn from(err: SeriesError) -> Self {
        DataError::Validation(err.to_string())
    }
}

/// Trait for data providers.
///
/// Implementations handle the specifics of fetching data from a particular
/// source. Retry and caching sit above this trait; providers make exactly one
/// attempt per `fetch` call.
pub trait DataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Labels this provider uses for the OHLCV columns it returns.
    fn column_map(&self) -> &ColumnMap;

    fn supports(&self, interval: Interval) -> bool;

    /// Reject requests this provider cannot serve, before any I/O.
    fn validate(&self, request: &FetchRequest) -> Result<(), RequestError> {
        if !self.supports(request.interval) {
            return Err(RequestError::UnsupportedInterval {
                interval: request.interval,
                provider: self.name().to_string(),
            });
        }
        Ok(())
    }

    /// Fetch raw bars for the request as a provider-labelled frame.
    ///
    /// An empty frame is a valid "no data" answer, not an error.
    fn fetch(&self, request: &FetchRequest) -> Result<DataFrame, DataError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    struct DailyOnly {
        columns: ColumnMap,
    }

    impl DataProvider for DailyOnly {
        fn name(&self) -> &str {
            "daily_only"
        }

        fn column_map(&self) -> &ColumnMap {
            &self.columns
        }

        fn supports(&self, interval: Interval) -> bool {
            interval == Interval::OneDay
        }

        fn fetch(&self, _request: &FetchRequest) -> Result<DataFrame, DataError> {
            Ok(DataFrame::empty())
        }
    }

    #[test]
    fn default_validate_checks_interval_support() {
        let provider = DailyOnly {
            columns: ColumnMap::default(),
        };
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

        let daily = FetchRequest::new("AAPL", Interval::OneDay, day, day);
        assert!(provider.validate(&daily).is_ok());

        let weekly = FetchRequest::new("AAPL", Interval::OneWeek, day, day);
        assert!(matches!(
            provider.validate(&weekly),
            Err(RequestError::UnsupportedInterval { .. })
        ));
    }

    #[test]
    fn series_errors_become_validation_errors() {
        let err: DataError = SeriesError::InvalidPrice {
            index: 3,
            timestamp: chrono::Utc::now(),
        }
        .into();
        assert!(matches!(err, DataError::Validation(msg) if msg.contains("index 3")));
    }
}
