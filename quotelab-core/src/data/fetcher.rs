//! Resilient fetcher: bounded retries with a fixed delay around one provider.
//!
//! Each attempt is one provider call followed by normalization. A provider
//! error, a normalization error, or an empty series counts as a failed
//! attempt. When every attempt fails the caller gets an empty series and a
//! single error notification; only invalid requests surface as errors.

use super::canonicalize::Canonicalizer;
use super::notify::{Notification, Notifier};
use super::provider::{DataError, DataProvider};
use crate::domain::{FetchRequest, PriceSeries, RequestError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Errors that escape the fetcher. Transient failures never do.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),
}

/// Anything that turns a request into a canonical series.
pub trait SeriesSource: Send + Sync {
    fn fetch(&self, request: &FetchRequest) -> Result<PriceSeries, FetchError>;
}

impl<T: SeriesSource + ?Sized> SeriesSource for Arc<T> {
    fn fetch(&self, request: &FetchRequest) -> Result<PriceSeries, FetchError> {
        (**self).fetch(request)
    }
}

/// Blocking wait between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Records requested waits instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn total(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
    }
}

/// Attempt count and delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_retries: u32,
    /// Wait between a failed attempt and the next one.
    pub retry_delay: Duration,
    /// Wait after every provider call that returned a frame.
    pub rate_delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
    pub const DEFAULT_RATE_DELAY: Duration = Duration::from_millis(200);

    fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Self::DEFAULT_MAX_RETRIES,
            retry_delay: Self::DEFAULT_RETRY_DELAY,
            rate_delay: Self::DEFAULT_RATE_DELAY,
        }
    }
}

/// Outcome of a single provider call plus normalization.
#[derive(Debug)]
enum Attempt {
    Success(PriceSeries),
    Empty,
    Failed(DataError),
}

pub struct ResilientFetcher {
    provider: Arc<dyn DataProvider>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    notifier: Arc<dyn Notifier>,
}

impl ResilientFetcher {
    pub fn new(provider: Arc<dyn DataProvider>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            provider,
            policy: RetryPolicy::default(),
            sleeper: Arc::new(ThreadSleeper),
            notifier,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn attempt(&self, request: &FetchRequest) -> Attempt {
        let frame = match self.provider.fetch(request) {
            Ok(frame) => frame,
            Err(err) => return Attempt::Failed(err),
        };
        self.sleeper.sleep(self.policy.rate_delay);

        match Canonicalizer::normalize(frame, self.provider.column_map()) {
            Ok(series) if series.is_empty() => Attempt::Empty,
            Ok(series) => Attempt::Success(series),
            Err(err) => Attempt::Failed(err),
        }
    }
}

impl SeriesSource for ResilientFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<PriceSeries, FetchError> {
        request.validate()?;
        self.provider.validate(request)?;

        let attempts = self.policy.attempts();
        for n in 1..=attempts {
            match self.attempt(request) {
                Attempt::Success(series) => {
                    tracing::info!(
                        provider = self.provider.name(),
                        %request,
                        attempt = n,
                        bars = series.len(),
                        "fetched series"
                    );
                    return Ok(series);
                }
                Attempt::Empty => self.notifier.notify(Notification::warning(format!(
                    "attempt {n}/{attempts} for {request} returned no data"
                ))),
                Attempt::Failed(err) => self.notifier.notify(Notification::warning(format!(
                    "attempt {n}/{attempts} for {request} failed: {err}"
                ))),
            }

            if n < attempts {
                self.sleeper.sleep(self.policy.retry_delay);
            }
        }

        self.notifier.notify(Notification::error(format!(
            "no data for {request} after {attempts} attempts"
        )));
        Ok(PriceSeries::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::notify::{NotificationLog, Severity};
    use crate::data::schema::ColumnMap;
    use crate::domain::Interval;
    use chrono::NaiveDate;
    use polars::prelude::*;
    use std::time::Duration;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        responses: Mutex<VecDeque<Result<DataFrame, DataError>>>,
        calls: AtomicUsize,
        columns: ColumnMap,
    }

    impl Scripted {
        fn new(responses: Vec<Result<DataFrame, DataError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
                columns: ColumnMap::default(),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DataProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn column_map(&self) -> &ColumnMap {
            &self.columns
        }

        fn supports(&self, interval: Interval) -> bool {
            interval == Interval::OneDay
        }

        fn fetch(&self, _request: &FetchRequest) -> Result<DataFrame, DataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(DataFrame::empty()))
        }
    }

    fn frame(closes: &[f64]) -> DataFrame {
        let ts: Vec<i64> = (0..closes.len() as i64)
            .map(|i| 1_704_153_600 + i * 86_400)
            .collect();
        df!(
            "timestamp" => ts,
            "open" => closes,
            "high" => closes,
            "low" => closes,
            "close" => closes,
            "volume" => vec![1000.0; closes.len()],
        )
        .unwrap()
    }

    fn request() -> FetchRequest {
        FetchRequest::new(
            "AAPL",
            Interval::OneDay,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
    }

    struct Harness {
        provider: Arc<Scripted>,
        sleeper: Arc<RecordingSleeper>,
        log: Arc<NotificationLog>,
        fetcher: ResilientFetcher,
    }

    fn harness(responses: Vec<Result<DataFrame, DataError>>) -> Harness {
        let provider = Arc::new(Scripted::new(responses));
        let sleeper = Arc::new(RecordingSleeper::new());
        let log = Arc::new(NotificationLog::new());
        let fetcher = ResilientFetcher::new(provider.clone(), log.clone())
            .with_sleeper(sleeper.clone());
        Harness {
            provider,
            sleeper,
            log,
            fetcher,
        }
    }

    const RATE: Duration = RetryPolicy::DEFAULT_RATE_DELAY;
    const RETRY: Duration = RetryPolicy::DEFAULT_RETRY_DELAY;

    #[test]
    fn first_attempt_success_has_no_retry_delay() {
        let h = harness(vec![Ok(frame(&[100.0, 101.0]))]);
        let series = h.fetcher.fetch(&request()).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(h.provider.calls(), 1);
        assert_eq!(h.sleeper.sleeps(), vec![RATE]);
        assert!(h.log.snapshot().is_empty());
    }

    #[test]
    fn empty_empty_then_data() {
        let h = harness(vec![
            Ok(DataFrame::empty()),
            Ok(DataFrame::empty()),
            Ok(frame(&[100.0])),
        ]);
        let series = h.fetcher.fetch(&request()).unwrap();

        assert_eq!(series.closes(), vec![100.0]);
        assert_eq!(h.provider.calls(), 3);
        assert_eq!(h.log.count(Severity::Warning), 2);
        assert_eq!(h.log.count(Severity::Error), 0);
        assert_eq!(h.sleeper.sleeps(), vec![RATE, RETRY, RATE, RETRY, RATE]);
    }

    #[test]
    fn exhausted_attempts_return_empty_with_one_error() {
        let h = harness(vec![]);
        let series = h.fetcher.fetch(&request()).unwrap();

        assert!(series.is_empty());
        assert_eq!(h.provider.calls(), 3);
        assert_eq!(h.log.count(Severity::Warning), 3);
        assert_eq!(h.log.count(Severity::Error), 1);
        // No wait after the final attempt.
        assert_eq!(h.sleeper.sleeps(), vec![RATE, RETRY, RATE, RETRY, RATE]);
    }

    #[test]
    fn provider_errors_are_retried_without_rate_delay() {
        let h = harness(vec![
            Err(DataError::NetworkUnreachable("connection refused".into())),
            Ok(frame(&[100.0])),
        ]);
        let series = h.fetcher.fetch(&request()).unwrap();

        assert_eq!(series.len(), 1);
        assert_eq!(h.sleeper.sleeps(), vec![RETRY, RATE]);
        let warnings = h.log.snapshot();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("attempt 1/3"));
        assert!(warnings[0].message.contains("connection refused"));
    }

    #[test]
    fn malformed_frame_counts_as_failed_attempt() {
        let duplicate = df!(
            "timestamp" => &[1_704_153_600i64, 1_704_153_600],
            "open" => &[1.0, 1.0],
            "high" => &[1.0, 1.0],
            "low" => &[1.0, 1.0],
            "close" => &[1.0, 1.0],
            "volume" => &[1.0, 1.0],
        )
        .unwrap();
        let h = harness(vec![Ok(duplicate), Ok(frame(&[100.0]))]);
        let series = h.fetcher.fetch(&request()).unwrap();

        assert_eq!(series.len(), 1);
        assert_eq!(h.log.count(Severity::Warning), 1);
    }

    #[test]
    fn invalid_requests_fail_before_any_call() {
        let h = harness(vec![Ok(frame(&[100.0]))]);

        let backwards = FetchRequest::new(
            "AAPL",
            Interval::OneDay,
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        assert!(matches!(
            h.fetcher.fetch(&backwards),
            Err(FetchError::InvalidRequest(RequestError::StartAfterEnd { .. }))
        ));

        let hourly = FetchRequest {
            interval: Interval::OneHour,
            ..request()
        };
        assert!(matches!(
            h.fetcher.fetch(&hourly),
            Err(FetchError::InvalidRequest(RequestError::UnsupportedInterval { .. }))
        ));

        assert_eq!(h.provider.calls(), 0);
        assert!(h.sleeper.sleeps().is_empty());
    }

    #[test]
    fn custom_policy_controls_attempts() {
        let provider = Arc::new(Scripted::new(vec![]));
        let sleeper = Arc::new(RecordingSleeper::new());
        let log = Arc::new(NotificationLog::new());
        let fetcher = ResilientFetcher::new(provider.clone(), log.clone())
            .with_sleeper(sleeper.clone())
            .with_policy(RetryPolicy {
                max_retries: 5,
                retry_delay: Duration::from_millis(10),
                rate_delay: Duration::ZERO,
            });

        assert!(fetcher.fetch(&request()).unwrap().is_empty());
        assert_eq!(provider.calls(), 5);
        assert_eq!(sleeper.total(), Duration::from_millis(40));
        assert_eq!(log.count(Severity::Error), 1);
    }
}
