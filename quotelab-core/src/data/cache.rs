//! In-memory retrieval cache with a wall-clock TTL.
//!
//! Entries are keyed by the full `FetchRequest` and hold an `Arc<PriceSeries>`
//! that is replaced whole on refetch, never mutated. Expiry is evaluated at
//! read time through the `Clock`; there is no background eviction.

use super::clock::{elapsed_between, Clock};
use super::fetcher::{FetchError, SeriesSource};
use crate::domain::{FetchRequest, PriceSeries};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub series: Arc<PriceSeries>,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        elapsed_between(self.fetched_at, now) < ttl
    }
}

/// Memoizes a `SeriesSource` per request for `ttl`.
pub struct RetrievalCache<S> {
    source: S,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: RwLock<HashMap<FetchRequest, CacheEntry>>,
}

impl<S: SeriesSource> RetrievalCache<S> {
    pub fn new(source: S, clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(source, clock, DEFAULT_TTL)
    }

    pub fn with_ttl(source: S, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            source,
            clock,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Unexpired entry for the request, if any. Never fetches.
    pub fn peek(&self, request: &FetchRequest) -> Option<CacheEntry> {
        let now = self.clock.now();
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(request)
            .filter(|entry| entry.is_fresh(now, self.ttl))
            .cloned()
    }

    /// Return the cached series, or fetch and store it.
    ///
    /// Empty results are returned but not stored, so the next call retries.
    pub fn get_or_fetch(&self, request: &FetchRequest) -> Result<Arc<PriceSeries>, FetchError> {
        if let Some(entry) = self.peek(request) {
            tracing::debug!(%request, fetched_at = %entry.fetched_at, "cache hit");
            return Ok(entry.series);
        }

        tracing::debug!(%request, "cache miss");
        let series = Arc::new(self.source.fetch(request)?);
        if series.is_empty() {
            return Ok(series);
        }

        let entry = CacheEntry {
            series: Arc::clone(&series),
            fetched_at: self.clock.now(),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request.clone(), entry);
        Ok(series)
    }

    /// Drop every entry; the next lookup for any key is a miss.
    pub fn invalidate_all(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(entries = entries.len(), "cache invalidated");
        entries.clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// When the unexpired entry for `request` was fetched.
    pub fn fetched_at(&self, request: &FetchRequest) -> Option<DateTime<Utc>> {
        self.peek(request).map(|entry| entry.fetched_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::clock::ManualClock;
    use crate::domain::{Bar, Interval};
    use chrono::{NaiveDate, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
        empty: bool,
    }

    impl SeriesSource for Counting {
        fn fetch(&self, request: &FetchRequest) -> Result<PriceSeries, FetchError> {
            request.validate()?;
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.empty {
                return Ok(PriceSeries::empty());
            }
            let bar = Bar {
                timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1,
                turnover: None,
            };
            Ok(PriceSeries::new(vec![bar]).unwrap())
        }
    }

    fn request(symbol: &str) -> FetchRequest {
        FetchRequest::new(
            symbol,
            Interval::OneDay,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
    }

    fn cache(empty: bool) -> (RetrievalCache<Arc<Counting>>, Arc<Counting>, Arc<ManualClock>) {
        let source = Arc::new(Counting {
            empty,
            ..Counting::default()
        });
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap(),
        ));
        (
            RetrievalCache::new(source.clone(), clock.clone()),
            source,
            clock,
        )
    }

    #[test]
    fn second_call_is_served_from_cache() {
        let (cache, source, _) = cache(false);
        let a = cache.get_or_fetch(&request("AAPL")).unwrap();
        let b = cache.get_or_fetch(&request("AAPL")).unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn any_field_difference_is_a_miss() {
        let (cache, source, _) = cache(false);
        cache.get_or_fetch(&request("AAPL")).unwrap();
        cache.get_or_fetch(&request("MSFT")).unwrap();
        let weekly = FetchRequest {
            interval: Interval::OneWeek,
            ..request("AAPL")
        };
        cache.get_or_fetch(&weekly).unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn expires_after_ttl() {
        let (cache, source, clock) = cache(false);
        let key = request("AAPL");
        cache.get_or_fetch(&key).unwrap();

        clock.advance(Duration::from_secs(299));
        cache.get_or_fetch(&key).unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(2));
        assert!(cache.fetched_at(&key).is_none());
        cache.get_or_fetch(&key).unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.fetched_at(&key), Some(clock.now()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn empty_results_are_not_cached() {
        let (cache, source, _) = cache(true);
        assert!(cache.get_or_fetch(&request("AAPL")).unwrap().is_empty());
        assert!(cache.get_or_fetch(&request("AAPL")).unwrap().is_empty());

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_all_forces_refetch() {
        let (cache, source, _) = cache(false);
        cache.get_or_fetch(&request("AAPL")).unwrap();
        cache.get_or_fetch(&request("MSFT")).unwrap();
        cache.invalidate_all();

        assert!(cache.is_empty());
        cache.get_or_fetch(&request("AAPL")).unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn invalid_requests_propagate_and_are_not_cached() {
        let (cache, _, _) = cache(false);
        let bad = request("  ");
        assert!(matches!(
            cache.get_or_fetch(&bad),
            Err(FetchError::InvalidRequest(_))
        ));
        assert!(cache.is_empty());
    }
}
