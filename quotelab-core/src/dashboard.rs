//! Presentation boundary: one call per user interaction.
//!
//! A `Dashboard` resolves the requested range, asks the cache for the series,
//! computes the selected indicators, and hands back everything a front end
//! needs to render, including the notifications raised along the way.

use crate::data::cache::RetrievalCache;
use crate::data::clock::Clock;
use crate::data::fetcher::{FetchError, SeriesSource};
use crate::data::notify::{Notification, NotificationLog};
use crate::domain::{DateRange, FetchRequest, Interval};
use crate::indicators::{AugmentedRow, AugmentedSeries, IndicatorEngine, IndicatorSet};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// What the user asked to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRequest {
    pub symbol: String,
    pub interval: Interval,
    pub range: DateRange,
    pub indicators: IndicatorSet,
}

impl ViewRequest {
    /// The cache key for this view, with any lookback resolved against `today`.
    pub fn fetch_request(&self, today: NaiveDate) -> FetchRequest {
        let (start, end) = self.range.resolve(today);
        FetchRequest::new(self.symbol.trim().to_uppercase(), self.interval, start, end)
    }
}

#[derive(Debug, Clone)]
pub struct DashboardView {
    pub request: FetchRequest,
    pub augmented: AugmentedSeries,
    pub notifications: Vec<Notification>,
    /// When the underlying series was fetched; `None` for an uncached empty result.
    pub fetched_at: Option<DateTime<Utc>>,
}

/// Headline numbers for a view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewSummary {
    pub symbol: String,
    pub interval: Interval,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub bars: usize,
    pub first_close: Option<f64>,
    pub last_close: Option<f64>,
    pub change_pct: Option<f64>,
    pub fetched_at: Option<DateTime<Utc>>,
}

/// Serializable rendering of a view: summary, trailing rows, notifications.
#[derive(Debug, Clone, Serialize)]
pub struct ViewReport {
    pub summary: ViewSummary,
    pub rows: Vec<AugmentedRow>,
    pub notifications: Vec<Notification>,
}

impl DashboardView {
    pub fn is_empty(&self) -> bool {
        self.augmented.is_empty()
    }

    pub fn summary(&self) -> ViewSummary {
        let series = self.augmented.series();
        let first_close = series.first().map(|b| b.close);
        let last_close = series.last().map(|b| b.close);
        let change_pct = match (first_close, last_close) {
            (Some(first), Some(last)) if first > 0.0 => Some((last - first) / first * 100.0),
            _ => None,
        };
        ViewSummary {
            symbol: self.request.symbol.clone(),
            interval: self.request.interval,
            start: self.request.start,
            end: self.request.end,
            bars: series.len(),
            first_close,
            last_close,
            change_pct,
            fetched_at: self.fetched_at,
        }
    }

    pub fn report(&self, tail: usize) -> ViewReport {
        ViewReport {
            summary: self.summary(),
            rows: self.augmented.tail_rows(tail),
            notifications: self.notifications.clone(),
        }
    }
}

pub struct Dashboard<S> {
    cache: RetrievalCache<S>,
    engine: IndicatorEngine,
    clock: Arc<dyn Clock>,
    notifications: Arc<NotificationLog>,
}

impl<S: SeriesSource> Dashboard<S> {
    /// `notifications` must be the log the source reports into.
    pub fn new(
        source: S,
        engine: IndicatorEngine,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        notifications: Arc<NotificationLog>,
    ) -> Self {
        Self {
            cache: RetrievalCache::with_ttl(source, Arc::clone(&clock), ttl),
            engine,
            clock,
            notifications,
        }
    }

    pub fn cache(&self) -> &RetrievalCache<S> {
        &self.cache
    }

    pub fn engine(&self) -> &IndicatorEngine {
        &self.engine
    }

    pub fn view(&self, request: &ViewRequest) -> Result<DashboardView, FetchError> {
        let fetch_request = request.fetch_request(self.clock.today());
        let span = tracing::info_span!("view", request = %fetch_request);
        let _enter = span.enter();

        let result = self.cache.get_or_fetch(&fetch_request);
        let notifications = self.notifications.drain();
        let series = result?;

        let augmented = self.engine.compute(series, &request.indicators);
        Ok(DashboardView {
            fetched_at: self.cache.fetched_at(&fetch_request),
            request: fetch_request,
            augmented,
            notifications,
        })
    }

    /// Drop all cached data, then view.
    pub fn refresh(&self, request: &ViewRequest) -> Result<DashboardView, FetchError> {
        tracing::info!("refresh requested");
        self.cache.invalidate_all();
        self.view(request)
    }
}
