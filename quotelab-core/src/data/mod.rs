//! Data retrieval: providers, normalization, retry, and caching.

pub mod cache;
pub mod canonicalize;
pub mod circuit_breaker;
pub mod clock;
pub mod csv;
pub mod fetcher;
pub mod notify;
pub mod provider;
pub mod schema;
pub mod synthetic;
pub mod yahoo;

pub use cache::{CacheEntry, RetrievalCache, DEFAULT_TTL};
pub use canonicalize::{parse_timestamp_str, Canonicalizer};
pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use clock::{Clock, ManualClock, SystemClock};
pub use csv::CsvProvider;
pub use fetcher::{
    FetchError, RecordingSleeper, ResilientFetcher, RetryPolicy, SeriesSource, Sleeper,
    ThreadSleeper,
};
pub use notify::{Notification, NotificationLog, Notifier, Severity};
pub use provider::{DataError, DataProvider};
pub use schema::{BarSchema, ColumnMap, EpochUnit, SchemaError};
pub use synthetic::SyntheticProvider;
pub use yahoo::YahooProvider;
