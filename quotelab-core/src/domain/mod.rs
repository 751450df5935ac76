//! Domain types for QuoteLab

pub mod bar;
pub mod request;

pub use bar::{Bar, PriceSeries, SeriesError};
pub use request::{DateRange, FetchRequest, Interval, Lookback, RequestError};
