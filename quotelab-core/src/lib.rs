//! QuoteLab Core: resilient price retrieval, TTL caching, and indicators.
//!
//! This crate contains everything below the presentation layer:
//! - Domain types (bars, price series, fetch requests, intervals, lookbacks)
//! - Providers (Yahoo Finance, CSV import, synthetic) behind `DataProvider`
//! - Normalization of provider frames into a validated `PriceSeries`
//! - Bounded-retry fetcher and a wall-clock TTL retrieval cache
//! - SMA, EMA, and Bollinger Bands plus the engine that applies them
//! - The `Dashboard` session used by front ends, configuration, and logging

pub mod config;
pub mod dashboard;
pub mod data;
pub mod domain;
pub mod indicators;
pub mod logging;

pub use config::{AppConfig, ConfigError};
pub use dashboard::{Dashboard, DashboardView, ViewReport, ViewRequest, ViewSummary};
