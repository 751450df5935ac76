//! Application configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration. CLI flags override individual fields after loading.
//!
//! ```toml
//! symbol = "AAPL"
//! interval = "1d"
//! lookback = "5d"
//! indicators = ["sma", "bollinger"]
//!
//! [indicator_params]
//! sma_window = 20
//! bollinger_k = 2.0
//!
//! [provider]
//! kind = "csv"
//! csv_dir = "data/"
//! ```

use crate::dashboard::{Dashboard, ViewRequest};
use crate::data::circuit_breaker::CircuitBreaker;
use crate::data::clock::{Clock, SystemClock};
use crate::data::csv::CsvProvider;
use crate::data::fetcher::{ResilientFetcher, RetryPolicy};
use crate::data::notify::NotificationLog;
use crate::data::provider::{DataError, DataProvider};
use crate::data::schema::ColumnMap;
use crate::data::synthetic::SyntheticProvider;
use crate::data::yahoo::YahooProvider;
use crate::domain::{DateRange, Interval, Lookback};
use crate::indicators::{IndicatorEngine, IndicatorParamError, IndicatorParams, IndicatorSet};
use crate::logging::LogConfig;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid indicator parameters: {0}")]
    Indicators(#[from] IndicatorParamError),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("failed to build provider: {0}")]
    Provider(#[from] DataError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Yahoo,
    Csv,
    Synthetic,
}

impl std::str::FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yahoo" => Ok(Self::Yahoo),
            "csv" => Ok(Self::Csv),
            "synthetic" => Ok(Self::Synthetic),
            other => Err(ConfigError::Invalid(format!(
                "unknown provider '{other}' (expected yahoo, csv or synthetic)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Directory of `{SYMBOL}.csv` files (csv provider only).
    pub csv_dir: Option<PathBuf>,
    /// Column labels of the provider's frames; provider default when absent.
    pub columns: Option<ColumnMap>,
    pub breaker_cooldown_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Yahoo,
            csv_dir: None,
            columns: None,
            breaker_cooldown_secs: CircuitBreaker::DEFAULT_COOLDOWN.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub rate_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            retry_delay_ms: policy.retry_delay.as_millis() as u64,
            rate_delay_ms: policy.rate_delay.as_millis() as u64,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            rate_delay: Duration::from_millis(self.rate_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: crate::data::cache::DEFAULT_TTL.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub symbol: String,
    pub interval: Interval,
    /// Used unless both `start` and `end` are set.
    pub lookback: Lookback,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub indicators: IndicatorSet,
    pub indicator_params: IndicatorParams,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub provider: ProviderConfig,
    pub logging: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            symbol: "AAPL".to_string(),
            interval: Interval::OneDay,
            lookback: Lookback::Days(5),
            start: None,
            end: None,
            indicators: IndicatorSet::empty(),
            indicator_params: IndicatorParams::default(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            provider: ProviderConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::Invalid("symbol must not be empty".into()));
        }
        match (self.start, self.end) {
            (Some(start), Some(end)) if start > end => {
                return Err(ConfigError::Invalid(format!(
                    "start {start} is after end {end}"
                )))
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(ConfigError::Invalid(
                    "start and end must be given together".into(),
                ))
            }
            _ => {}
        }
        if self.retry.max_retries == 0 {
            return Err(ConfigError::Invalid("retry.max_retries must be >= 1".into()));
        }
        if self.provider.kind == ProviderKind::Csv && self.provider.csv_dir.is_none() {
            return Err(ConfigError::Invalid(
                "provider.csv_dir is required for the csv provider".into(),
            ));
        }
        self.indicator_params.validate()?;
        Ok(())
    }

    pub fn date_range(&self) -> DateRange {
        match (self.start, self.end) {
            (Some(start), Some(end)) => DateRange::Between { start, end },
            _ => DateRange::Lookback(self.lookback),
        }
    }

    pub fn view_request(&self) -> ViewRequest {
        ViewRequest {
            symbol: self.symbol.clone(),
            interval: self.interval,
            range: self.date_range(),
            indicators: self.indicators.clone(),
        }
    }

    pub fn build_provider(&self, clock: Arc<dyn Clock>) -> Result<Arc<dyn DataProvider>, ConfigError> {
        let columns = self.provider.columns.clone();
        let provider: Arc<dyn DataProvider> = match self.provider.kind {
            ProviderKind::Yahoo => {
                let breaker = Arc::new(CircuitBreaker::new(
                    Duration::from_secs(self.provider.breaker_cooldown_secs),
                    clock,
                ));
                let yahoo = YahooProvider::new(breaker)?;
                Arc::new(match columns {
                    Some(columns) => yahoo.with_columns(columns),
                    None => yahoo,
                })
            }
            ProviderKind::Csv => {
                let dir = self.provider.csv_dir.clone().ok_or_else(|| {
                    ConfigError::Invalid("provider.csv_dir is required for the csv provider".into())
                })?;
                Arc::new(CsvProvider::new(
                    dir,
                    columns.unwrap_or_else(|| ColumnMap::title_case("Date")),
                ))
            }
            ProviderKind::Synthetic => Arc::new(SyntheticProvider::new()),
        };
        Ok(provider)
    }

    /// Wire provider, fetcher, cache, and engine on the system clock.
    pub fn build_dashboard(&self) -> Result<Dashboard<ResilientFetcher>, ConfigError> {
        self.build_dashboard_with_clock(Arc::new(SystemClock))
    }

    pub fn build_dashboard_with_clock(
        &self,
        clock: Arc<dyn Clock>,
    ) -> Result<Dashboard<ResilientFetcher>, ConfigError> {
        self.validate()?;
        let notifications = Arc::new(NotificationLog::new());
        let provider = self.build_provider(Arc::clone(&clock))?;
        let fetcher = ResilientFetcher::new(provider, notifications.clone())
            .with_policy(self.retry.policy());
        let engine = IndicatorEngine::new(self.indicator_params)?;
        Ok(Dashboard::new(
            fetcher,
            engine,
            clock,
            Duration::from_secs(self.cache.ttl_secs),
            notifications,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::IndicatorKind;

    #[test]
    fn empty_toml_is_default() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.retry.policy(), RetryPolicy::default());
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.date_range(), DateRange::Lookback(Lookback::Days(5)));
    }

    #[test]
    fn parses_full_config() {
        let config = AppConfig::from_toml_str(
            r#"
            symbol = "MSFT"
            interval = "15m"
            lookback = "1mo"
            indicators = ["sma", "bollinger"]

            [indicator_params]
            sma_window = 10
            bollinger_k = 2.5

            [retry]
            max_retries = 5
            retry_delay_ms = 500

            [cache]
            ttl_secs = 60

            [provider]
            kind = "csv"
            csv_dir = "fixtures"

            [provider.columns]
            timestamp = "Date"
            open = "Open"
            high = "High"
            low = "Low"
            close = "Close"
            volume = "Volume"

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.symbol, "MSFT");
        assert_eq!(config.interval, Interval::FifteenMinutes);
        assert_eq!(config.lookback, Lookback::Months(1));
        assert!(config.indicators.contains(IndicatorKind::Bollinger));
        assert!(!config.indicators.contains(IndicatorKind::Ema));
        assert_eq!(config.indicator_params.sma_window, 10);
        assert_eq!(config.indicator_params.ema_span, 20);
        assert_eq!(config.retry.policy().max_retries, 5);
        assert_eq!(config.retry.policy().rate_delay, Duration::from_millis(200));
        assert_eq!(config.provider.kind, ProviderKind::Csv);
        assert_eq!(config.provider.columns.unwrap().close, "Close");
        assert_eq!(config.logging.format, crate::logging::LogFormat::Json);
    }

    #[test]
    fn explicit_dates_override_lookback() {
        let config = AppConfig::from_toml_str(
            r#"
            start = "2024-01-01"
            end = "2024-01-31"
            "#,
        )
        .unwrap();
        assert!(matches!(config.date_range(), DateRange::Between { .. }));
    }

    #[test]
    fn rejects_invalid_configs() {
        assert!(matches!(
            AppConfig::from_toml_str("start = \"2024-01-01\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AppConfig::from_toml_str("[provider]\nkind = \"csv\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AppConfig::from_toml_str("[indicator_params]\nsma_window = 0"),
            Err(ConfigError::Indicators(_))
        ));
        assert!(matches!(
            AppConfig::from_toml_str("interval = \"7m\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            AppConfig::from_toml_str("[retry]\nmax_retries = 0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn serializes_back_to_toml() {
        let config = AppConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(AppConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn builds_synthetic_dashboard() {
        let config = AppConfig {
            provider: ProviderConfig {
                kind: ProviderKind::Synthetic,
                ..ProviderConfig::default()
            },
            ..AppConfig::default()
        };
        let dashboard = config.build_dashboard().unwrap();
        assert!(dashboard.cache().is_empty());
        assert_eq!(dashboard.engine().params(), &IndicatorParams::default());
    }
}
