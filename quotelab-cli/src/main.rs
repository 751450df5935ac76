//! QuoteLab CLI: price dashboard with indicators.
//!
//! Commands:
//! - `show`: fetch (or reuse) the series, compute indicators, print summary and last rows
//! - `watch`: like `show`, then read commands from stdin: `r` refreshes, `q` quits
//! - `config`: print the effective configuration after file and flag overrides

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use quotelab_core::config::ProviderKind;
use quotelab_core::data::{FetchError, ResilientFetcher};
use quotelab_core::domain::{Interval, Lookback};
use quotelab_core::indicators::IndicatorSet;
use quotelab_core::logging::{init_logging, LogFormat};
use quotelab_core::{AppConfig, Dashboard, DashboardView};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "quotelab",
    about = "QuoteLab CLI: price series with SMA, EMA and Bollinger Bands"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the series summary and the last rows with indicators.
    Show {
        #[command(flatten)]
        opts: ViewOpts,
    },
    /// Show, then wait for `r` (refresh) or `q` (quit) on stdin.
    Watch {
        #[command(flatten)]
        opts: ViewOpts,
    },
    /// Print the effective configuration.
    Config {
        #[command(flatten)]
        opts: ViewOpts,
    },
}

#[derive(Args, Debug, Clone)]
struct ViewOpts {
    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ticker symbol (e.g., AAPL).
    #[arg(long)]
    symbol: Option<String>,

    /// Bar interval: 1m 2m 5m 15m 30m 60m 90m 1h 1d 5d 1wk 1mo 3mo.
    #[arg(long)]
    interval: Option<Interval>,

    /// Relative period ending today: 1d 5d 1mo 3mo 6mo 1y 2y 5y 10y ytd max.
    #[arg(long, conflicts_with_all = ["start", "end"])]
    lookback: Option<Lookback>,

    /// Start date (YYYY-MM-DD). Requires --end.
    #[arg(long, requires = "end")]
    start: Option<NaiveDate>,

    /// End date (YYYY-MM-DD). Requires --start.
    #[arg(long, requires = "start")]
    end: Option<NaiveDate>,

    /// Comma-separated indicators: sma, ema, bollinger.
    #[arg(long)]
    indicators: Option<IndicatorSet>,

    /// Data provider: yahoo, csv, synthetic.
    #[arg(long)]
    provider: Option<ProviderKind>,

    /// Directory of {SYMBOL}.csv files for the csv provider.
    #[arg(long)]
    csv_dir: Option<PathBuf>,

    #[arg(long)]
    sma_window: Option<usize>,

    #[arg(long)]
    ema_span: Option<usize>,

    #[arg(long)]
    bollinger_window: Option<usize>,

    #[arg(long)]
    bollinger_k: Option<f64>,

    /// Cache time-to-live in seconds.
    #[arg(long)]
    ttl_secs: Option<u64>,

    /// Fetch attempts before giving up.
    #[arg(long)]
    retries: Option<u32>,

    /// Number of trailing rows to print.
    #[arg(long, default_value_t = 10)]
    rows: usize,

    /// Print JSON instead of a table.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Log filter (e.g., info, quotelab_core=debug).
    #[arg(long)]
    log_level: Option<String>,

    /// Log format: pretty, json, compact.
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl ViewOpts {
    /// Load the config file (if any), then apply env and flag overrides.
    fn load_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => AppConfig::default(),
        };
        config.logging = config.logging.with_env_overrides();

        if let Some(symbol) = &self.symbol {
            config.symbol = symbol.clone();
        }
        if let Some(interval) = self.interval {
            config.interval = interval;
        }
        if let Some(lookback) = self.lookback {
            config.lookback = lookback;
            config.start = None;
            config.end = None;
        }
        if self.start.is_some() {
            config.start = self.start;
            config.end = self.end;
        }
        if let Some(indicators) = &self.indicators {
            config.indicators = indicators.clone();
        }
        if let Some(kind) = self.provider {
            config.provider.kind = kind;
        }
        if let Some(dir) = &self.csv_dir {
            config.provider.csv_dir = Some(dir.clone());
        }
        let params = &mut config.indicator_params;
        if let Some(w) = self.sma_window {
            params.sma_window = w;
        }
        if let Some(s) = self.ema_span {
            params.ema_span = s;
        }
        if let Some(w) = self.bollinger_window {
            params.bollinger_window = w;
        }
        if let Some(k) = self.bollinger_k {
            params.bollinger_k = k;
        }
        if let Some(ttl) = self.ttl_secs {
            config.cache.ttl_secs = ttl;
        }
        if let Some(n) = self.retries {
            config.retry.max_retries = n;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Show { opts } => run_show(&opts),
        Commands::Watch { opts } => run_watch(&opts),
        Commands::Config { opts } => run_config(&opts),
    }
}

fn setup(opts: &ViewOpts) -> Result<(AppConfig, Dashboard<ResilientFetcher>)> {
    let config = opts.load_config()?;
    init_logging(&config.logging).map_err(|e| anyhow!("failed to initialize logging: {e}"))?;

    tracing::debug!(?config, "effective configuration");

    let dashboard = config.build_dashboard().context("building dashboard")?;
    Ok((config, dashboard))
}

fn run_show(opts: &ViewOpts) -> Result<()> {
    let (config, dashboard) = setup(opts)?;
    let request = config.view_request();
    let view = dashboard.view(&request).map_err(invalid_request)?;
    render(&view, opts)
}

fn run_watch(opts: &ViewOpts) -> Result<()> {
    let (config, dashboard) = setup(opts)?;
    let request = config.view_request();
    render(&dashboard.view(&request).map_err(invalid_request)?, opts)?;

    let stdin = io::stdin();
    prompt()?;
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        match line.trim() {
            "r" | "refresh" => {
                let view = dashboard.refresh(&request).map_err(invalid_request)?;
                render(&view, opts)?;
            }
            "q" | "quit" | "exit" => break,
            "" => {}
            other => eprintln!("unknown command '{other}' (r = refresh, q = quit)"),
        }
        prompt()?;
    }
    Ok(())
}

fn run_config(opts: &ViewOpts) -> Result<()> {
    let config = opts.load_config()?;
    if opts.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!("{}", config.to_toml_string()?);
    }
    Ok(())
}

fn invalid_request(err: FetchError) -> anyhow::Error {
    anyhow!(err).context("request rejected")
}

fn prompt() -> Result<()> {
    eprint!("[r]efresh / [q]uit > ");
    io::stderr().flush()?;
    Ok(())
}

fn render(view: &DashboardView, opts: &ViewOpts) -> Result<()> {
    if opts.json {
        println!("{}", serde_json::to_string_pretty(&view.report(opts.rows))?);
        return Ok(());
    }

    for notification in &view.notifications {
        eprintln!("{notification}");
    }

    let summary = view.summary();
    println!();
    println!("=== {} ({}) ===", summary.symbol, summary.interval);
    println!("Period:         {} to {}", summary.start, summary.end);
    println!("Bars:           {}", summary.bars);
    if let Some(fetched_at) = summary.fetched_at {
        println!("Data as of:     {}", fetched_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    if view.is_empty() {
        println!();
        println!("No data available.");
        return Ok(());
    }

    if let (Some(last), Some(change)) = (summary.last_close, summary.change_pct) {
        println!("Last close:     {last:.2} ({change:+.2}%)");
    }
    println!();
    println!("--- Last {} rows ---", opts.rows.min(summary.bars));
    let table = view.augmented.tail_frame(opts.rows)?;
    println!("{table}");
    println!();
    Ok(())
}
