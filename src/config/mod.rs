use crate::error::ConfigError;
use crate::models::ScrapeMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Valid range for the number of simultaneously in-flight fetch units.
pub const CONCURRENCY_RANGE: std::ops::RangeInclusive<usize> = 1..=10;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub scraper: ScraperConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub ingest: IngestConfig,
}

/// Page fetcher configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// `{ticker}` is substituted with the lower-cased symbol.
    pub prices_url: String,
    /// `{ticker}` is substituted; the page number goes in the `page` query param.
    pub trades_url: String,
    pub prices_interval: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    pub run_migrations: bool,
}

/// Scheduler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tickers_file: PathBuf,
    pub mode: ScrapeMode,
    pub concurrency: usize,
    /// Default trade page cap; discovery can only lower it.
    pub max_pages: u32,
}

/// Number format used when normalising scraped numeric fields
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestConfig {
    pub group_separator: char,
    pub decimal_separator: char,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            prices_url: "http://www.nasdaq.com/symbol/{ticker}/historical".to_string(),
            trades_url: "https://www.nasdaq.com/symbol/{ticker}/insider-trades".to_string(),
            prices_interval: "3m".to_string(),
            timeout_secs: 30,
            user_agent: "trading-stats/0.1 (price and insider trade collector)".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/trading_stats.duckdb"),
            run_migrations: true,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tickers_file: PathBuf::from("./tickers.txt"),
            mode: ScrapeMode::All,
            concurrency: 5,
            max_pages: crate::task::DEFAULT_MAX_PAGES,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            group_separator: ',',
            decimal_separator: '.',
        }
    }
}

impl ScraperConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::FetchTimeout);
        }
        Ok(())
    }
}

impl PipelineConfig {
    /// Checked before any scheduling starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !CONCURRENCY_RANGE.contains(&self.concurrency) {
            return Err(ConfigError::Concurrency(self.concurrency));
        }
        if self.max_pages == 0 {
            return Err(ConfigError::MaxPages);
        }
        Ok(())
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("TRADING_STATS").separator("__"))
            .build()
            .context("Failed to assemble configuration sources")?;

        cfg.try_deserialize()
            .context("Invalid configuration")
    }

    /// Checked before any fetch is issued.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scraper.validate()?;
        self.pipeline.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_cli_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.pipeline.tickers_file, PathBuf::from("./tickers.txt"));
        assert_eq!(cfg.pipeline.mode, ScrapeMode::All);
        assert_eq!(cfg.pipeline.concurrency, 5);
        assert_eq!(cfg.pipeline.max_pages, 10);
        assert!(cfg.pipeline.validate().is_ok());
    }

    #[test]
    fn concurrency_outside_range_is_rejected() {
        for bad in [0, 11, 50] {
            let cfg = PipelineConfig { concurrency: bad, ..Default::default() };
            assert!(matches!(cfg.validate(), Err(ConfigError::Concurrency(n)) if n == bad));
        }
        for ok in [1, 10] {
            let cfg = PipelineConfig { concurrency: ok, ..Default::default() };
            assert!(cfg.validate().is_ok());
        }
    }

    #[test]
    fn zero_fetch_timeout_is_rejected() {
        let mut cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());

        cfg.scraper.timeout_secs = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::FetchTimeout)));
    }

    #[test]
    fn partial_source_keeps_other_defaults() {
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[pipeline]\nconcurrency = 2\nmode = \"trade\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.pipeline.concurrency, 2);
        assert_eq!(cfg.pipeline.mode, ScrapeMode::Trade);
        assert_eq!(cfg.scraper.prices_interval, "3m");
        assert_eq!(cfg.ingest.group_separator, ',');
    }
}
