pub mod http_client;
pub mod parsers;

use crate::config::ScraperConfig;
use crate::error::FetchError;
use crate::models::RawRow;
use crate::task::{FetchResult, FetchUnit};
use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use self::http_client::HttpClient;
use self::parsers::{parse_last_page, parse_price_page, parse_trade_page};

// ── Fetcher trait ─────────────────────────────────────────────────────────────

/// One page of insider trades plus the pager's last page, when shown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradePage {
    pub rows: Vec<RawRow>,
    pub last_page: Option<u32>,
}

/// Executes fetch units. Each call is exactly one network round trip.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_prices(&self, ticker: &str) -> Result<Vec<RawRow>, FetchError>;

    async fn fetch_trade_page(&self, ticker: &str, page: u32) -> Result<TradePage, FetchError>;

    async fn fetch(&self, unit: &FetchUnit) -> Result<FetchResult, FetchError> {
        match unit {
            FetchUnit::Prices { ticker } => {
                let rows = self.fetch_prices(ticker).await?;
                Ok(FetchResult::Prices { ticker: ticker.clone(), rows })
            }
            FetchUnit::TradePage { ticker, page } => {
                let TradePage { rows, last_page } = self.fetch_trade_page(ticker, *page).await?;
                Ok(FetchResult::Trades {
                    ticker: ticker.clone(),
                    page: *page,
                    rows,
                    last_page,
                })
            }
        }
    }
}

// ── nasdaq.com scraper ────────────────────────────────────────────────────────

pub struct NasdaqScraper {
    client: HttpClient,
    prices_url: String,
    trades_url: String,
    prices_interval: String,
}

impl NasdaqScraper {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(config)?,
            prices_url: config.prices_url.clone(),
            trades_url: config.trades_url.clone(),
            prices_interval: config.prices_interval.clone(),
        })
    }

    /// Historical prices page for a ticker, e.g. /symbol/cvx/historical
    fn prices_url(&self, ticker: &str) -> Result<Url, FetchError> {
        Ok(Url::parse(&self.prices_url.replace("{ticker}", ticker))?)
    }

    /// Insider trades page, e.g. /symbol/cvx/insider-trades?page=2
    fn trades_url(&self, ticker: &str, page: u32) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.trades_url.replace("{ticker}", ticker))?;
        url.query_pairs_mut().append_pair("page", &page.to_string());
        Ok(url)
    }
}

#[async_trait]
impl PageFetcher for NasdaqScraper {
    async fn fetch_prices(&self, ticker: &str) -> Result<Vec<RawRow>, FetchError> {
        let url = self.prices_url(ticker)?;
        let payload = format!("{}|false|{}", self.prices_interval, ticker);

        let html = self.client.post_text(&url, payload).await?;
        let rows = parse_price_page(&html)?;

        if rows.is_empty() {
            warn!("{}: no rows found on price history page", ticker);
        }
        debug!("{}: {} price rows", ticker, rows.len());
        Ok(rows)
    }

    async fn fetch_trade_page(&self, ticker: &str, page: u32) -> Result<TradePage, FetchError> {
        let url = self.trades_url(ticker, page)?;

        let html = self.client.get_text(&url).await?;
        let rows = parse_trade_page(&html)?;
        let last_page = parse_last_page(&html, &url)?;

        debug!("{}: trades page {} → {} rows, last page {:?}", ticker, page, rows.len(), last_page);
        Ok(TradePage { rows, last_page })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scraper() -> NasdaqScraper {
        NasdaqScraper::new(&ScraperConfig::default()).unwrap()
    }

    #[test]
    fn urls_follow_templates() {
        let s = scraper();
        assert_eq!(
            s.prices_url("cvx").unwrap().as_str(),
            "http://www.nasdaq.com/symbol/cvx/historical"
        );
        assert_eq!(
            s.trades_url("aapl", 3).unwrap().as_str(),
            "https://www.nasdaq.com/symbol/aapl/insider-trades?page=3"
        );
    }

    struct Canned;

    #[async_trait]
    impl PageFetcher for Canned {
        async fn fetch_prices(&self, _ticker: &str) -> Result<Vec<RawRow>, FetchError> {
            Ok(vec![vec!["03/01/2018".into()]])
        }

        async fn fetch_trade_page(&self, _ticker: &str, page: u32) -> Result<TradePage, FetchError> {
            Ok(TradePage { rows: vec![], last_page: Some(page + 1) })
        }
    }

    #[tokio::test]
    async fn fetch_tags_results_by_unit_kind() {
        let prices = Canned.fetch(&FetchUnit::Prices { ticker: "cvx".into() }).await.unwrap();
        assert!(matches!(prices, FetchResult::Prices { ref ticker, ref rows } if ticker == "cvx" && rows.len() == 1));

        let trades = Canned
            .fetch(&FetchUnit::TradePage { ticker: "cvx".into(), page: 2 })
            .await
            .unwrap();
        assert_eq!(
            trades,
            FetchResult::Trades { ticker: "cvx".into(), page: 2, rows: vec![], last_page: Some(3) }
        );
    }
}
