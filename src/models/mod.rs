use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Scrape mode ───────────────────────────────────────────────────────────────

/// Which kinds of data a run collects for each ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeMode {
    Price,
    Trade,
    All,
}

impl ScrapeMode {
    pub fn includes_prices(self) -> bool {
        matches!(self, ScrapeMode::Price | ScrapeMode::All)
    }

    pub fn includes_trades(self) -> bool {
        matches!(self, ScrapeMode::Trade | ScrapeMode::All)
    }
}

impl fmt::Display for ScrapeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScrapeMode::Price => "price",
            ScrapeMode::Trade => "trade",
            ScrapeMode::All => "all",
        })
    }
}

// ── Raw rows ──────────────────────────────────────────────────────────────────

/// One scraped table row, cells as text in source column order.
pub type RawRow = Vec<String>;

// ── Price history ─────────────────────────────────────────────────────────────

/// Natural key: (ticker, date).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

// ── Insider trades ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Insider {
    pub code: i64,
    pub name: String,
}

/// Natural key: (ticker, insider, transaction_type, last_date).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeRecord {
    pub insider: Insider,
    pub transaction_type: String,
    pub last_date: NaiveDate,
    pub last_price: f64,
    pub shares_traded: i64,
    pub shares_held: i64,
}

// ── Upsert outcome ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_coverage() {
        assert!(ScrapeMode::All.includes_prices() && ScrapeMode::All.includes_trades());
        assert!(ScrapeMode::Price.includes_prices() && !ScrapeMode::Price.includes_trades());
        assert!(!ScrapeMode::Trade.includes_prices() && ScrapeMode::Trade.includes_trades());
    }
}
