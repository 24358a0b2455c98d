//! Idempotent ingestion of scraped rows.
//!
//! Each call handles one ticker batch inside a single transaction. Padding rows are
//! skipped, rows that fail to normalise are logged and counted, and everything else
//! is upserted by its natural key.

pub mod cleaner;

use crate::models::{RawRow, Upsert};
use crate::storage::Repository;
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::ops::AddAssign;
use tracing::{debug, warn};

pub use self::cleaner::NumberFormat;

/// Row outcomes for one or more batches.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub inserted: usize,
    pub updated: usize,
    /// All-empty padding rows.
    pub skipped: usize,
    /// Rows that failed normalisation.
    pub failed: usize,
}

impl IngestStats {
    fn record(&mut self, outcome: Upsert) {
        match outcome {
            Upsert::Inserted => self.inserted += 1,
            Upsert::Updated => self.updated += 1,
        }
    }
}

impl AddAssign for IngestStats {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.updated += rhs.updated;
        self.skipped += rhs.skipped;
        self.failed += rhs.failed;
    }
}

pub struct DataIngestor<'a> {
    repo: &'a Repository,
    numbers: NumberFormat,
}

impl<'a> DataIngestor<'a> {
    pub fn new(repo: &'a Repository, numbers: NumberFormat) -> Self {
        Self { repo, numbers }
    }

    /// Upsert price rows keyed by (ticker, date). Same-day rows land on today.
    pub fn prices_loading(&self, ticker: &str, rows: &[RawRow]) -> Result<IngestStats> {
        self.prices_loading_on(ticker, rows, Local::now().date_naive())
    }

    fn prices_loading_on(&self, ticker: &str, rows: &[RawRow], today: NaiveDate) -> Result<IngestStats> {
        let mut stats = IngestStats::default();
        let tx = self.repo.transaction()?;
        let ticker_id = self.repo.get_or_create_ticker(ticker)?;

        for (i, row) in rows.iter().enumerate() {
            if cleaner::is_padding(row) {
                stats.skipped += 1;
                continue;
            }
            let record = match cleaner::price_row(row, today, &self.numbers) {
                Ok(record) => record,
                Err(e) => {
                    warn!("{}: price row {} rejected: {} ({:?})", ticker, i, e, row);
                    stats.failed += 1;
                    continue;
                }
            };
            stats.record(self.repo.upsert_price(ticker_id, &record)?);
        }

        tx.commit()
            .with_context(|| format!("commit prices for {}", ticker))?;
        debug!("{}: prices {:?}", ticker, stats);
        Ok(stats)
    }

    /// Upsert trade rows keyed by (ticker, insider, transaction type, last date),
    /// creating insiders and transaction types on first sight.
    pub fn trades_loading(&self, ticker: &str, rows: &[RawRow]) -> Result<IngestStats> {
        let mut stats = IngestStats::default();
        let tx = self.repo.transaction()?;
        let ticker_id = self.repo.get_or_create_ticker(ticker)?;

        for (i, row) in rows.iter().enumerate() {
            if cleaner::is_padding(row) {
                stats.skipped += 1;
                continue;
            }
            let record = match cleaner::trade_row(row, &self.numbers) {
                Ok(record) => record,
                Err(e) => {
                    warn!("{}: trade row {} rejected: {} ({:?})", ticker, i, e, row);
                    stats.failed += 1;
                    continue;
                }
            };

            let insider_id = self.repo.get_or_create_insider(&record.insider)?;
            let type_id = self.repo.get_or_create_transaction_type(&record.transaction_type)?;
            stats.record(self.repo.upsert_trade(ticker_id, insider_id, type_id, &record)?);
        }

        tx.commit()
            .with_context(|| format!("commit trades for {}", ticker))?;
        debug!("{}: trades {:?}", ticker, stats);
        Ok(stats)
    }
}
