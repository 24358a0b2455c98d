//! Bounded-concurrency driver for per-ticker scrape tasks.
//!
//! Tickers are started strictly in queue order. Until the current task reaches its
//! trade pages, units from any number of tickers share the pool up to the limit.
//! Once a task starts paging it is drained after every unit, so page `n + 1` is only
//! requested after page `n` (and anything else of that ticker) has completed and the
//! first page has had a chance to report the real last page.

use super::pool::{Completed, FetchPool};
use super::queue::TickerQueue;
use crate::config::PipelineConfig;
use crate::error::ConfigError;
use crate::ingest::{DataIngestor, IngestStats};
use crate::models::ScrapeMode;
use crate::scraper::PageFetcher;
use crate::storage::RunCounts;
use crate::task::{FetchResult, ScrapeTask};
use anyhow::Result;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub tickers_processed: usize,
    pub units_succeeded: usize,
    pub units_failed: usize,
    pub rows: IngestStats,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tickers | units: {} ok, {} failed | rows: {} inserted, {} updated, {} skipped, {} failed",
            self.tickers_processed,
            self.units_succeeded,
            self.units_failed,
            self.rows.inserted,
            self.rows.updated,
            self.rows.skipped,
            self.rows.failed,
        )
    }
}

impl From<&RunSummary> for RunCounts {
    fn from(s: &RunSummary) -> Self {
        RunCounts {
            tickers_processed: s.tickers_processed,
            units_succeeded: s.units_succeeded,
            units_failed: s.units_failed,
            rows_inserted: s.rows.inserted,
            rows_updated: s.rows.updated,
            rows_skipped: s.rows.skipped,
            rows_failed: s.rows.failed,
        }
    }
}

pub struct Scheduler<'a> {
    fetcher: &'a dyn PageFetcher,
    ingestor: &'a DataIngestor<'a>,
    concurrency: usize,
    mode: ScrapeMode,
    max_pages: u32,
    fetch_timeout: Duration,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        fetcher: &'a dyn PageFetcher,
        ingestor: &'a DataIngestor<'a>,
        config: &PipelineConfig,
        fetch_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            fetcher,
            ingestor,
            concurrency: config.concurrency,
            mode: config.mode,
            max_pages: config.max_pages,
            fetch_timeout,
        })
    }

    /// Drive every ticker in `queue` to completion, accumulating into `summary`.
    /// Fetch and row errors are counted; a storage error cancels outstanding fetches
    /// and aborts the run, leaving the progress made so far in `summary`.
    pub async fn run(&self, mut queue: TickerQueue, summary: &mut RunSummary) -> Result<()> {
        let Some(first) = queue.pop() else {
            warn!("No tickers to scrape");
            return Ok(());
        };

        let mut pool = FetchPool::new(self.fetcher, self.concurrency, self.fetch_timeout);
        let mut task = self.start(first, queue.len(), summary);

        loop {
            if !task.is_finished() {
                if let Some(unit) = task.next_unit() {
                    debug!("dispatch {} [{:?}] ({} already in flight)", unit, task.state(), pool.len());
                    pool.dispatch(unit);
                }
            }

            if task.started_paging() {
                while pool.in_flight_for(task.ticker()) > 0 {
                    let Some(done) = pool.wait_any().await else { break };
                    self.settle(&mut pool, &mut task, done, summary)?;
                }
            } else if pool.is_full() {
                if let Some(done) = pool.wait_any().await {
                    self.settle(&mut pool, &mut task, done, summary)?;
                }
            }

            if task.is_finished() {
                match queue.pop() {
                    Some(next) => task = self.start(next, queue.len(), summary),
                    None => break,
                }
            }
        }

        if !pool.is_empty() {
            debug!("queue exhausted, waiting on {} outstanding units", pool.len());
        }
        for done in pool.wait_all().await {
            self.settle(&mut pool, &mut task, done, summary)?;
        }

        Ok(())
    }

    fn start(&self, ticker: String, remaining: usize, summary: &mut RunSummary) -> ScrapeTask {
        summary.tickers_processed += 1;
        info!("{}: scraping {} ({} queued)", ticker, self.mode, remaining);
        ScrapeTask::new(ticker, self.mode, self.max_pages)
    }

    fn settle(
        &self,
        pool: &mut FetchPool<'_>,
        task: &mut ScrapeTask,
        done: Completed,
        summary: &mut RunSummary,
    ) -> Result<()> {
        if let Err(e) = self.route(task, done, summary) {
            let cancelled = pool.cancel();
            error!("Ingestion failed, cancelled {} in-flight fetches: {:#}", cancelled, e);
            return Err(e);
        }
        Ok(())
    }

    /// Hand a completed unit to the ingestor matching its kind.
    fn route(&self, task: &mut ScrapeTask, done: Completed, summary: &mut RunSummary) -> Result<()> {
        let result = match done.result {
            Ok(result) => result,
            Err(e) => {
                warn!("{}: fetch failed: {}", done.unit, e);
                summary.units_failed += 1;
                return Ok(());
            }
        };
        summary.units_succeeded += 1;

        let stats = match result {
            FetchResult::Prices { ticker, rows } => self.ingestor.prices_loading(&ticker, &rows)?,
            FetchResult::Trades { ticker, page, rows, last_page } => {
                if page == 1 && ticker == task.ticker() {
                    if let Some(last) = last_page {
                        task.discover_last_page(last);
                        debug!("{}: {} trade pages", ticker, task.pages_total());
                    }
                }
                self.ingestor.trades_loading(&ticker, &rows)?
            }
        };
        summary.rows += stats;
        Ok(())
    }
}
