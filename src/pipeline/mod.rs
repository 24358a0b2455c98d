//! Pipeline orchestrator: ticker list → scheduler → storage.
//!
//! `run()` validates the configuration and reads the whole ticker file before any
//! fetch is issued, opens the database, then hands the queue to the [`Scheduler`].
//! Each run is recorded in `scrape_runs` with its final counts.
//! Idempotent: re-running over the same pages updates rows in place (natural-key upserts).

pub mod pool;
pub mod queue;
pub mod scheduler;

use crate::config::AppConfig;
use crate::ingest::{DataIngestor, NumberFormat};
use crate::scraper::NasdaqScraper;
use crate::storage::{Repository, RunCounts};
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

pub use self::queue::TickerQueue;
pub use self::scheduler::{RunSummary, Scheduler};

pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        self.config.validate()?;
        let pipeline = &self.config.pipeline;
        let queue = TickerQueue::from_file(&pipeline.tickers_file)?;
        info!(
            "{} tickers from {:?} | mode {} | concurrency {}",
            queue.len(),
            pipeline.tickers_file,
            pipeline.mode,
            pipeline.concurrency
        );

        let repo = Repository::open(&self.config.storage.db_path)
            .context("Failed to open DuckDB")?;
        if self.config.storage.run_migrations {
            repo.run_migrations()?;
        }

        let scraper = NasdaqScraper::new(&self.config.scraper)
            .context("Failed to build scraper")?;
        let numbers = NumberFormat {
            group_separator: self.config.ingest.group_separator,
            decimal_separator: self.config.ingest.decimal_separator,
        };
        let ingestor = DataIngestor::new(&repo, numbers);
        let scheduler = Scheduler::new(
            &scraper,
            &ingestor,
            pipeline,
            Duration::from_secs(self.config.scraper.timeout_secs),
        )?;

        let run_id = repo.begin_scrape_run(&pipeline.mode.to_string())?;
        let mut summary = RunSummary::default();
        let outcome = scheduler.run(queue, &mut summary).await;
        record_run(&repo, run_id, &summary, &outcome);

        outcome?;
        let (min_date, max_date) = repo.price_date_range().unwrap_or((None, None));
        info!("=== Done: {} | prices {:?} → {:?} ===", summary, min_date, max_date);
        Ok(summary)
    }
}

/// Persist the final (or partial, on abort) counts for `run_id`.
fn record_run(repo: &Repository, run_id: i64, summary: &RunSummary, outcome: &Result<()>) {
    let error = outcome.as_ref().err().map(|e| format!("{e:#}"));
    if let Err(e) = repo.finish_scrape_run(run_id, &RunCounts::from(summary), error.as_deref()) {
        warn!("Could not record scrape run {}: {:#}", run_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::IngestStats;

    #[test]
    fn aborted_run_is_logged_with_partial_counts() {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        let run_id = repo.begin_scrape_run("all").unwrap();
        let summary = RunSummary {
            tickers_processed: 1,
            units_succeeded: 2,
            units_failed: 0,
            rows: IngestStats { inserted: 2, updated: 0, skipped: 1, failed: 1 },
        };

        record_run(&repo, run_id, &summary, &Err(anyhow::anyhow!("Failed to look up trade")));

        let (status, counts, error) = repo.scrape_run(run_id).unwrap();
        assert_eq!(status, "error");
        assert_eq!(counts, RunCounts::from(&summary));
        assert_eq!(counts.rows_inserted, 2);
        assert_eq!(counts.rows_skipped, 1);
        assert_eq!(counts.rows_failed, 1);
        assert_eq!(error.as_deref(), Some("Failed to look up trade"));
    }
}
