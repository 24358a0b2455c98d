//! Per-ticker scrape state machine.
//!
//! A `ScrapeTask` walks `FetchingPrices → FetchingTradesPage(1..=pages_total) → Done`,
//! handing the scheduler one `FetchUnit` per call to [`ScrapeTask::next_unit`].
//! The trade page count starts at a cap and can only shrink once the first page
//! reveals the real last page.

use crate::models::{RawRow, ScrapeMode};
use std::fmt;

/// Trade pages requested per ticker when the source does not say otherwise.
pub const DEFAULT_MAX_PAGES: u32 = 10;

/// One discrete network retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchUnit {
    Prices { ticker: String },
    TradePage { ticker: String, page: u32 },
}

impl FetchUnit {
    pub fn ticker(&self) -> &str {
        match self {
            FetchUnit::Prices { ticker } | FetchUnit::TradePage { ticker, .. } => ticker,
        }
    }
}

impl fmt::Display for FetchUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchUnit::Prices { ticker } => write!(f, "{ticker}/prices"),
            FetchUnit::TradePage { ticker, page } => write!(f, "{ticker}/trades#{page}"),
        }
    }
}

/// Rows produced by a completed fetch unit, tagged by kind for routing.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    Prices {
        ticker: String,
        rows: Vec<RawRow>,
    },
    Trades {
        ticker: String,
        page: u32,
        rows: Vec<RawRow>,
        last_page: Option<u32>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    FetchingPrices,
    FetchingTradesPage(u32),
    Done,
}

#[derive(Debug)]
pub struct ScrapeTask {
    ticker: String,
    mode: ScrapeMode,
    prices_done: bool,
    current_page: u32,
    pages_total: u32,
    last_page_known: bool,
    started_paging: bool,
    finished: bool,
}

impl ScrapeTask {
    pub fn new(ticker: impl Into<String>, mode: ScrapeMode, max_pages: u32) -> Self {
        Self {
            ticker: ticker.into(),
            mode,
            prices_done: false,
            current_page: 0,
            pages_total: max_pages,
            last_page_known: false,
            started_paging: false,
            finished: false,
        }
    }

    /// Advance the machine. Returns `None` exactly once the task is done.
    pub fn next_unit(&mut self) -> Option<FetchUnit> {
        if self.mode.includes_prices() && !self.prices_done {
            self.prices_done = true;
            return Some(FetchUnit::Prices { ticker: self.ticker.clone() });
        }

        if self.mode.includes_trades() && self.current_page < self.pages_total {
            self.current_page += 1;
            if self.current_page == 1 {
                self.started_paging = true;
            }
            return Some(FetchUnit::TradePage {
                ticker: self.ticker.clone(),
                page: self.current_page,
            });
        }

        self.finished = true;
        None
    }

    /// Apply the last page reported by the first trade page. Later reports are ignored.
    pub fn discover_last_page(&mut self, last_page: u32) {
        if self.last_page_known {
            return;
        }
        self.last_page_known = true;
        self.pages_total = self.pages_total.min(last_page);
    }

    pub fn state(&self) -> TaskState {
        if self.finished {
            TaskState::Done
        } else if self.current_page > 0 {
            TaskState::FetchingTradesPage(self.current_page)
        } else {
            TaskState::FetchingPrices
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn started_paging(&self) -> bool {
        self.started_paging
    }

    pub fn pages_total(&self) -> u32 {
        self.pages_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(task: &mut ScrapeTask) -> Vec<FetchUnit> {
        std::iter::from_fn(|| task.next_unit()).collect()
    }

    #[test]
    fn all_mode_emits_prices_then_pages_in_order() {
        let mut task = ScrapeTask::new("cvx", ScrapeMode::All, 3);
        assert_eq!(task.state(), TaskState::FetchingPrices);

        let units = drain(&mut task);
        assert_eq!(
            units,
            vec![
                FetchUnit::Prices { ticker: "cvx".into() },
                FetchUnit::TradePage { ticker: "cvx".into(), page: 1 },
                FetchUnit::TradePage { ticker: "cvx".into(), page: 2 },
                FetchUnit::TradePage { ticker: "cvx".into(), page: 3 },
            ]
        );
        assert!(task.is_finished());
        assert_eq!(task.state(), TaskState::Done);
        assert_eq!(task.next_unit(), None);
    }

    #[test]
    fn paging_flag_is_set_by_first_page_and_sticks() {
        let mut task = ScrapeTask::new("aapl", ScrapeMode::All, 2);
        task.next_unit();
        assert!(!task.started_paging());

        task.next_unit();
        assert!(task.started_paging());
        assert_eq!(task.state(), TaskState::FetchingTradesPage(1));

        drain(&mut task);
        assert!(task.started_paging());
    }

    #[test]
    fn price_mode_never_pages() {
        let mut task = ScrapeTask::new("cvx", ScrapeMode::Price, DEFAULT_MAX_PAGES);
        assert_eq!(drain(&mut task), vec![FetchUnit::Prices { ticker: "cvx".into() }]);
        assert!(!task.started_paging());
        assert!(task.is_finished());
    }

    #[test]
    fn trade_mode_skips_prices() {
        let mut task = ScrapeTask::new("cvx", ScrapeMode::Trade, 2);
        let units = drain(&mut task);
        assert_eq!(units.len(), 2);
        assert!(units.iter().all(|u| matches!(u, FetchUnit::TradePage { .. })));
    }

    #[test]
    fn discovery_only_shrinks_the_cap() {
        let mut lower = ScrapeTask::new("cvx", ScrapeMode::Trade, DEFAULT_MAX_PAGES);
        lower.next_unit();
        lower.discover_last_page(7);
        assert_eq!(lower.pages_total(), 7);
        assert_eq!(drain(&mut lower).len(), 6);

        let mut higher = ScrapeTask::new("cvx", ScrapeMode::Trade, DEFAULT_MAX_PAGES);
        higher.next_unit();
        higher.discover_last_page(15);
        assert_eq!(higher.pages_total(), 10);
    }

    #[test]
    fn discovery_is_fixed_after_first_report() {
        let mut task = ScrapeTask::new("cvx", ScrapeMode::Trade, DEFAULT_MAX_PAGES);
        task.next_unit();
        task.discover_last_page(4);
        task.discover_last_page(2);
        assert_eq!(task.pages_total(), 4);
    }

    #[test]
    fn discovery_below_current_page_ends_paging() {
        let mut task = ScrapeTask::new("cvx", ScrapeMode::Trade, DEFAULT_MAX_PAGES);
        task.next_unit();
        task.discover_last_page(1);
        assert_eq!(task.next_unit(), None);
        assert!(task.is_finished());
    }
}
