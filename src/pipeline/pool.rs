//! Fixed-capacity pool of outstanding fetch units.
//!
//! All fetches run as futures polled by the scheduler loop itself, so they only
//! suspend at their network I/O and ingestion never overlaps a poll. A dispatched
//! unit occupies its slot immediately but makes progress only while the scheduler
//! is inside `wait_any`/`wait_all`; every unit dispatched since the last wait
//! starts together on the next one. Dropping the pool cancels whatever is still
//! outstanding.

use crate::error::FetchError;
use crate::scraper::PageFetcher;
use crate::task::{FetchResult, FetchUnit};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::time::Duration;

/// A finished unit together with the unit that produced it.
#[derive(Debug)]
pub struct Completed {
    pub unit: FetchUnit,
    pub result: Result<FetchResult, FetchError>,
}

pub struct FetchPool<'a> {
    fetcher: &'a dyn PageFetcher,
    capacity: usize,
    timeout: Duration,
    pending: FuturesUnordered<BoxFuture<'a, Completed>>,
    per_ticker: HashMap<String, usize>,
}

impl<'a> FetchPool<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, capacity: usize, timeout: Duration) -> Self {
        Self {
            fetcher,
            capacity,
            timeout,
            pending: FuturesUnordered::new(),
            per_ticker: HashMap::new(),
        }
    }

    /// Claim a slot for `unit`; it starts running on the next `wait_any`/`wait_all`.
    /// Callers keep `len() <= capacity`.
    pub fn dispatch(&mut self, unit: FetchUnit) {
        debug_assert!(self.pending.len() < self.capacity, "fetch pool over capacity");
        *self.per_ticker.entry(unit.ticker().to_string()).or_default() += 1;

        let fetcher = self.fetcher;
        let timeout = self.timeout;
        self.pending.push(Box::pin(async move {
            let result = match tokio::time::timeout(timeout, fetcher.fetch(&unit)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(timeout)),
            };
            Completed { unit, result }
        }));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.capacity
    }

    /// Units of `ticker` still outstanding.
    pub fn in_flight_for(&self, ticker: &str) -> usize {
        self.per_ticker.get(ticker).copied().unwrap_or(0)
    }

    /// Wait for whichever unit finishes first. `None` when nothing is in flight.
    pub async fn wait_any(&mut self) -> Option<Completed> {
        let done = self.pending.next().await?;
        let ticker = done.unit.ticker();
        let remaining = match self.per_ticker.get_mut(ticker) {
            Some(n) => {
                *n -= 1;
                *n
            }
            None => 0,
        };
        if remaining == 0 {
            self.per_ticker.remove(ticker);
        }
        Some(done)
    }

    /// Wait for every outstanding unit.
    pub async fn wait_all(&mut self) -> Vec<Completed> {
        let mut done = Vec::with_capacity(self.pending.len());
        while let Some(c) = self.wait_any().await {
            done.push(c);
        }
        done
    }

    /// Drop every outstanding fetch. Returns how many were cancelled.
    pub fn cancel(&mut self) -> usize {
        let n = self.pending.len();
        self.pending = FuturesUnordered::new();
        self.per_ticker.clear();
        n
    }
}
