use crate::error::ConfigError;
use std::collections::VecDeque;
use std::path::Path;

/// FIFO of lower-cased ticker symbols; file order is processing order.
#[derive(Debug, Default, Clone)]
pub struct TickerQueue {
    symbols: VecDeque<String>,
}

impl TickerQueue {
    /// One symbol per line. Blank lines are ignored; an empty list is a config error.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::TickerFile {
            path: path.to_path_buf(),
            source,
        })?;
        let queue = Self::parse(&text);
        if queue.is_empty() {
            return Err(ConfigError::EmptyTickerList(path.to_path_buf()));
        }
        Ok(queue)
    }

    pub fn parse(text: &str) -> Self {
        text.lines().collect()
    }

    pub fn pop(&mut self) -> Option<String> {
        self.symbols.pop_front()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for TickerQueue {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let symbols = iter
            .into_iter()
            .map(|s| s.as_ref().trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { symbols }
    }
}
