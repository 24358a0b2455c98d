//! Error taxonomy for the scrape engine.
//!
//! Fetch and parse errors are isolated to one unit or one row. Config and storage
//! errors abort the run.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single fetch unit. Logged and counted, never fatal.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Unexpected page shape: {0}")]
    Shape(String),

    #[error("Fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure to normalise one raw row.
#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("expected at least {expected} columns, found {found}")]
    Columns { expected: usize, found: usize },

    #[error("unparseable date {0:?}")]
    Date(String),

    #[error("unparseable number {0:?}")]
    Number(String),

    #[error("no numeric insider code in {0:?}")]
    InsiderCode(String),

    #[error("empty {0} field")]
    Empty(&'static str),
}

/// Storage rejected a write instead of duplicating a natural key.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("constraint violation on {table}: {message}")]
    Constraint { table: &'static str, message: String },
}

/// Invalid run configuration, reported before any scheduling starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("ticker list {0:?} is empty")]
    EmptyTickerList(PathBuf),

    #[error("could not read ticker list {path:?}: {source}")]
    TickerFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("concurrency limit {0} is outside 1..=10")]
    Concurrency(usize),

    #[error("max pages must be at least 1")]
    MaxPages,

    #[error("fetch timeout must be at least 1 second")]
    FetchTimeout,
}
