mod config;
mod error;
mod ingest;
mod models;
mod pipeline;
mod scraper;
mod storage;
mod task;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;
use crate::models::ScrapeMode;
use crate::pipeline::Pipeline;
use crate::storage::Repository;

#[derive(Parser)]
#[command(name = "trading-stats", about = "Nasdaq price history and insider trade scraper", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape prices and/or insider trades for every ticker in the list
    Scrape {
        /// File path with one ticker per line (default: ./tickers.txt)
        #[arg(short, long, env = "TRADING_STATS_TICKERS")]
        file: Option<PathBuf>,

        /// What to scrape (default: all)
        #[arg(short, long, value_enum)]
        restrict: Option<ScrapeMode>,

        /// Concurrent fetches, between 1 and 10 (default: 5)
        #[arg(short, long)]
        threads: Option<usize>,
    },

    /// Show database statistics
    Stats,

    /// List all stored ticker symbols
    Tickers,

    /// Apply schema migrations without scraping
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "trading_stats=info,warn",
        1 => "trading_stats=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let mut config = AppConfig::load()?;

    match cli.command {
        Command::Scrape { file, restrict, threads } => {
            if let Some(file) = file {
                config.pipeline.tickers_file = file;
            }
            if let Some(mode) = restrict {
                config.pipeline.mode = mode;
            }
            if let Some(threads) = threads {
                config.pipeline.concurrency = threads;
            }

            let _t = utils::Timer::start("Scrape");
            Pipeline::new(config).run().await?;
        }

        Command::Stats => {
            let repo = Repository::open(&config.storage.db_path)?;
            let (min, max) = repo.price_date_range().unwrap_or((None, None));
            println!("─────────────────────────────────");
            println!("  Trading stats — Database");
            println!("─────────────────────────────────");
            println!("  Tickers  : {}", utils::fmt_count(repo.ticker_count()?));
            println!("  Prices   : {}", utils::fmt_count(repo.price_count()?));
            println!("  Insiders : {}", utils::fmt_count(repo.insider_count()?));
            println!("  Trades   : {}", utils::fmt_count(repo.trade_count()?));
            println!("  From     : {}", min.map(|d| d.to_string()).unwrap_or("—".into()));
            println!("  To       : {}", max.map(|d| d.to_string()).unwrap_or("—".into()));
            println!("─────────────────────────────────");
        }

        Command::Tickers => {
            let repo = Repository::open(&config.storage.db_path)?;
            let tickers = repo.list_tickers()?;
            if tickers.is_empty() {
                println!("No tickers — run `trading-stats scrape` first.");
            } else {
                println!("{} tickers:", tickers.len());
                for t in &tickers {
                    println!("  {}", t);
                }
            }
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}
