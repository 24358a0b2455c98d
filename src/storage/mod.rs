use crate::error::StorageError;
use crate::models::{Insider, PriceRecord, TradeRecord, Upsert};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use duckdb::{params, Connection, Params, Transaction};
use std::path::Path;
use tracing::{debug, info};

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS ticker_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS price_history_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS insider_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS transaction_type_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS trade_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS scrape_runs_id_seq START 1;

CREATE TABLE IF NOT EXISTS ticker (
    id          BIGINT  PRIMARY KEY DEFAULT nextval('ticker_id_seq'),
    name        VARCHAR NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS price_history (
    id          BIGINT  PRIMARY KEY DEFAULT nextval('price_history_id_seq'),
    ticker_id   BIGINT  NOT NULL,
    date        DATE    NOT NULL,
    open        DOUBLE  NOT NULL,
    high        DOUBLE  NOT NULL,
    low         DOUBLE  NOT NULL,
    close       DOUBLE  NOT NULL,
    volume      BIGINT  NOT NULL,
    UNIQUE (ticker_id, date)
);

CREATE TABLE IF NOT EXISTS insider (
    id          BIGINT  PRIMARY KEY DEFAULT nextval('insider_id_seq'),
    code        BIGINT  NOT NULL UNIQUE,
    name        VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS transaction_type (
    id          BIGINT  PRIMARY KEY DEFAULT nextval('transaction_type_id_seq'),
    name        VARCHAR NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS trade (
    id                   BIGINT PRIMARY KEY DEFAULT nextval('trade_id_seq'),
    ticker_id            BIGINT NOT NULL,
    insider_id           BIGINT NOT NULL,
    transaction_type_id  BIGINT NOT NULL,
    last_date            DATE   NOT NULL,
    last_price           DOUBLE NOT NULL,
    shares_traded        BIGINT NOT NULL,
    shares_held          BIGINT NOT NULL,
    UNIQUE (ticker_id, insider_id, transaction_type_id, last_date)
);

CREATE TABLE IF NOT EXISTS scrape_runs (
    id                  BIGINT PRIMARY KEY DEFAULT nextval('scrape_runs_id_seq'),
    started_at          TIMESTAMP NOT NULL,
    finished_at         TIMESTAMP,
    status              VARCHAR NOT NULL DEFAULT 'running',
    mode                VARCHAR NOT NULL,
    tickers_processed   INTEGER DEFAULT 0,
    units_succeeded     INTEGER DEFAULT 0,
    units_failed        INTEGER DEFAULT 0,
    rows_inserted       INTEGER DEFAULT 0,
    rows_updated        INTEGER DEFAULT 0,
    rows_skipped        INTEGER DEFAULT 0,
    rows_failed         INTEGER DEFAULT 0,
    error_msg           VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_prices_date  ON price_history (date);
CREATE INDEX IF NOT EXISTS idx_trade_ticker ON trade (ticker_id);
"#;

/// Turns a unique-key violation into `StorageError::Constraint`.
fn constraint(table: &'static str) -> impl FnOnce(duckdb::Error) -> anyhow::Error {
    move |e| {
        let message = e.to_string();
        if message.contains("Constraint Error") || message.contains("violates") {
            StorageError::Constraint { table, message }.into()
        } else {
            anyhow::Error::new(e).context(format!("write to {table}"))
        }
    }
}

/// Run summary persisted into `scrape_runs`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunCounts {
    pub tickers_processed: usize,
    pub units_succeeded: usize,
    pub units_failed: usize,
    pub rows_inserted: usize,
    pub rows_updated: usize,
    pub rows_skipped: usize,
    pub rows_failed: usize,
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn })
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        self.conn.execute_batch(DDL).context("DDL failed")?;
        self.conn.execute_batch(INDEXES).context("Index creation failed")?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    /// Unit of work for one ticker batch. Statements issued through `self`
    /// while it is open run inside it; dropping it uncommitted rolls back.
    pub fn transaction(&self) -> Result<Transaction<'_>> {
        self.conn
            .unchecked_transaction()
            .context("Failed to begin transaction")
    }

    fn lookup_id(&self, table: &'static str, sql: &str, params: impl Params) -> Result<Option<i64>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .with_context(|| format!("Failed to prepare {table} lookup"))?;
        let mut rows = stmt
            .query(params)
            .with_context(|| format!("Failed to look up {table}"))?;
        let id = match rows.next()? {
            Some(row) => Some(row.get(0)?),
            None => None,
        };
        Ok(id)
    }

    fn insert_returning_id(&self, table: &'static str, sql: &str, params: impl Params) -> Result<i64> {
        self.conn
            .query_row(sql, params, |r| r.get(0))
            .map_err(constraint(table))
    }

    // ── Dimensions ────────────────────────────────────────────────────────────

    pub fn get_or_create_ticker(&self, symbol: &str) -> Result<i64> {
        if let Some(id) = self.lookup_id("ticker", "SELECT id FROM ticker WHERE name = ?", params![symbol])? {
            return Ok(id);
        }
        debug!("new ticker {}", symbol);
        self.insert_returning_id(
            "ticker",
            "INSERT INTO ticker (name) VALUES (?) RETURNING id",
            params![symbol],
        )
    }

    /// Keyed by code. A changed name for a known code replaces the stored one.
    pub fn get_or_create_insider(&self, insider: &Insider) -> Result<i64> {
        let existing = self.lookup_id("insider", "SELECT id FROM insider WHERE code = ?", params![insider.code])?;
        if let Some(id) = existing {
            self.conn
                .execute(
                    "UPDATE insider SET name = ? WHERE id = ? AND name <> ?",
                    params![insider.name, id, insider.name],
                )
                .with_context(|| format!("update insider {}", insider.code))?;
            return Ok(id);
        }
        self.insert_returning_id(
            "insider",
            "INSERT INTO insider (code, name) VALUES (?, ?) RETURNING id",
            params![insider.code, insider.name],
        )
    }

    pub fn get_or_create_transaction_type(&self, name: &str) -> Result<i64> {
        if let Some(id) =
            self.lookup_id("transaction_type", "SELECT id FROM transaction_type WHERE name = ?", params![name])?
        {
            return Ok(id);
        }
        self.insert_returning_id(
            "transaction_type",
            "INSERT INTO transaction_type (name) VALUES (?) RETURNING id",
            params![name],
        )
    }

    // ── Facts ─────────────────────────────────────────────────────────────────

    /// Keyed by (ticker, date). On a match every non-key field is overwritten.
    pub fn upsert_price(&self, ticker_id: i64, price: &PriceRecord) -> Result<Upsert> {
        let existing = self.lookup_id(
            "price_history",
            "SELECT id FROM price_history WHERE ticker_id = ? AND date = ?",
            params![ticker_id, price.date],
        )?;

        match existing {
            Some(id) => {
                self.conn
                    .execute(
                        r#"UPDATE price_history SET
                               open = ?, high = ?, low = ?, close = ?, volume = ?
                           WHERE id = ?"#,
                        params![price.open, price.high, price.low, price.close, price.volume, id],
                    )
                    .with_context(|| format!("update price {} {}", ticker_id, price.date))?;
                Ok(Upsert::Updated)
            }
            None => {
                self.conn
                    .execute(
                        r#"INSERT INTO price_history
                               (ticker_id, date, open, high, low, close, volume)
                           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
                        params![
                            ticker_id, price.date,
                            price.open, price.high, price.low, price.close,
                            price.volume,
                        ],
                    )
                    .map_err(constraint("price_history"))?;
                Ok(Upsert::Inserted)
            }
        }
    }

    /// Keyed by (ticker, insider, transaction type, last date).
    pub fn upsert_trade(
        &self,
        ticker_id: i64,
        insider_id: i64,
        transaction_type_id: i64,
        trade: &TradeRecord,
    ) -> Result<Upsert> {
        let existing = self.lookup_id(
            "trade",
            r#"SELECT id FROM trade
               WHERE ticker_id = ? AND insider_id = ? AND transaction_type_id = ? AND last_date = ?"#,
            params![ticker_id, insider_id, transaction_type_id, trade.last_date],
        )?;

        match existing {
            Some(id) => {
                self.conn
                    .execute(
                        r#"UPDATE trade SET
                               last_price = ?, shares_traded = ?, shares_held = ?
                           WHERE id = ?"#,
                        params![trade.last_price, trade.shares_traded, trade.shares_held, id],
                    )
                    .with_context(|| format!("update trade {}", id))?;
                Ok(Upsert::Updated)
            }
            None => {
                self.conn
                    .execute(
                        r#"INSERT INTO trade
                               (ticker_id, insider_id, transaction_type_id, last_date,
                                last_price, shares_traded, shares_held)
                           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
                        params![
                            ticker_id, insider_id, transaction_type_id, trade.last_date,
                            trade.last_price, trade.shares_traded, trade.shares_held,
                        ],
                    )
                    .map_err(constraint("trade"))?;
                Ok(Upsert::Inserted)
            }
        }
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    pub fn list_tickers(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM ticker ORDER BY name")?;
        let names: Vec<String> = stmt
            .query_map([], |r| r.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(names)
    }

    fn count(&self, table: &str) -> Result<i64> {
        let mut s = self.conn.prepare(&format!("SELECT COUNT(*) FROM {table}"))?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn ticker_count(&self) -> Result<i64> {
        self.count("ticker")
    }

    pub fn price_count(&self) -> Result<i64> {
        self.count("price_history")
    }

    pub fn trade_count(&self) -> Result<i64> {
        self.count("trade")
    }

    pub fn insider_count(&self) -> Result<i64> {
        self.count("insider")
    }

    pub fn price_date_range(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
        let mut s = self.conn.prepare("SELECT MIN(date), MAX(date) FROM price_history")?;
        Ok(s.query_row([], |r| Ok((r.get(0)?, r.get(1)?)))?)
    }

    // ── Scrape run log ────────────────────────────────────────────────────────

    pub fn begin_scrape_run(&self, mode: &str) -> Result<i64> {
        let id = self.conn.query_row(
            "INSERT INTO scrape_runs (started_at, status, mode) VALUES (?, 'running', ?) RETURNING id",
            params![Utc::now().naive_utc(), mode],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn finish_scrape_run(&self, run_id: i64, counts: &RunCounts, error: Option<&str>) -> Result<()> {
        self.conn.execute(
            r#"UPDATE scrape_runs SET
               finished_at = ?, status = ?,
               tickers_processed = ?, units_succeeded = ?, units_failed = ?,
               rows_inserted = ?, rows_updated = ?, rows_skipped = ?, rows_failed = ?,
               error_msg = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                if error.is_none() { "success" } else { "error" },
                counts.tickers_processed as i64,
                counts.units_succeeded as i64,
                counts.units_failed as i64,
                counts.rows_inserted as i64,
                counts.rows_updated as i64,
                counts.rows_skipped as i64,
                counts.rows_failed as i64,
                error,
                run_id,
            ],
        )
        .with_context(|| format!("Failed to finish scrape run {run_id}"))?;
        Ok(())
    }
}

#[cfg(test)]
impl Repository {
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        Ok(self.conn.execute_batch(sql)?)
    }

    /// (status, counts, error message) as stored for `run_id`.
    pub fn scrape_run(&self, run_id: i64) -> Result<(String, RunCounts, Option<String>)> {
        let mut s = self.conn.prepare(
            r#"SELECT status, tickers_processed, units_succeeded, units_failed,
                      rows_inserted, rows_updated, rows_skipped, rows_failed, error_msg
               FROM scrape_runs WHERE id = ?"#,
        )?;
        let row = s.query_row(params![run_id], |r| {
            let count = |i: usize| -> duckdb::Result<usize> { Ok(r.get::<_, i64>(i)? as usize) };
            Ok((
                r.get(0)?,
                RunCounts {
                    tickers_processed: count(1)?,
                    units_succeeded: count(2)?,
                    units_failed: count(3)?,
                    rows_inserted: count(4)?,
                    rows_updated: count(5)?,
                    rows_skipped: count(6)?,
                    rows_failed: count(7)?,
                },
                r.get(8)?,
            ))
        })?;
        Ok(row)
    }
    pub fn price_on(&self, ticker: &str, date: NaiveDate) -> Result<Option<PriceRecord>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT p.date, p.open, p.high, p.low, p.close, p.volume
               FROM price_history p JOIN ticker t ON t.id = p.ticker_id
               WHERE t.name = ? AND p.date = ?"#,
        )?;
        let mut rows = stmt.query(params![ticker, date])?;
        let record = match rows.next()? {
            Some(r) => Some(PriceRecord {
                date: r.get(0)?,
                open: r.get(1)?,
                high: r.get(2)?,
                low: r.get(3)?,
                close: r.get(4)?,
                volume: r.get(5)?,
            }),
            None => None,
        };
        Ok(record)
    }

    /// (last_price, shares_traded, shares_held) for every stored trade of `ticker`.
    pub fn trades_for(&self, ticker: &str) -> Result<Vec<(f64, i64, i64)>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT tr.last_price, tr.shares_traded, tr.shares_held
               FROM trade tr JOIN ticker t ON t.id = tr.ticker_id
               WHERE t.name = ? ORDER BY tr.last_date"#,
        )?;
        let out = stmt
            .query_map(params![ticker], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(out)
    }

    /// Rows whose natural key appears more than once, across both fact tables.
    pub fn duplicate_key_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare(
            r#"SELECT
                 (SELECT COUNT(*) FROM (
                     SELECT ticker_id, date FROM price_history
                     GROUP BY ticker_id, date HAVING COUNT(*) > 1))
               + (SELECT COUNT(*) FROM (
                     SELECT ticker_id, insider_id, transaction_type_id, last_date FROM trade
                     GROUP BY ticker_id, insider_id, transaction_type_id, last_date HAVING COUNT(*) > 1))"#,
        )?;
        Ok(s.query_row([], |r| r.get(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> Repository {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        repo
    }

    fn price(day: u32, close: f64) -> PriceRecord {
        PriceRecord {
            date: NaiveDate::from_ymd_opt(2018, 3, day).unwrap(),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close,
            volume: 100,
        }
    }

    #[test]
    fn migrations_are_rerunnable() {
        let repo = repo();
        repo.run_migrations().unwrap();
        assert_eq!(repo.ticker_count().unwrap(), 0);
    }

    #[test]
    fn get_or_create_is_stable() {
        let repo = repo();
        let a = repo.get_or_create_ticker("cvx").unwrap();
        let b = repo.get_or_create_ticker("cvx").unwrap();
        let c = repo.get_or_create_ticker("aapl").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(repo.list_tickers().unwrap(), vec!["aapl", "cvx"]);

        let sale = repo.get_or_create_transaction_type("Sale").unwrap();
        assert_eq!(sale, repo.get_or_create_transaction_type("Sale").unwrap());
    }

    #[test]
    fn insider_is_keyed_by_code() {
        let repo = repo();
        let first = repo
            .get_or_create_insider(&Insider { code: 42, name: "DOE JOHN".into() })
            .unwrap();
        let renamed = repo
            .get_or_create_insider(&Insider { code: 42, name: "DOE JOHN A".into() })
            .unwrap();
        assert_eq!(first, renamed);
        assert_eq!(repo.insider_count().unwrap(), 1);
    }

    #[test]
    fn price_upsert_overwrites_in_place() {
        let repo = repo();
        let t = repo.get_or_create_ticker("cvx").unwrap();

        assert_eq!(repo.upsert_price(t, &price(1, 10.0)).unwrap(), Upsert::Inserted);
        assert_eq!(repo.upsert_price(t, &price(1, 11.0)).unwrap(), Upsert::Updated);

        assert_eq!(repo.price_count().unwrap(), 1);
        let stored = repo.price_on("cvx", price(1, 0.0).date).unwrap().unwrap();
        assert_eq!(stored, price(1, 11.0));
    }

    #[test]
    fn duplicate_insert_is_a_constraint_error() {
        let repo = repo();
        let t = repo.get_or_create_ticker("cvx").unwrap();
        repo.upsert_price(t, &price(2, 10.0)).unwrap();

        let err = repo
            .conn
            .execute(
                "INSERT INTO price_history (ticker_id, date, open, high, low, close, volume) VALUES (?, ?, 1, 1, 1, 1, 1)",
                params![t, price(2, 0.0).date],
            )
            .map_err(constraint("price_history"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StorageError>(),
            Some(StorageError::Constraint { table: "price_history", .. })
        ));
    }

    #[test]
    fn uncommitted_batch_rolls_back() {
        let repo = repo();
        {
            let _tx = repo.transaction().unwrap();
            repo.get_or_create_ticker("cvx").unwrap();
        }
        assert_eq!(repo.ticker_count().unwrap(), 0);
    }

    #[test]
    fn scrape_run_log_round_trip() {
        let repo = repo();
        let id = repo.begin_scrape_run("all").unwrap();
        let counts = RunCounts {
            tickers_processed: 2,
            units_succeeded: 5,
            units_failed: 1,
            rows_inserted: 8,
            rows_updated: 3,
            rows_skipped: 2,
            rows_failed: 1,
        };
        repo.finish_scrape_run(id, &counts, None).unwrap();

        let (status, stored, error) = repo.scrape_run(id).unwrap();
        assert_eq!(status, "success");
        assert_eq!(stored, counts);
        assert_eq!(error, None);

        let failed = repo.begin_scrape_run("trade").unwrap();
        assert_ne!(failed, id);
        repo.finish_scrape_run(failed, &RunCounts::default(), Some("disk full")).unwrap();
        let (status, _, error) = repo.scrape_run(failed).unwrap();
        assert_eq!(status, "error");
        assert_eq!(error.as_deref(), Some("disk full"));
    }

    #[test]
    fn lookup_failure_names_the_table() {
        let repo = repo();
        repo.execute_batch("DROP TABLE trade").unwrap();
        let t = repo.get_or_create_ticker("cvx").unwrap();
        let trade = TradeRecord {
            insider: Insider { code: 1, name: "DOE JANE".into() },
            transaction_type: "Sale".into(),
            last_date: price(1, 0.0).date,
            last_price: 1.0,
            shares_traded: 1,
            shares_held: 1,
        };

        let err = repo.upsert_trade(t, 1, 1, &trade).unwrap_err();
        assert!(format!("{err:#}").contains("trade lookup"), "{err:#}");
    }
}
