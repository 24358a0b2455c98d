//! Raw text row → domain record normalisation.

use crate::error::ParseError;
use crate::models::{Insider, PriceRecord, RawRow, TradeRecord};
use chrono::NaiveDate;

const SOURCE_DATE: &str = "%m/%d/%Y";

// ── Number format ─────────────────────────────────────────────────────────────

/// Locale-style separators for decimal parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberFormat {
    pub group_separator: char,
    pub decimal_separator: char,
}

impl NumberFormat {
    pub const EN_US: NumberFormat = NumberFormat {
        group_separator: ',',
        decimal_separator: '.',
    };

    /// "1,234.56" → 1234.56 (en_US). Grouping separators are dropped, the
    /// decimal separator becomes '.', anything else non-numeric is an error.
    pub fn parse_decimal(&self, s: &str) -> Result<f64, ParseError> {
        let s = s.trim();
        let mut normalised = String::with_capacity(s.len());
        for c in s.chars() {
            if c == self.group_separator {
                continue;
            } else if c == self.decimal_separator {
                normalised.push('.');
            } else if c.is_ascii_digit() || c == '-' || c == '+' {
                normalised.push(c);
            } else {
                return Err(ParseError::Number(s.to_string()));
            }
        }
        normalised
            .parse()
            .map_err(|_| ParseError::Number(s.to_string()))
    }

    /// Decimal parse truncated toward zero.
    pub fn parse_integer(&self, s: &str) -> Result<i64, ParseError> {
        Ok(self.parse_decimal(s)?.trunc() as i64)
    }
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self::EN_US
    }
}

// ── Field parsers ─────────────────────────────────────────────────────────────

/// A row with every cell blank is table padding.
pub fn is_padding(row: &RawRow) -> bool {
    row.iter().all(|c| c.trim().is_empty())
}

/// Same-day rows show a clock time ("09:15") instead of a date.
fn is_time_of_day(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() >= 5
        && b[0].is_ascii_digit()
        && b[1].is_ascii_digit()
        && b[2] == b':'
        && b[3].is_ascii_digit()
        && b[4].is_ascii_digit()
}

/// "03/01/2018" → 2018-03-01
pub fn parse_source_date(s: &str) -> Result<NaiveDate, ParseError> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, SOURCE_DATE).map_err(|_| ParseError::Date(s.to_string()))
}

/// "09:15" → `today`, otherwise month/day/year.
pub fn resolve_date(s: &str, today: NaiveDate) -> Result<NaiveDate, ParseError> {
    if is_time_of_day(s.trim()) {
        Ok(today)
    } else {
        parse_source_date(s)
    }
}

/// "wirth-michael-k-1046788" → 1046788
pub fn insider_code(identifier: &str) -> Result<i64, ParseError> {
    identifier
        .trim()
        .trim_end_matches(['/', '-'])
        .rsplit(['/', '-'])
        .next()
        .and_then(|seg| seg.parse::<i64>().ok())
        .ok_or_else(|| ParseError::InsiderCode(identifier.to_string()))
}

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, ParseError> {
    let value = value.trim();
    if value.is_empty() {
        Err(ParseError::Empty(field))
    } else {
        Ok(value)
    }
}

fn check_width(row: &RawRow, expected: usize) -> Result<(), ParseError> {
    if row.len() < expected {
        return Err(ParseError::Columns { expected, found: row.len() });
    }
    Ok(())
}

// ── Price rows ────────────────────────────────────────────────────────────────

const PRICE_COLUMNS: usize = 6;

/// `[date, open, high, low, close, volume]` → PriceRecord
pub fn price_row(
    row: &RawRow,
    today: NaiveDate,
    numbers: &NumberFormat,
) -> Result<PriceRecord, ParseError> {
    check_width(row, PRICE_COLUMNS)?;
    Ok(PriceRecord {
        date: resolve_date(&row[0], today)?,
        open: numbers.parse_decimal(required(&row[1], "open")?)?,
        high: numbers.parse_decimal(required(&row[2], "high")?)?,
        low: numbers.parse_decimal(required(&row[3], "low")?)?,
        close: numbers.parse_decimal(required(&row[4], "close")?)?,
        volume: numbers.parse_integer(required(&row[5], "volume")?)?,
    })
}

// ── Trade rows ────────────────────────────────────────────────────────────────

mod trade_col {
    pub const CODE: usize = 0;
    pub const INSIDER: usize = 1;
    pub const LAST_PRICE: usize = 2;
    // 3: relation (ignored)
    pub const LAST_DATE: usize = 4;
    pub const TRANSACTION_TYPE: usize = 5;
    // 6: owner type (ignored)
    pub const SHARES_TRADED: usize = 7;
    pub const SHARES_HELD: usize = 8;
    pub const WIDTH: usize = 9;
}

/// Source-layout trade row → TradeRecord
pub fn trade_row(row: &RawRow, numbers: &NumberFormat) -> Result<TradeRecord, ParseError> {
    use trade_col::*;
    check_width(row, WIDTH)?;

    let last_price = match row[LAST_PRICE].trim() {
        "" => "0.0",
        price => price,
    };

    Ok(TradeRecord {
        insider: Insider {
            code: insider_code(&row[CODE])?,
            name: required(&row[INSIDER], "insider")?.to_string(),
        },
        transaction_type: required(&row[TRANSACTION_TYPE], "transaction type")?.to_string(),
        last_date: parse_source_date(&row[LAST_DATE])?,
        last_price: numbers.parse_decimal(last_price)?,
        shares_traded: numbers.parse_integer(required(&row[SHARES_TRADED], "shares traded")?)?,
        shares_held: numbers.parse_integer(required(&row[SHARES_HELD], "shares held")?)?,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> RawRow {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_decimal_en_us() {
        let n = NumberFormat::EN_US;
        assert_eq!(n.parse_integer("1,234,567"), Ok(1_234_567));
        assert_eq!(n.parse_decimal("1,234.5"), Ok(1234.5));
        assert_eq!(n.parse_decimal(" 114.25 "), Ok(114.25));
        assert!(matches!(n.parse_decimal("12abc"), Err(ParseError::Number(_))));
        assert!(n.parse_decimal("").is_err());
    }

    #[test]
    fn test_parse_decimal_other_locale() {
        let de = NumberFormat { group_separator: '.', decimal_separator: ',' };
        assert_eq!(de.parse_decimal("1.234,5"), Ok(1234.5));
    }

    #[test]
    fn test_resolve_date() {
        let today = day(2024, 6, 3);
        assert_eq!(resolve_date("09:15", today), Ok(today));
        assert_eq!(resolve_date("03/01/2018", today), Ok(day(2018, 3, 1)));
        assert!(matches!(resolve_date("2018-03-01", today), Err(ParseError::Date(_))));
    }

    #[test]
    fn test_insider_code() {
        assert_eq!(insider_code("wirth-michael-k-1046788"), Ok(1_046_788));
        assert_eq!(insider_code("insiders/cook-timothy/1214156"), Ok(1_214_156));
        assert!(insider_code("no-code-here").is_err());
        assert!(insider_code("").is_err());
    }

    #[test]
    fn test_padding() {
        assert!(is_padding(&row(&["", " ", ""])));
        assert!(is_padding(&row(&[])));
        assert!(!is_padding(&row(&["", "x"])));
    }

    #[test]
    fn test_price_row() {
        let today = day(2024, 6, 3);
        let rec = price_row(
            &row(&["03/01/2018", "99.0", "100.0", "98.5", "99.5", "1,234,567"]),
            today,
            &NumberFormat::EN_US,
        )
        .unwrap();
        assert_eq!(rec.date, day(2018, 3, 1));
        assert_eq!(rec.close, 99.5);
        assert_eq!(rec.volume, 1_234_567);

        let short = price_row(&row(&["03/01/2018", "1"]), today, &NumberFormat::EN_US);
        assert_eq!(short, Err(ParseError::Columns { expected: 6, found: 2 }));
    }

    #[test]
    fn test_trade_row_defaults_empty_price() {
        let rec = trade_row(
            &row(&[
                "wirth-michael-k-1046788",
                "WIRTH MICHAEL K",
                "",
                "Chairman",
                "03/01/2018",
                "Automatic Sell",
                "Direct",
                "25,000",
                "120,000",
            ]),
            &NumberFormat::EN_US,
        )
        .unwrap();
        assert_eq!(rec.last_price, 0.0);
        assert_eq!(rec.insider, Insider { code: 1_046_788, name: "WIRTH MICHAEL K".into() });
        assert_eq!(rec.transaction_type, "Automatic Sell");
        assert_eq!(rec.shares_traded, 25_000);
        assert_eq!(rec.shares_held, 120_000);
    }
}
