use crate::error::FetchError;
use crate::models::RawRow;
use ::scraper::{ElementRef, Html, Selector};
use url::Url;

// ── Selectors ─────────────────────────────────────────────────────────────────

const TABLES: &str = "table";
const PRICE_HEADER: &str = "thead th";
const PRICE_ROWS: &str = "tbody > tr";
const TRADE_ROWS: &str =
    "#content_main > div:nth-of-type(8) > div:nth-of-type(5) > table tr";
const LAST_PAGE_LINK: &str = "#quotes_content_left_lb_LastPage";
const INSIDER_HREF_PREFIX: &str = "insiders/";

/// Zero-based index of the "last price" cell in an insider trade row.
const LAST_PRICE_CELL: usize = 6;

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::Shape(format!("selector {css:?}: {e:?}")))
}

fn cell_text(td: &ElementRef<'_>) -> String {
    td.text().collect::<String>().replace("\r\n", "").trim().to_string()
}

// ── Price history page ────────────────────────────────────────────────────────

/// Rows of `[date, open, high, low, close, volume]`, padding rows included.
///
/// Only the table whose first header cell is "Date" is read; the parser adds a
/// `<tbody>` to every table, so layout tables would otherwise leak in.
pub fn parse_price_page(html: &str) -> Result<Vec<RawRow>, FetchError> {
    let doc = Html::parse_document(html);
    let table_sel = selector(TABLES)?;
    let header_sel = selector(PRICE_HEADER)?;
    let row_sel = selector(PRICE_ROWS)?;
    let td_sel = selector("td")?;

    let table = doc
        .select(&table_sel)
        .find(|table| {
            table
                .select(&header_sel)
                .next()
                .is_some_and(|th| cell_text(&th).to_ascii_lowercase().starts_with("date"))
        })
        .ok_or_else(|| FetchError::Shape("no price history table".into()))?;

    Ok(table
        .select(&row_sel)
        .map(|tr| tr.select(&td_sel).map(|td| cell_text(&td)).collect::<RawRow>())
        .collect())
}

// ── Insider trades page ───────────────────────────────────────────────────────

/// Rows in source column order:
/// `[insider_code, insider_name, last_price, relation, last_date, transaction_type,
///   owner_type, shares_traded, shares_held]`.
pub fn parse_trade_page(html: &str) -> Result<Vec<RawRow>, FetchError> {
    let doc = Html::parse_document(html);
    let row_sel = selector(TRADE_ROWS)?;
    let td_sel = selector("td")?;
    let a_sel = selector("a")?;

    let mut rows = Vec::new();
    for tr in doc.select(&row_sel) {
        let cells: Vec<ElementRef<'_>> = tr.select(&td_sel).collect();
        let link = cells.first().and_then(|td| td.select(&a_sel).next());

        let code = link
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| href.split_once(INSIDER_HREF_PREFIX))
            .map(|(_, rest)| rest.trim().to_string())
            .unwrap_or_default();
        let name = link
            .map(|a| a.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        let last_price = cells.get(LAST_PRICE_CELL).map(cell_text).unwrap_or_default();

        let mut row = vec![code, name, last_price];
        row.extend(
            cells
                .iter()
                .enumerate()
                .skip(1)
                .filter(|(i, _)| *i != LAST_PRICE_CELL)
                .map(|(_, td)| cell_text(td)),
        );
        rows.push(row);
    }
    Ok(rows)
}

/// Page number from the "last page" pager link, if the page has one.
pub fn parse_last_page(html: &str, page_url: &Url) -> Result<Option<u32>, FetchError> {
    let doc = Html::parse_document(html);
    let link_sel = selector(LAST_PAGE_LINK)?;

    let Some(href) = doc
        .select(&link_sel)
        .next()
        .and_then(|a| a.value().attr("href"))
    else {
        return Ok(None);
    };

    let target = page_url.join(href)?;
    Ok(target
        .query_pairs()
        .find(|(k, _)| k == "page")
        .and_then(|(_, v)| v.trim().parse::<u32>().ok())
        .filter(|&n| n > 0))
}
