//! Long-format CSV upload: `Date,Ticker,<value>` rows pivoted into a table.
//!
//! The value column is the first header matching `Adj Close`, `Close` or
//! `Price` (case-insensitive). Empty or unparsable values are missing
//! observations. A (date, ticker) pair appearing twice is rejected, as a
//! pivot cannot decide between the two rows.

use super::provider::{DataError, PricePoint};
use super::table::PriceTable;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

const VALUE_COLUMNS: [&str; 3] = ["adj close", "close", "price"];
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// Parse an uploaded CSV from any reader.
pub fn read_price_csv<R: Read>(reader: R) -> Result<PriceTable, DataError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| DataError::CsvFormat(format!("unreadable header row: {e}")))?
        .clone();
    let lowered: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();

    let find = |name: &str| lowered.iter().position(|h| h == name);
    let date_col =
        find("date").ok_or_else(|| DataError::CsvFormat("missing 'Date' column".into()))?;
    let ticker_col =
        find("ticker").ok_or_else(|| DataError::CsvFormat("missing 'Ticker' column".into()))?;
    let value_col = VALUE_COLUMNS.iter().find_map(|c| find(*c)).ok_or_else(|| {
        DataError::CsvFormat("CSV must contain one of: Adj Close, Close, or Price".into())
    })?;
    debug!(value_column = &headers[value_col], "selected CSV value column");

    // BTreeMap keeps tickers alphabetical, matching a pivot's column order.
    let mut by_ticker: BTreeMap<String, BTreeMap<NaiveDate, Option<f64>>> = BTreeMap::new();
    let mut rows = 0usize;

    for (line, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| DataError::CsvFormat(format!("row {}: {e}", line + 2)))?;
        let raw_date = record.get(date_col).unwrap_or_default();
        let date = parse_date(raw_date).ok_or_else(|| {
            DataError::CsvFormat(format!("row {}: invalid date '{raw_date}'", line + 2))
        })?;
        let ticker = record.get(ticker_col).unwrap_or_default();
        if ticker.is_empty() {
            return Err(DataError::CsvFormat(format!("row {}: empty ticker", line + 2)));
        }
        let value = record
            .get(value_col)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite());

        match by_ticker.entry(ticker.to_string()).or_default().entry(date) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(_) => {
                return Err(DataError::CsvFormat(format!(
                    "duplicate row for {ticker} on {date}"
                )));
            }
        }
        rows += 1;
    }

    info!(rows, tickers = by_ticker.len(), "parsed uploaded price CSV");

    let series = by_ticker.into_iter().map(|(ticker, observed)| {
        let points = observed
            .into_iter()
            .map(|(date, value)| PricePoint {
                date,
                close: value,
                adj_close: None,
            })
            .collect();
        (ticker, points)
    });

    PriceTable::from_series(series)
}

/// Parse an uploaded CSV from a file path.
pub fn load_price_csv(path: &Path) -> Result<PriceTable, DataError> {
    let file = std::fs::File::open(path)
        .map_err(|e| DataError::CsvFormat(format!("cannot open {}: {e}", path.display())))?;
    read_price_csv(file)
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}
