//! Wide price table: trading dates x tickers.
//!
//! Built once from per-symbol series, then immutable for the whole run.
//! Construction sorts dates, forward-fills each ticker from its first
//! observation and drops tickers that never had a price. Leading gaps stay
//! empty; nothing before a ticker's first observation is back-filled.

use super::provider::{DataError, PricePoint};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    dates: Vec<NaiveDate>,
    tickers: Vec<String>,
    /// One column per ticker, each `dates.len()` long.
    columns: Vec<Vec<Option<f64>>>,
}

impl PriceTable {
    /// Align per-symbol series on the union of their dates.
    ///
    /// Ticker order follows the input order; a symbol listed twice is merged,
    /// later points overriding earlier ones on the same date. Returns
    /// `DataError::NoUsableData` when no ticker has a single price.
    pub fn from_series<I>(series: I) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = (String, Vec<PricePoint>)>,
    {
        let mut order: Vec<String> = Vec::new();
        let mut by_symbol: HashMap<String, BTreeMap<NaiveDate, Option<f64>>> = HashMap::new();

        for (symbol, points) in series {
            let observed = by_symbol.entry(symbol.clone()).or_insert_with(|| {
                order.push(symbol.clone());
                BTreeMap::new()
            });
            for point in points {
                observed.insert(point.date, point.value());
            }
        }

        let all_dates: BTreeSet<NaiveDate> = by_symbol
            .values()
            .flat_map(|observed| observed.keys().copied())
            .collect();
        let dates: Vec<NaiveDate> = all_dates.into_iter().collect();

        let columns = order
            .iter()
            .map(|symbol| {
                let observed = &by_symbol[symbol];
                dates
                    .iter()
                    .map(|d| observed.get(d).copied().flatten())
                    .collect()
            })
            .collect();

        Self::from_columns(dates, order, columns)
    }

    /// Build from already-aligned columns (one per ticker, same length as `dates`).
    ///
    /// Dates need not be sorted; duplicate dates keep the later row's
    /// non-missing values.
    pub fn from_columns(
        dates: Vec<NaiveDate>,
        tickers: Vec<String>,
        columns: Vec<Vec<Option<f64>>>,
    ) -> Result<Self, DataError> {
        if tickers.len() != columns.len() {
            return Err(DataError::ValidationError(format!(
                "{} tickers but {} columns",
                tickers.len(),
                columns.len()
            )));
        }
        if let Some((t, col)) = tickers
            .iter()
            .zip(&columns)
            .find(|(_, col)| col.len() != dates.len())
        {
            return Err(DataError::ValidationError(format!(
                "column '{t}' has {} rows, expected {}",
                col.len(),
                dates.len()
            )));
        }

        // Sort rows by date, merging duplicates.
        let mut row_of: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
        for (i, d) in dates.iter().enumerate() {
            row_of.entry(*d).or_default().push(i);
        }
        let sorted_dates: Vec<NaiveDate> = row_of.keys().copied().collect();

        let mut kept_tickers = Vec::with_capacity(tickers.len());
        let mut kept_columns = Vec::with_capacity(columns.len());

        for (ticker, raw) in tickers.into_iter().zip(columns) {
            let mut column: Vec<Option<f64>> = row_of
                .values()
                .map(|rows| {
                    rows.iter()
                        .rev()
                        .find_map(|&r| raw[r].filter(|v| v.is_finite()))
                })
                .collect();

            forward_fill(&mut column);

            if column.iter().all(Option::is_none) {
                debug!(ticker = %ticker, "dropping ticker with no observed prices");
                continue;
            }
            kept_tickers.push(ticker);
            kept_columns.push(column);
        }

        if kept_tickers.is_empty() || sorted_dates.is_empty() {
            return Err(DataError::NoUsableData);
        }

        Ok(Self {
            dates: sorted_dates,
            tickers: kept_tickers,
            columns: kept_columns,
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    /// Number of trading dates.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn ticker_index(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }

    pub fn column(&self, ticker: &str) -> Option<&[Option<f64>]> {
        self.ticker_index(ticker).map(|i| self.columns[i].as_slice())
    }

    /// Price of ticker `ticker_idx` on row `date_idx`, if observed or filled.
    pub fn price(&self, ticker_idx: usize, date_idx: usize) -> Option<f64> {
        self.columns
            .get(ticker_idx)
            .and_then(|col| col.get(date_idx).copied().flatten())
    }

    /// Tickers with a price on the given row, in table order.
    pub fn available_at(&self, date_idx: usize) -> impl Iterator<Item = &str> + '_ {
        self.tickers
            .iter()
            .zip(&self.columns)
            .filter(move |(_, col)| matches!(col.get(date_idx), Some(Some(_))))
            .map(|(t, _)| t.as_str())
    }

    /// Last row of the table: each ticker's latest known price.
    pub fn latest_prices(&self) -> Vec<(&str, Option<f64>)> {
        let last = self.dates.len().saturating_sub(1);
        self.tickers
            .iter()
            .enumerate()
            .map(|(i, t)| (t.as_str(), self.price(i, last)))
            .collect()
    }

    /// Exact row lookup.
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    /// Row of the last trading date at or before `date` ("pad" lookup).
    pub fn index_at_or_before(&self, date: NaiveDate) -> Option<usize> {
        self.dates.partition_point(|d| *d <= date).checked_sub(1)
    }

    /// BLAKE3 digest over dates, tickers and values, for run provenance.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for d in &self.dates {
            hasher.update(d.to_string().as_bytes());
        }
        for (ticker, col) in self.tickers.iter().zip(&self.columns) {
            hasher.update(ticker.as_bytes());
            for v in col {
                match v {
                    Some(p) => hasher.update(&p.to_le_bytes()),
                    None => hasher.update(b"-"),
                };
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}

fn forward_fill(column: &mut [Option<f64>]) {
    let mut last = None;
    for slot in column.iter_mut() {
        match slot {
            Some(v) => last = Some(*v),
            None => *slot = last,
        }
    }
}
