//! Basket selection at a rebalance date.

use crate::data::PriceTable;
use crate::valuation::ScoreMap;
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// The `top_n` lowest-scored tickers that have a price at `date_idx`.
///
/// Unscored tickers are never picked. Ties keep table column order.
/// Fewer than `top_n` candidates yields all of them.
pub fn select_top_n(
    table: &PriceTable,
    date_idx: usize,
    scores: &ScoreMap,
    top_n: usize,
) -> Vec<String> {
    let mut candidates: Vec<(&str, f64)> = table
        .available_at(date_idx)
        .filter_map(|ticker| scores.score_of(ticker).map(|s| (ticker, s)))
        .collect();
    // sort_by is stable.
    candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
    candidates
        .into_iter()
        .take(top_n)
        .map(|(ticker, _)| ticker.to_string())
        .collect()
}

/// Selection for each rebalance date. Dates not in the table are ignored.
pub fn selections_at(
    table: &PriceTable,
    rebalance_dates: &[NaiveDate],
    scores: &ScoreMap,
    top_n: usize,
) -> BTreeMap<NaiveDate, Vec<String>> {
    rebalance_dates
        .iter()
        .filter_map(|date| {
            let idx = table.index_of(*date)?;
            Some((*date, select_top_n(table, idx, scores, top_n)))
        })
        .collect()
}
