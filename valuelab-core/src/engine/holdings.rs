//! Forward-projection of rebalance selections onto every trading day.

use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Holdings for each date: the selection of the latest rebalance on or
/// before it, or empty before the first rebalance.
pub fn project_holdings(
    dates: &[NaiveDate],
    selections: &BTreeMap<NaiveDate, Vec<String>>,
) -> Vec<Vec<String>> {
    let mut pending = selections.iter().peekable();
    let mut current: &[String] = &[];

    dates
        .iter()
        .map(|date| {
            while let Some((_, picks)) = pending.next_if(|(r, _)| *r <= date) {
                current = picks.as_slice();
            }
            current.to_vec()
        })
        .collect()
}
