//! Daily return series, compounding and drawdowns.

use crate::data::PriceTable;

/// Per-ticker simple returns, one `Vec` per table column.
///
/// The first row is 0. A return that cannot be computed (missing price on
/// either day, zero prior price) is 0 rather than a gap.
pub fn daily_returns(table: &PriceTable) -> Vec<Vec<f64>> {
    (0..table.tickers().len())
        .map(|t| {
            (0..table.len())
                .map(|i| {
                    if i == 0 {
                        return 0.0;
                    }
                    match (table.price(t, i - 1), table.price(t, i)) {
                        (Some(prev), Some(cur)) => sanitize(cur / prev - 1.0),
                        _ => 0.0,
                    }
                })
                .collect()
        })
        .collect()
}

fn sanitize(r: f64) -> f64 {
    if r.is_finite() {
        r
    } else {
        0.0
    }
}

/// Equal-weight return of `holdings` on each day; 0 on days with none.
///
/// Holdings not present in the table are ignored.
pub fn portfolio_returns(
    table: &PriceTable,
    returns: &[Vec<f64>],
    holdings: &[Vec<String>],
) -> Vec<f64> {
    holdings
        .iter()
        .enumerate()
        .map(|(i, held)| {
            let picked: Vec<f64> = held
                .iter()
                .filter_map(|ticker| table.ticker_index(ticker))
                .map(|t| returns[t][i])
                .collect();
            if picked.is_empty() {
                0.0
            } else {
                picked.iter().sum::<f64>() / picked.len() as f64
            }
        })
        .collect()
}

/// Equal-weight return across every ticker in the table, gaps counted as 0.
pub fn benchmark_returns(returns: &[Vec<f64>], len: usize) -> Vec<f64> {
    if returns.is_empty() {
        return vec![0.0; len];
    }
    let n = returns.len() as f64;
    (0..len)
        .map(|i| returns.iter().map(|col| col[i]).sum::<f64>() / n)
        .collect()
}

/// Running product of `1 + r`.
pub fn cumulative(returns: &[f64]) -> Vec<f64> {
    returns
        .iter()
        .scan(1.0_f64, |acc, r| {
            *acc *= 1.0 + r;
            Some(*acc)
        })
        .collect()
}

/// Fractional distance below the running peak: `(cum - peak) / peak`.
pub fn drawdowns(cumulative: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    cumulative
        .iter()
        .map(|&c| {
            peak = peak.max(c);
            if peak > 0.0 {
                (c - peak) / peak
            } else {
                0.0
            }
        })
        .collect()
}
