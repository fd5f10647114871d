//! CSV exports: the per-day table, score snapshot, rebalance log and sweeps.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use valuelab_core::engine::{DailyRecord, RebalanceEvent};
use valuelab_core::valuation::ScoreMap;

use crate::sweep::SweepEntry;

/// Separator for ticker lists inside one CSV cell.
pub const HOLDINGS_SEPARATOR: &str = "|";

fn write_rows<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("Failed to write row to {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    Ok(())
}

#[derive(Serialize)]
struct DailyRow {
    date: String,
    portfolio_return: f64,
    benchmark_return: f64,
    cum_portfolio: f64,
    cum_benchmark: f64,
    holdings: String,
    portfolio_drawdown: f64,
    benchmark_drawdown: f64,
}

pub fn write_daily_csv(path: &Path, daily: &[DailyRecord]) -> Result<()> {
    write_rows(
        path,
        daily.iter().map(|r| DailyRow {
            date: r.date.to_string(),
            portfolio_return: r.portfolio_return,
            benchmark_return: r.benchmark_return,
            cum_portfolio: r.cum_portfolio,
            cum_benchmark: r.cum_benchmark,
            holdings: r.holdings.join(HOLDINGS_SEPARATOR),
            portfolio_drawdown: r.portfolio_drawdown,
            benchmark_drawdown: r.benchmark_drawdown,
        }),
    )
}

#[derive(Serialize)]
struct ScoreRow<'a> {
    rank: usize,
    ticker: &'a str,
    score: Option<f64>,
    dcf_value: f64,
    comparables_estimate: Option<f64>,
}

/// Most undervalued first; unscored tickers last with an empty score.
pub fn write_scores_csv(path: &Path, scores: &ScoreMap) -> Result<()> {
    write_rows(
        path,
        scores
            .ranked()
            .into_iter()
            .enumerate()
            .map(|(i, (ticker, v))| ScoreRow {
                rank: i + 1,
                ticker,
                score: v.score.value(),
                dcf_value: v.dcf_value,
                comparables_estimate: v.comparables_estimate,
            }),
    )
}

#[derive(Serialize)]
struct RebalanceRow {
    date: String,
    count: usize,
    selection: String,
}

pub fn write_rebalances_csv(path: &Path, rebalances: &[RebalanceEvent]) -> Result<()> {
    write_rows(
        path,
        rebalances.iter().map(|r| RebalanceRow {
            date: r.date.to_string(),
            count: r.selection.len(),
            selection: r.selection.join(HOLDINGS_SEPARATOR),
        }),
    )
}

#[derive(Serialize)]
struct SweepRow<'a> {
    run_id: &'a str,
    top_n: usize,
    rebalance: String,
    annual_return: Option<f64>,
    annual_vol: Option<f64>,
    sharpe: Option<f64>,
    max_drawdown: Option<f64>,
    final_cum_return: Option<f64>,
}

pub fn write_sweep_csv(path: &Path, entries: &[SweepEntry]) -> Result<()> {
    write_rows(
        path,
        entries.iter().map(|e| SweepRow {
            run_id: &e.run_id,
            top_n: e.top_n,
            rebalance: e.rebalance.to_string(),
            annual_return: e.stats.annual_return,
            annual_vol: e.stats.annual_vol,
            sharpe: e.stats.sharpe,
            max_drawdown: e.stats.max_drawdown,
            final_cum_return: e.stats.final_cum_return,
        }),
    )
}
