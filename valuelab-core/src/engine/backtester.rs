//! End-to-end engine: schedule, select, project, compound, summarise.
//!
//! Deterministic: identical inputs produce identical outputs. The only
//! failure is a precondition one (empty table, bad parameters); every
//! numeric edge case inside the run degrades to a 0 return or `None` stat.

use super::holdings::project_holdings;
use super::returns::{benchmark_returns, cumulative, daily_returns, drawdowns, portfolio_returns};
use super::schedule::{rebalance_dates, RebalanceAnchor, RebalanceFrequency};
use super::selection::selections_at;
use super::stats::StatsRecord;
use super::EngineError;
use crate::data::PriceTable;
use crate::valuation::ScoreMap;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const MAX_TOP_N: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestParams {
    pub top_n: usize,
    pub rebalance: RebalanceFrequency,
    #[serde(default)]
    pub anchor: RebalanceAnchor,
    pub risk_free_annual: f64,
}

impl Default for BacktestParams {
    fn default() -> Self {
        Self {
            top_n: 5,
            rebalance: RebalanceFrequency::Monthly,
            anchor: RebalanceAnchor::PeriodStart,
            risk_free_annual: 0.04,
        }
    }
}

impl BacktestParams {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.top_n == 0 || self.top_n > MAX_TOP_N {
            return Err(EngineError::InvalidTopN {
                top_n: self.top_n,
                max: MAX_TOP_N,
            });
        }
        if !self.risk_free_annual.is_finite() {
            return Err(EngineError::NonFiniteRiskFree(self.risk_free_annual));
        }
        Ok(())
    }
}

/// One row of the per-day output table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub portfolio_return: f64,
    pub benchmark_return: f64,
    pub cum_portfolio: f64,
    pub cum_benchmark: f64,
    pub holdings: Vec<String>,
    pub portfolio_drawdown: f64,
    pub benchmark_drawdown: f64,
}

/// A resolved rebalance date and the basket picked on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceEvent {
    pub date: NaiveDate,
    pub selection: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestOutput {
    pub daily: Vec<DailyRecord>,
    pub stats: StatsRecord,
    pub benchmark_stats: StatsRecord,
    pub rebalances: Vec<RebalanceEvent>,
}

impl BacktestOutput {
    /// Holdings on the last trading day.
    pub fn last_holdings(&self) -> &[String] {
        self.daily.last().map_or(&[], |r| r.holdings.as_slice())
    }
}

/// Run the engine on a price table and a static score snapshot.
pub fn backtest(
    table: &PriceTable,
    scores: &ScoreMap,
    params: &BacktestParams,
) -> Result<BacktestOutput, EngineError> {
    params.validate()?;
    if table.is_empty() || table.tickers().is_empty() {
        return Err(EngineError::EmptyPriceTable);
    }

    let dates = table.dates();
    let schedule = rebalance_dates(dates, params.rebalance, params.anchor);
    let selections = selections_at(table, &schedule, scores, params.top_n);
    for (date, picks) in &selections {
        debug!(%date, ?picks, "rebalance");
    }

    let holdings = project_holdings(dates, &selections);
    let ticker_returns = daily_returns(table);
    let portfolio = portfolio_returns(table, &ticker_returns, &holdings);
    let benchmark = benchmark_returns(&ticker_returns, table.len());

    let cum_portfolio = cumulative(&portfolio);
    let cum_benchmark = cumulative(&benchmark);
    let dd_portfolio = drawdowns(&cum_portfolio);
    let dd_benchmark = drawdowns(&cum_benchmark);

    let stats = StatsRecord::compute(
        &portfolio,
        &cum_portfolio,
        &dd_portfolio,
        params.risk_free_annual,
    );
    let benchmark_stats = StatsRecord::compute(
        &benchmark,
        &cum_benchmark,
        &dd_benchmark,
        params.risk_free_annual,
    );

    let daily = holdings
        .into_iter()
        .enumerate()
        .map(|(i, held)| DailyRecord {
            date: dates[i],
            portfolio_return: portfolio[i],
            benchmark_return: benchmark[i],
            cum_portfolio: cum_portfolio[i],
            cum_benchmark: cum_benchmark[i],
            holdings: held,
            portfolio_drawdown: dd_portfolio[i],
            benchmark_drawdown: dd_benchmark[i],
        })
        .collect();

    let rebalances = selections
        .into_iter()
        .map(|(date, selection)| RebalanceEvent { date, selection })
        .collect::<Vec<_>>();

    info!(
        days = table.len(),
        tickers = table.tickers().len(),
        rebalances = rebalances.len(),
        final_cum = ?stats.final_cum_return,
        "backtest complete"
    );

    Ok(BacktestOutput {
        daily,
        stats,
        benchmark_stats,
        rebalances,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn params(top_n: usize) -> BacktestParams {
        BacktestParams {
            top_n,
            rebalance: RebalanceFrequency::Monthly,
            anchor: RebalanceAnchor::PeriodStart,
            risk_free_annual: 0.0,
        }
    }

    fn scores(pairs: &[(&str, f64)]) -> ScoreMap {
        pairs.iter().map(|(t, s)| (t.to_string(), *s)).collect()
    }

    #[test]
    fn doubling_and_flat_average_to_half() {
        let table = PriceTable::from_columns(
            vec![d(1, 1), d(1, 2)],
            vec!["A".into(), "B".into()],
            vec![vec![Some(1.0), Some(2.0)], vec![Some(5.0), Some(5.0)]],
        )
        .unwrap();
        let out = backtest(&table, &scores(&[("A", 0.0), ("B", 0.1)]), &params(2)).unwrap();

        assert_eq!(out.daily[0].holdings, vec!["A", "B"]);
        assert_eq!(out.daily[1].portfolio_return, 0.5);
        assert_eq!(out.daily[1].benchmark_return, 0.5);
        assert_eq!(out.stats.final_cum_return, Some(1.5));
    }

    #[test]
    fn no_candidates_means_flat_portfolio_and_no_sharpe() {
        let table = PriceTable::from_columns(
            vec![d(1, 1), d(1, 2), d(1, 3)],
            vec!["A".into()],
            vec![vec![Some(1.0), Some(1.2), Some(0.9)]],
        )
        .unwrap();
        let out = backtest(&table, &ScoreMap::default(), &params(3)).unwrap();

        assert!(out.daily.iter().all(|r| r.holdings.is_empty()));
        assert!(out.daily.iter().all(|r| r.portfolio_return == 0.0));
        assert_eq!(out.stats.annual_vol, Some(0.0));
        assert_eq!(out.stats.sharpe, None);
        assert_eq!(out.stats.final_cum_return, Some(1.0));
        assert!(out.benchmark_stats.sharpe.is_some());
    }

    #[test]
    fn invalid_params_rejected_before_running() {
        let table = PriceTable::from_columns(
            vec![d(1, 1)],
            vec!["A".into()],
            vec![vec![Some(1.0)]],
        )
        .unwrap();
        let s = ScoreMap::default();
        assert!(matches!(
            backtest(&table, &s, &params(0)),
            Err(EngineError::InvalidTopN { top_n: 0, .. })
        ));
        assert!(matches!(
            backtest(&table, &s, &params(21)),
            Err(EngineError::InvalidTopN { .. })
        ));
        let mut p = params(1);
        p.risk_free_annual = f64::NAN;
        assert!(matches!(
            backtest(&table, &s, &p),
            Err(EngineError::NonFiniteRiskFree(_))
        ));
    }

    #[test]
    fn rebalance_log_matches_holdings_changes() {
        let dates: Vec<NaiveDate> = (1..=28)
            .map(|day| d(1, day))
            .chain((1..=28).map(|day| d(2, day)))
            .collect();
        let n = dates.len();
        let a: Vec<Option<f64>> = (0..n).map(|i| Some(100.0 + i as f64)).collect();
        // B lists mid-January, so only the February rebalance can pick it.
        let b: Vec<Option<f64>> = (0..n).map(|i| (i >= 10).then_some(50.0)).collect();
        let table =
            PriceTable::from_columns(dates, vec!["A".into(), "B".into()], vec![a, b]).unwrap();

        let out = backtest(&table, &scores(&[("A", 0.2), ("B", -0.3)]), &params(1)).unwrap();
        assert_eq!(
            out.rebalances,
            vec![
                RebalanceEvent {
                    date: d(1, 1),
                    selection: vec!["A".into()],
                },
                RebalanceEvent {
                    date: d(2, 1),
                    selection: vec!["B".into()],
                },
            ]
        );
        for row in &out.daily {
            let expected = if row.date.month() == 1 { "A" } else { "B" };
            assert_eq!(row.holdings, vec![expected]);
        }
        assert_eq!(out.last_holdings(), &["B".to_string()]);
    }
}
