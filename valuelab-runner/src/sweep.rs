//! Parameter sweeps over `top_n` and rebalance frequency.
//!
//! Data is loaded once; every grid point runs on the same shared
//! `Arc<PriceTable>` and the same score snapshot, in parallel with Rayon.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use valuelab_core::engine::{RebalanceFrequency, StatsRecord};
use valuelab_core::valuation::ScoreMap;

use crate::config::RunConfig;
use crate::data_loader::LoadedData;
use crate::runner::{run_with_scores, scorer_for, BacktestReport, RunError};

/// Parameter grid specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    pub top_ns: Vec<usize>,
    pub rebalances: Vec<RebalanceFrequency>,
}

impl Default for ParamGrid {
    /// top_n 1..=10 under both frequencies.
    fn default() -> Self {
        Self {
            top_ns: (1..=10).collect(),
            rebalances: vec![RebalanceFrequency::Monthly, RebalanceFrequency::Quarterly],
        }
    }
}

impl ParamGrid {
    pub fn size(&self) -> usize {
        self.top_ns.len() * self.rebalances.len()
    }

    /// One config per grid point, everything else copied from `base`.
    pub fn generate_configs(&self, base: &RunConfig) -> Vec<RunConfig> {
        let mut configs = Vec::with_capacity(self.size());
        for &rebalance in &self.rebalances {
            for &top_n in &self.top_ns {
                let mut config = base.clone();
                config.strategy.top_n = top_n;
                config.strategy.rebalance = rebalance;
                configs.push(config);
            }
        }
        configs
    }
}

/// One row of a sweep: the varied parameters and the resulting stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepEntry {
    pub run_id: String,
    pub top_n: usize,
    pub rebalance: RebalanceFrequency,
    pub stats: StatsRecord,
}

impl SweepEntry {
    fn from_report(report: &BacktestReport) -> Self {
        Self {
            run_id: report.run_id.clone(),
            top_n: report.config.strategy.top_n,
            rebalance: report.config.strategy.rebalance,
            stats: report.output.stats.clone(),
        }
    }
}

/// Executes every grid point against pre-loaded data.
///
/// All configs are validated up front; one invalid point fails the sweep
/// before anything runs.
pub fn run_sweep(
    grid: &ParamGrid,
    base: &RunConfig,
    data: &LoadedData,
    parallel: bool,
) -> Result<SweepResults, RunError> {
    let configs = grid.generate_configs(&base.pinned());
    for config in &configs {
        config.validate()?;
    }

    let scores = ScoreMap::from_latest(&data.table, &scorer_for(base));
    let run = |config: &RunConfig| run_with_scores(config, data, scores.clone());

    let reports: Vec<BacktestReport> = if parallel {
        configs.par_iter().map(run).collect::<Result<Vec<_>, _>>()?
    } else {
        configs.iter().map(run).collect::<Result<Vec<_>, _>>()?
    };

    info!(runs = reports.len(), "sweep complete");
    Ok(SweepResults::new(reports))
}

/// Results from a sweep, in grid order.
#[derive(Debug)]
pub struct SweepResults {
    reports: Vec<BacktestReport>,
    by_run_id: HashMap<String, usize>,
}

impl SweepResults {
    fn new(reports: Vec<BacktestReport>) -> Self {
        let by_run_id = reports
            .iter()
            .enumerate()
            .map(|(i, r)| (r.run_id.clone(), i))
            .collect();
        Self { reports, by_run_id }
    }

    pub fn all(&self) -> &[BacktestReport] {
        &self.reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn get(&self, run_id: &str) -> Option<&BacktestReport> {
        self.by_run_id.get(run_id).map(|&i| &self.reports[i])
    }

    pub fn entries(&self) -> Vec<SweepEntry> {
        self.reports.iter().map(SweepEntry::from_report).collect()
    }

    /// Sorted by Sharpe, descending. Runs without a Sharpe sort last.
    pub fn sorted_by_sharpe(&self) -> Vec<&BacktestReport> {
        let mut sorted: Vec<&BacktestReport> = self.reports.iter().collect();
        sorted.sort_by(|a, b| {
            let key = |r: &BacktestReport| r.output.stats.sharpe.unwrap_or(f64::NEG_INFINITY);
            key(b).total_cmp(&key(a))
        });
        sorted
    }

    pub fn best(&self) -> Option<&BacktestReport> {
        self.sorted_by_sharpe()
            .into_iter()
            .find(|r| r.output.stats.sharpe.is_some())
    }
}
