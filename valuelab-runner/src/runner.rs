//! Backtest runner: wires together loading, scoring, the engine and provenance.
//!
//! Two entry points:
//! - `run_backtest()`: validates, loads data, then runs. Used by the CLI.
//! - `run_with_data()`: takes pre-loaded data, no I/O. Used by sweeps.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use valuelab_core::data::{DataSource, DownloadProgress, ParquetCache, PriceMemo, PriceProvider};
use valuelab_core::engine::{backtest, BacktestOutput, EngineError};
use valuelab_core::valuation::{ProxyDcfScorer, ScoreMap};

use crate::config::{ConfigError, RunConfig, RunId};
use crate::data_loader::{load_for_config, LoadError, LoadedData};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Current schema version for persisted reports.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub timestamp: DateTime<Utc>,
    pub duration_secs: f64,
    pub trading_days: usize,
    pub tickers: Vec<String>,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

/// Everything a single run produced, plus how to reproduce it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub config: RunConfig,
    pub scores: ScoreMap,
    pub output: BacktestOutput,
    pub sources: BTreeMap<String, DataSource>,
    pub dataset_hash: String,
    pub has_synthetic: bool,
    pub metadata: RunMetadata,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// The scorer a config describes.
pub fn scorer_for(config: &RunConfig) -> ProxyDcfScorer {
    ProxyDcfScorer::new(config.valuation.params.clone(), config.peer_pes())
}

/// Validate, load and run. `end_date` is pinned first, so the report's
/// config and run ID are reproducible.
pub fn run_backtest(
    config: &RunConfig,
    cache: &ParquetCache,
    provider: Option<&dyn PriceProvider>,
    progress: Option<&dyn DownloadProgress>,
    memo: Option<&PriceMemo<LoadedData>>,
) -> Result<BacktestReport, RunError> {
    let config = config.pinned();
    config.validate()?;
    let data: Arc<LoadedData> = load_for_config(&config, cache, provider, progress, memo)?;
    run_with_data(&config, &data)
}

/// Score the latest prices and run the engine on already-loaded data.
pub fn run_with_data(config: &RunConfig, data: &LoadedData) -> Result<BacktestReport, RunError> {
    let scores = ScoreMap::from_latest(&data.table, &scorer_for(config));
    run_with_scores(config, data, scores)
}

/// Run with a precomputed score snapshot.
pub fn run_with_scores(
    config: &RunConfig,
    data: &LoadedData,
    scores: ScoreMap,
) -> Result<BacktestReport, RunError> {
    let started = Instant::now();
    let timestamp = Utc::now();
    let table = &data.table;

    let output = backtest(table, &scores, &config.backtest_params())?;
    let run_id = config.run_id();

    info!(
        run_id = %&run_id[..12],
        top_n = config.strategy.top_n,
        rebalance = %config.strategy.rebalance,
        synthetic = data.has_synthetic,
        "run finished"
    );

    Ok(BacktestReport {
        schema_version: SCHEMA_VERSION,
        run_id,
        config: config.clone(),
        scores,
        output,
        sources: data.sources.clone(),
        dataset_hash: data.dataset_hash.clone(),
        has_synthetic: data.has_synthetic,
        metadata: RunMetadata {
            timestamp,
            duration_secs: started.elapsed().as_secs_f64(),
            trading_days: table.len(),
            tickers: table.tickers().to_vec(),
            first_date: table.dates().first().copied(),
            last_date: table.dates().last().copied(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceKind;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn synthetic_config() -> RunConfig {
        let mut config = RunConfig::default();
        config.data.source = SourceKind::Synthetic;
        config.data.tickers = vec!["AAPL".into(), "MSFT".into(), "AMD".into(), "NVDA".into()];
        config.data.start_date = d(1, 2);
        config.data.end_date = Some(d(6, 28));
        config.strategy.top_n = 2;
        config
    }

    #[test]
    fn synthetic_run_produces_full_report() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        let config = synthetic_config();

        let report = run_backtest(&config, &cache, None, None, None).unwrap();

        assert_eq!(report.run_id, config.run_id());
        assert!(report.has_synthetic);
        assert_eq!(report.scores.len(), 4);
        assert_eq!(report.output.daily.len(), report.metadata.trading_days);
        assert_eq!(report.metadata.first_date, Some(d(1, 2)));
        assert_eq!(report.metadata.last_date, Some(d(6, 28)));
        assert!(report.output.rebalances.iter().all(|r| r.selection.len() == 2));
    }

    #[test]
    fn invalid_config_never_loads() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        let mut config = synthetic_config();
        config.strategy.top_n = 0;

        let err = run_backtest(&config, &cache, None, None, None).unwrap_err();
        assert!(matches!(err, RunError::Config(_)));
        assert!(cache.list().is_empty());
    }

    #[test]
    fn same_config_same_results() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        let config = synthetic_config();

        let a = run_backtest(&config, &cache, None, None, None).unwrap();
        let b = run_backtest(&config, &cache, None, None, None).unwrap();
        assert_eq!(a.run_id, b.run_id);
        assert_eq!(a.output, b.output);
        assert_eq!(a.dataset_hash, b.dataset_hash);
    }

    #[test]
    fn report_survives_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        let report = run_backtest(&synthetic_config(), &cache, None, None, None).unwrap();

        let json = serde_json::to_string(&report).unwrap();
        let back: BacktestReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.run_id, report.run_id);
        assert_eq!(back.output.stats, report.output.stats);
        assert_eq!(back.scores, report.scores);
    }
}
