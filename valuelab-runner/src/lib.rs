//! ValueLab Runner: configuration, data loading, run orchestration, sweeps
//! and artifact export.
//!
//! This crate builds on `valuelab-core` to provide:
//! - TOML run configuration with validation and content-addressed run IDs
//! - Data loading with cache/download/synthetic fallback and CSV uploads
//! - Single-run orchestration producing a `BacktestReport`
//! - Parallel parameter sweeps over a shared price table
//! - JSON/CSV/Markdown artifacts per run

pub mod config;
pub mod data_loader;
pub mod export;
pub mod runner;
pub mod sweep;

pub use config::{ConfigError, DataConfig, RunConfig, RunId, SourceKind, StrategyConfig};
pub use data_loader::{
    load_csv, load_for_config, load_prices, load_synthetic, LoadError, LoadOptions, LoadedData,
};
pub use export::{render_report, ArtifactManager, ArtifactPaths, RunManifest};
pub use runner::{
    run_backtest, run_with_data, run_with_scores, scorer_for, BacktestReport, RunError,
    RunMetadata,
};
pub use sweep::{run_sweep, ParamGrid, SweepEntry, SweepResults};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
        assert_send::<LoadOptions>();
        assert_sync::<LoadOptions>();
    }

    #[test]
    fn loaded_data_is_send_sync() {
        assert_send::<LoadedData>();
        assert_sync::<LoadedData>();
    }

    #[test]
    fn backtest_report_is_send_sync() {
        assert_send::<BacktestReport>();
        assert_sync::<BacktestReport>();
    }

    #[test]
    fn sweep_types_are_send_sync() {
        assert_send::<ParamGrid>();
        assert_sync::<ParamGrid>();
        assert_send::<SweepResults>();
        assert_sync::<SweepResults>();
    }
}
