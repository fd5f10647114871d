//! Backtesting engine.
//!
//! Data flows one way: `PriceTable` -> rebalance schedule -> per-date
//! selection -> daily holdings -> return series -> summary statistics.
//! Every stage is a pure function over borrowed inputs.

pub mod backtester;
pub mod holdings;
pub mod returns;
pub mod schedule;
pub mod selection;
pub mod stats;

pub use backtester::{
    backtest, BacktestOutput, BacktestParams, DailyRecord, RebalanceEvent, MAX_TOP_N,
};
pub use holdings::project_holdings;
pub use schedule::{rebalance_dates, RebalanceAnchor, RebalanceFrequency};
pub use selection::{select_top_n, selections_at};
pub use stats::{StatsRecord, TRADING_DAYS_PER_YEAR};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("price table is empty: no usable price data")]
    EmptyPriceTable,

    #[error("top_n must be between 1 and {max}, got {top_n}")]
    InvalidTopN { top_n: usize, max: usize },

    #[error("risk-free rate must be finite, got {0}")]
    NonFiniteRiskFree(f64),
}
