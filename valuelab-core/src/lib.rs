//! ValueLab Core: price data, valuation scoring and the backtesting engine.
//!
//! This crate contains:
//! - Price acquisition (Yahoo chart API, CSV upload, synthetic walks) and the
//!   Parquet price cache
//! - `PriceTable`, the forward-filled dates x tickers matrix every run reads
//! - Valuation scoring behind the `ScoreProvider` trait
//! - The engine: rebalance schedule, top-N selection, holdings projection,
//!   daily returns and summary statistics

pub mod data;
pub mod engine;
pub mod valuation;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: shared run inputs and outputs are Send + Sync,
    /// so sweeps can fan out across threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<data::PriceTable>();
        require_sync::<data::PriceTable>();
        require_send::<data::PriceMemo>();
        require_sync::<data::PriceMemo>();
        require_send::<data::CircuitBreaker>();
        require_sync::<data::CircuitBreaker>();

        require_send::<valuation::ScoreMap>();
        require_sync::<valuation::ScoreMap>();
        require_send::<valuation::ProxyDcfScorer>();
        require_sync::<valuation::ProxyDcfScorer>();

        require_send::<engine::BacktestParams>();
        require_sync::<engine::BacktestParams>();
        require_send::<engine::BacktestOutput>();
        require_sync::<engine::BacktestOutput>();
        require_send::<engine::EngineError>();
        require_sync::<engine::EngineError>();
    }
}
