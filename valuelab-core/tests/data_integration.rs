//! Integration tests for the data pipeline: download into the Parquet cache,
//! read back, align into a table and run the engine on it.

use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use valuelab_core::data::{
    download_symbols, synthetic_walk, CoverageResult, DataError, DownloadProgress, ParquetCache,
    PriceMemo, PriceRequest, PriceTable, SyntheticProvider,
};
use valuelab_core::engine::{backtest, BacktestParams};
use valuelab_core::valuation::{ProxyDcfScorer, ScoreMap};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_cache_dir() -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir =
        std::env::temp_dir().join(format!("valuelab_data_test_{}_{id}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

struct Quiet;

impl DownloadProgress for Quiet {
    fn on_start(&self, _: &str, _: usize, _: usize) {}
    fn on_complete(&self, _: &str, _: usize, _: usize, _: &Result<(), DataError>) {}
    fn on_batch_complete(&self, _: usize, _: usize, _: usize) {}
}

fn load_table(
    cache: &ParquetCache,
    symbols: &[&str],
    start: NaiveDate,
    end: NaiveDate,
) -> PriceTable {
    let series = symbols.iter().map(|s| {
        let points = cache.load_range(s, start, end).unwrap();
        (s.to_string(), points)
    });
    PriceTable::from_series(series).unwrap()
}

#[test]
fn download_cache_and_backtest_round_trip() {
    let dir = temp_cache_dir();
    let cache = ParquetCache::new(&dir);
    let (start, end) = (d(2023, 6, 1), d(2024, 5, 31));
    let symbols = ["AAPL", "MSFT", "AMD", "NVDA"];

    let summary = download_symbols(&SyntheticProvider, &cache, &symbols, start, end, false, &Quiet);
    assert!(summary.all_succeeded());
    assert_eq!(summary.succeeded, 4);

    // Spans a year boundary, so each symbol has two partitions.
    assert!(dir.join("symbol=AAPL").join("2023.parquet").exists());
    assert!(dir.join("symbol=AAPL").join("2024.parquet").exists());
    assert_eq!(cache.covers_range("AMD", start, end), CoverageResult::FullyCovered);

    let cached = cache.load("AAPL").unwrap();
    let fresh = synthetic_walk("AAPL", start, end);
    assert_eq!(cached.len(), fresh.len());
    for (a, b) in cached.iter().zip(&fresh) {
        assert_eq!(a.date, b.date);
        assert!((a.value().unwrap() - b.value().unwrap()).abs() < 1e-9);
    }

    let table = load_table(&cache, &symbols, start, end);
    assert_eq!(table.tickers().len(), 4);
    let scores = ScoreMap::from_latest(&table, &ProxyDcfScorer::default());
    let out = backtest(&table, &scores, &BacktestParams::default()).unwrap();

    assert_eq!(out.daily.len(), table.len());
    // Jun 1 2023 is a Thursday, so every month start resolves.
    assert_eq!(out.rebalances.len(), 12);
    assert!(out.stats.final_cum_return.is_some());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn second_download_is_served_from_cache() {
    let dir = temp_cache_dir();
    let cache = ParquetCache::new(&dir);
    // Both ends are weekdays, so the synthetic walk covers the range exactly.
    let (start, end) = (d(2024, 1, 2), d(2024, 3, 29));

    download_symbols(&SyntheticProvider, &cache, &["AAPL"], start, end, false, &Quiet);
    let first_meta = cache.get_meta("AAPL").unwrap();

    let again = download_symbols(&SyntheticProvider, &cache, &["AAPL"], start, end, false, &Quiet);
    assert!(again.all_succeeded());
    assert_eq!(cache.get_meta("AAPL").unwrap().cached_at, first_meta.cached_at);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn memo_shares_one_table_across_requests() {
    let dir = temp_cache_dir();
    let cache = ParquetCache::new(&dir);
    let (start, end) = (d(2024, 1, 1), d(2024, 2, 29));
    download_symbols(&SyntheticProvider, &cache, &["AAPL", "MSFT"], start, end, false, &Quiet);

    let memo: PriceMemo = PriceMemo::default();
    let request = PriceRequest::parse("msft, aapl", start, end);
    let load = |req: &PriceRequest| -> Result<PriceTable, DataError> {
        let series = req
            .tickers
            .iter()
            .map(|t| Ok((t.clone(), cache.load_range(t, req.start, req.end)?)))
            .collect::<Result<Vec<_>, DataError>>()?;
        PriceTable::from_series(series)
    };

    let a = memo.get_or_try_load(&request, load).unwrap();
    let b = memo.get_or_try_load(&request, load).unwrap();
    assert!(std::sync::Arc::ptr_eq(&a, &b));
    assert_eq!(a.tickers(), &["MSFT".to_string(), "AAPL".to_string()]);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn uncached_symbol_is_reported() {
    let dir = temp_cache_dir();
    let cache = ParquetCache::new(&dir);
    assert!(matches!(
        cache.load("NOPE"),
        Err(DataError::NoCachedData { .. })
    ));
    assert_eq!(
        cache.covers_range("NOPE", d(2024, 1, 1), d(2024, 1, 31)),
        CoverageResult::NotCached
    );
}
