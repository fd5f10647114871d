//! Price loading and data resolution for the runner.
//!
//! Given a list of symbols, loads prices from the Parquet cache and returns
//! an aligned `PriceTable`. Per symbol the fallback policy is:
//! 1. Cache covers the range: use it
//! 2. Otherwise, if online and a provider is available: download and cache
//! 3. A partially covering cache: use what is there
//! 4. If synthetic data is allowed: generate a synthetic walk (tagged)
//! 5. Otherwise: skip the symbol with a warning
//!
//! Loading fails only when no symbol yields data.
//!
//! CSV uploads bypass the cache entirely.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info, warn};
use valuelab_core::data::{
    load_price_csv, synthetic_walk, CoverageResult, DataError, DataSource, DownloadProgress,
    ParquetCache, PriceMemo, PricePoint, PriceProvider, PriceRequest, PriceTable,
};

use crate::config::{RunConfig, SourceKind};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no cached data for '{symbol}' and no network access (allow_synthetic is off)")]
    NoCachedDataOffline { symbol: String },

    #[error("no cached data for '{symbol}' and download failed: {reason}")]
    DownloadFailed { symbol: String, reason: String },

    #[error("no tickers requested")]
    NoSymbols,

    #[error("data source is csv but no csv_path is set")]
    MissingCsvPath,

    #[error("data error: {0}")]
    Data(#[from] DataError),
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub start: NaiveDate,
    /// Inclusive.
    pub end: NaiveDate,
    /// Never make network requests.
    pub offline: bool,
    /// Generate synthetic prices when real data is unavailable.
    pub synthetic: bool,
    /// Re-download even if cached.
    pub force: bool,
}

/// Aligned prices plus where each symbol's data came from.
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub table: Arc<PriceTable>,
    pub sources: BTreeMap<String, DataSource>,
    /// BLAKE3 over the aligned table.
    pub dataset_hash: String,
    pub has_synthetic: bool,
}

impl LoadedData {
    fn from_table(table: PriceTable, sources: BTreeMap<String, DataSource>) -> Self {
        let has_synthetic = sources.values().any(|s| *s == DataSource::Synthetic);
        let dataset_hash = table.fingerprint();
        Self {
            table: Arc::new(table),
            sources,
            dataset_hash,
            has_synthetic,
        }
    }
}

/// Load prices for `symbols`, with fallback to download or synthetic data.
pub fn load_prices(
    symbols: &[String],
    cache: &ParquetCache,
    provider: Option<&dyn PriceProvider>,
    progress: Option<&dyn DownloadProgress>,
    opts: &LoadOptions,
) -> Result<LoadedData, LoadError> {
    if symbols.is_empty() {
        return Err(LoadError::NoSymbols);
    }

    let total = symbols.len();
    let mut series: Vec<(String, Vec<PricePoint>)> = Vec::with_capacity(total);
    let mut sources: BTreeMap<String, DataSource> = BTreeMap::new();
    let mut skipped: Vec<LoadError> = Vec::new();

    for (i, symbol) in symbols.iter().enumerate() {
        let coverage = cache.covers_range(symbol, opts.start, opts.end);

        // Step 1: Cache hit
        if !opts.force && coverage == CoverageResult::FullyCovered {
            if let Ok(points) = cache.load_range(symbol, opts.start, opts.end) {
                debug!(symbol = %symbol, "loaded from cache");
                series.push((symbol.clone(), points));
                sources.insert(symbol.clone(), DataSource::Cache);
                continue;
            }
        }

        // Step 2: Download
        let mut failure: Option<String> = None;
        if !opts.offline {
            match provider.filter(|p| p.is_available()) {
                Some(prov) => {
                    if let Some(p) = progress {
                        p.on_start(symbol, i, total);
                    }
                    let fetched = prov.fetch(symbol, opts.start, opts.end).and_then(|f| {
                        cache.write(symbol, &f.points)?;
                        Ok(f)
                    });
                    match fetched {
                        Ok(f) => {
                            if let Some(p) = progress {
                                p.on_complete(symbol, i, total, &Ok(()));
                            }
                            series.push((symbol.clone(), f.points));
                            sources.insert(symbol.clone(), f.source);
                            continue;
                        }
                        Err(e) => {
                            failure = Some(e.to_string());
                            if let Some(p) = progress {
                                p.on_complete(symbol, i, total, &Err(e));
                            }
                        }
                    }
                }
                None => failure = Some("no provider available".into()),
            }
        }

        // Step 3: Partial cache
        if matches!(coverage, CoverageResult::PartiallyCovered { .. }) {
            if let Ok(points) = cache.load_range(symbol, opts.start, opts.end) {
                warn!(symbol = %symbol, "cache only partially covers the range, using it");
                series.push((symbol.clone(), points));
                sources.insert(symbol.clone(), DataSource::Cache);
                continue;
            }
        }

        // Step 4: Synthetic fallback
        if opts.synthetic {
            warn!(symbol = %symbol, "generating synthetic data; results will be tagged synthetic");
            series.push((symbol.clone(), synthetic_walk(symbol, opts.start, opts.end)));
            sources.insert(symbol.clone(), DataSource::Synthetic);
            continue;
        }

        // Step 5: Skip
        let err = match failure {
            None => LoadError::NoCachedDataOffline {
                symbol: symbol.clone(),
            },
            Some(reason) => LoadError::DownloadFailed {
                symbol: symbol.clone(),
                reason,
            },
        };
        warn!(symbol = %symbol, error = %err, "no usable data, skipping symbol");
        skipped.push(err);
    }

    if let Some(p) = progress {
        p.on_batch_complete(series.len(), skipped.len(), total);
    }

    if series.is_empty() {
        // Every symbol failed; report the first.
        if let Some(first) = skipped.into_iter().next() {
            return Err(first);
        }
    }

    let table = PriceTable::from_series(series)?;
    dropped_ticker_warnings(&table, symbols);
    info!(
        days = table.len(),
        tickers = table.tickers().len(),
        "price table ready"
    );
    Ok(LoadedData::from_table(table, sources))
}

/// Only synthetic walks, no cache or network.
pub fn load_synthetic(
    symbols: &[String],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<LoadedData, LoadError> {
    if symbols.is_empty() {
        return Err(LoadError::NoSymbols);
    }
    let series = symbols
        .iter()
        .map(|s| (s.clone(), synthetic_walk(s, start, end)));
    let table = PriceTable::from_series(series)?;
    let sources = symbols
        .iter()
        .map(|s| (s.clone(), DataSource::Synthetic))
        .collect();
    Ok(LoadedData::from_table(table, sources))
}

/// A long-format CSV upload.
pub fn load_csv(path: &Path) -> Result<LoadedData, LoadError> {
    let table = load_price_csv(path)?;
    let sources = table
        .tickers()
        .iter()
        .map(|t| (t.clone(), DataSource::CsvUpload))
        .collect();
    info!(
        path = %path.display(),
        days = table.len(),
        tickers = table.tickers().len(),
        "loaded uploaded prices"
    );
    Ok(LoadedData::from_table(table, sources))
}

/// Resolve a run config to loaded prices, consulting `memo` for repeated
/// requests. CSV uploads are never memoised.
pub fn load_for_config(
    config: &RunConfig,
    cache: &ParquetCache,
    provider: Option<&dyn PriceProvider>,
    progress: Option<&dyn DownloadProgress>,
    memo: Option<&PriceMemo<LoadedData>>,
) -> Result<Arc<LoadedData>, LoadError> {
    let data = &config.data;
    let (start, end) = (data.start_date, data.resolved_end());

    if data.source == SourceKind::Csv {
        let path = data.csv_path.as_deref().ok_or(LoadError::MissingCsvPath)?;
        return load_csv(path).map(Arc::new);
    }

    let request = PriceRequest::new(&data.tickers, start, end);
    let load = |req: &PriceRequest| match data.source {
        SourceKind::Synthetic => load_synthetic(&req.tickers, req.start, req.end),
        _ => load_prices(
            &req.tickers,
            cache,
            provider,
            progress,
            &LoadOptions {
                start: req.start,
                end: req.end,
                offline: data.offline,
                synthetic: data.allow_synthetic,
                force: false,
            },
        ),
    };

    match memo {
        Some(memo) => memo.get_or_try_load(&request, load),
        None => load(&request).map(Arc::new),
    }
}

fn dropped_ticker_warnings(table: &PriceTable, requested: &[String]) {
    for symbol in requested {
        if table.ticker_index(symbol).is_none() {
            warn!(symbol = %symbol, "no usable prices, ticker dropped from table");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use valuelab_core::data::{FetchResult, SyntheticProvider};

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn opts(offline: bool, synthetic: bool) -> LoadOptions {
        LoadOptions {
            start: d(1, 2),
            end: d(3, 29),
            offline,
            synthetic,
            force: false,
        }
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// Synthetic prices served as if downloaded; counts calls.
    struct CountingProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    impl PriceProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn fetch(
            &self,
            symbol: &str,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<FetchResult, DataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if symbol == "BOGUS" {
                return Err(DataError::SymbolNotFound {
                    symbol: symbol.to_string(),
                });
            }
            if self.fail {
                return Err(DataError::NetworkUnreachable("offline fixture".into()));
            }
            let mut result = SyntheticProvider.fetch(symbol, start, end)?;
            result.source = DataSource::YahooFinance;
            Ok(result)
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    #[test]
    fn downloads_then_serves_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
            fail: false,
        };
        let syms = symbols(&["AAPL", "MSFT"]);

        let first =
            load_prices(&syms, &cache, Some(&provider), None, &opts(false, false)).unwrap();
        assert_eq!(first.sources["AAPL"], DataSource::YahooFinance);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        let second =
            load_prices(&syms, &cache, Some(&provider), None, &opts(false, false)).unwrap();
        assert_eq!(second.sources["AAPL"], DataSource::Cache);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert!(!second.has_synthetic);
    }

    #[test]
    fn offline_without_cache_fails_unless_synthetic_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        let syms = symbols(&["AAPL"]);

        let err = load_prices(&syms, &cache, None, None, &opts(true, false)).unwrap_err();
        assert!(matches!(err, LoadError::NoCachedDataOffline { .. }));

        let loaded = load_prices(&syms, &cache, None, None, &opts(true, true)).unwrap();
        assert!(loaded.has_synthetic);
        assert_eq!(loaded.sources["AAPL"], DataSource::Synthetic);
    }

    #[test]
    fn failed_download_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
            fail: true,
        };

        let syms = symbols(&["AMD"]);
        let err =
            load_prices(&syms, &cache, Some(&provider), None, &opts(false, false)).unwrap_err();
        assert!(matches!(
            err,
            LoadError::DownloadFailed { ref symbol, .. } if symbol == "AMD"
        ));
    }

    /// Counts batch outcomes.
    #[derive(Default)]
    struct BatchTally {
        outcome: std::sync::Mutex<Option<(usize, usize, usize)>>,
    }

    impl DownloadProgress for BatchTally {
        fn on_start(&self, _symbol: &str, _index: usize, _total: usize) {}

        fn on_complete(
            &self,
            _symbol: &str,
            _index: usize,
            _total: usize,
            _result: &Result<(), DataError>,
        ) {
        }

        fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
            *self.outcome.lock().unwrap() = Some((succeeded, failed, total));
        }
    }

    #[test]
    fn unknown_symbol_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
            fail: false,
        };
        let tally = BatchTally::default();
        let syms = symbols(&["AAPL", "BOGUS", "MSFT"]);

        let loaded = load_prices(
            &syms,
            &cache,
            Some(&provider),
            Some(&tally),
            &opts(false, false),
        )
        .unwrap();

        assert_eq!(loaded.table.tickers(), &["AAPL".to_string(), "MSFT".to_string()]);
        assert!(!loaded.sources.contains_key("BOGUS"));
        assert_eq!(*tally.outcome.lock().unwrap(), Some((2, 1, 3)));
    }

    #[test]
    fn every_symbol_failing_is_still_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
            fail: false,
        };

        let err = load_prices(
            &symbols(&["BOGUS"]),
            &cache,
            Some(&provider),
            None,
            &opts(false, false),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LoadError::DownloadFailed { ref symbol, .. } if symbol == "BOGUS"
        ));
    }

    #[test]
    fn empty_symbol_list_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        assert!(matches!(
            load_prices(&[], &cache, None, None, &opts(true, true)),
            Err(LoadError::NoSymbols)
        ));
    }

    #[test]
    fn csv_upload_is_tagged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.csv");
        let csv = "Date,Ticker,Close\n2024-01-02,AMD,140\n2024-01-03,AMD,141\n";
        std::fs::write(&path, csv).unwrap();

        let loaded = load_csv(&path).unwrap();
        assert_eq!(loaded.sources["AMD"], DataSource::CsvUpload);
        assert_eq!(loaded.dataset_hash, loaded.table.fingerprint());
    }

    #[test]
    fn memo_serves_repeated_config_loads() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        let mut config = RunConfig::default();
        config.data.source = SourceKind::Synthetic;
        config.data.start_date = d(1, 2);
        config.data.end_date = Some(d(3, 29));

        let memo = PriceMemo::default();
        let a = load_for_config(&config, &cache, None, None, Some(&memo)).unwrap();
        let b = load_for_config(&config, &cache, None, None, Some(&memo)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.has_synthetic);

        memo.clear();
        let c = load_for_config(&config, &cache, None, None, Some(&memo)).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(a.dataset_hash, c.dataset_hash);
    }
}
