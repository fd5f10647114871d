//! Multi-symbol download into the Parquet cache, with progress reporting.

use super::cache::{CoverageResult, ParquetCache};
use super::provider::{DataError, DownloadProgress, PriceProvider};
use chrono::NaiveDate;
use tracing::warn;

/// Fetch and cache each symbol. Symbols already covered are skipped unless
/// `force` is set. Once the provider stops accepting requests the remaining
/// symbols are failed without being tried.
pub fn download_symbols(
    provider: &dyn PriceProvider,
    cache: &ParquetCache,
    symbols: &[&str],
    start: NaiveDate,
    end: NaiveDate,
    force: bool,
    progress: &dyn DownloadProgress,
) -> DownloadSummary {
    let total = symbols.len();
    let mut succeeded = 0;
    let mut errors: Vec<(String, DataError)> = Vec::new();

    for (i, symbol) in symbols.iter().enumerate() {
        progress.on_start(symbol, i, total);

        if !force && cache.covers_range(symbol, start, end) == CoverageResult::FullyCovered {
            progress.on_complete(symbol, i, total, &Ok(()));
            succeeded += 1;
            continue;
        }

        let result = provider
            .fetch(symbol, start, end)
            .and_then(|fetched| cache.write(symbol, &fetched.points));
        progress.on_complete(symbol, i, total, &result);

        match result {
            Ok(()) => succeeded += 1,
            Err(e) => errors.push((symbol.to_string(), e)),
        }

        if !provider.is_available() {
            warn!(remaining = total - i - 1, "provider unavailable, aborting batch");
            for sym in &symbols[(i + 1)..] {
                errors.push((sym.to_string(), DataError::CircuitBreakerTripped));
            }
            break;
        }
    }

    let failed = errors.len();
    progress.on_batch_complete(succeeded, failed, total);

    DownloadSummary {
        total,
        succeeded,
        failed,
        errors,
    }
}

#[derive(Debug)]
pub struct DownloadSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<(String, DataError)>,
}

impl DownloadSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}
