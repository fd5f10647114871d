//! In-memory memo of loaded prices, keyed by request.
//!
//! Injected by the caller instead of living in a process global, so tests
//! and parallel runs each decide what they share. An entry is served until
//! it is older than `max_age` (if set), explicitly invalidated, or the memo
//! is cleared.

use super::table::PriceTable;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// What was asked for: normalised tickers plus an inclusive date range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceRequest {
    pub tickers: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PriceRequest {
    /// Tickers are trimmed, upper-cased, de-duplicated (first wins) and
    /// empty entries dropped.
    pub fn new<I, S>(tickers: I, start: NaiveDate, end: NaiveDate) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalised: Vec<String> = Vec::new();
        for t in tickers {
            let t = t.as_ref().trim().to_uppercase();
            if !t.is_empty() && !normalised.contains(&t) {
                normalised.push(t);
            }
        }
        Self {
            tickers: normalised,
            start,
            end,
        }
    }

    /// Parse a comma-separated ticker list such as `"aapl, msft,,AMD"`.
    pub fn parse(tickers: &str, start: NaiveDate, end: NaiveDate) -> Self {
        Self::new(tickers.split(','), start, end)
    }
}

struct MemoEntry<T> {
    value: Arc<T>,
    stored_at: Instant,
}

/// Values are shared as `Arc<T>`; by default a bare `PriceTable`, though
/// callers may memoise a richer load result.
pub struct PriceMemo<T = PriceTable> {
    entries: Mutex<HashMap<PriceRequest, MemoEntry<T>>>,
    max_age: Option<Duration>,
}

impl<T> PriceMemo<T> {
    pub fn new(max_age: Option<Duration>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_age,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PriceRequest, MemoEntry<T>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_fresh(&self, entry: &MemoEntry<T>) -> bool {
        self.max_age
            .map_or(true, |max| entry.stored_at.elapsed() <= max)
    }

    /// Cached value for `key`, evicting it first if stale.
    pub fn get(&self, key: &PriceRequest) -> Option<Arc<T>> {
        let mut entries = self.lock();
        let fresh = entries.get(key).map(|entry| self.is_fresh(entry))?;
        if fresh {
            return entries.get(key).map(|entry| Arc::clone(&entry.value));
        }
        debug!(tickers = ?key.tickers, "evicting stale price memo entry");
        entries.remove(key);
        None
    }

    pub fn insert(&self, key: PriceRequest, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.lock().insert(
            key,
            MemoEntry {
                value: Arc::clone(&value),
                stored_at: Instant::now(),
            },
        );
        value
    }

    /// Serve from the memo or run `load` and remember its result.
    ///
    /// The lock is not held while loading; two concurrent misses on the same
    /// key both load and the later insert wins. Errors are not memoised.
    pub fn get_or_try_load<F, E>(&self, key: &PriceRequest, load: F) -> Result<Arc<T>, E>
    where
        F: FnOnce(&PriceRequest) -> Result<T, E>,
    {
        if let Some(hit) = self.get(key) {
            debug!(tickers = ?key.tickers, "price memo hit");
            return Ok(hit);
        }
        let value = load(key)?;
        Ok(self.insert(key.clone(), value))
    }

    /// Drop one entry. Returns whether it was present.
    pub fn invalidate(&self, key: &PriceRequest) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for PriceMemo<T> {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::{DataError, PricePoint};
    use std::cell::Cell;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn table(price: f64) -> PriceTable {
        PriceTable::from_series(vec![(
            "AAPL".to_string(),
            vec![PricePoint {
                date: d(2),
                close: Some(price),
                adj_close: None,
            }],
        )])
        .unwrap()
    }

    #[test]
    fn request_normalises_ticker_text() {
        let req = PriceRequest::parse(" aapl, msft,,AMD ,AAPL", d(1), d(31));
        assert_eq!(req.tickers, vec!["AAPL", "MSFT", "AMD"]);
        assert_eq!(req, PriceRequest::new(["AAPL", "MSFT", "AMD"], d(1), d(31)));
    }

    #[test]
    fn loads_once_then_serves_hits() {
        let memo: PriceMemo = PriceMemo::default();
        let key = PriceRequest::parse("AAPL", d(1), d(31));
        let calls = Cell::new(0);

        for _ in 0..3 {
            let t = memo
                .get_or_try_load(&key, |_| {
                    calls.set(calls.get() + 1);
                    Ok::<_, DataError>(table(1.0))
                })
                .unwrap();
            assert_eq!(t.len(), 1);
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn errors_are_not_memoised() {
        let memo: PriceMemo = PriceMemo::default();
        let key = PriceRequest::parse("AAPL", d(1), d(31));

        let err = memo.get_or_try_load(&key, |_| Err(DataError::NoUsableData));
        assert!(err.is_err());
        assert!(memo.is_empty());
    }

    #[test]
    fn invalidate_and_clear() {
        let memo: PriceMemo = PriceMemo::default();
        let a = PriceRequest::parse("AAPL", d(1), d(31));
        let b = PriceRequest::parse("MSFT", d(1), d(31));
        memo.insert(a.clone(), table(1.0));
        memo.insert(b.clone(), table(2.0));

        assert!(memo.invalidate(&a));
        assert!(!memo.invalidate(&a));
        assert!(memo.get(&b).is_some());
        memo.clear();
        assert!(memo.get(&b).is_none());
    }

    #[test]
    fn stale_entries_are_evicted() {
        let memo: PriceMemo = PriceMemo::new(Some(Duration::from_millis(5)));
        let key = PriceRequest::parse("AAPL", d(1), d(31));
        memo.insert(key.clone(), table(1.0));
        std::thread::sleep(Duration::from_millis(10));

        assert!(memo.get(&key).is_none());
        assert!(memo.is_empty());
    }
}
