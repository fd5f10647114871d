//! Peer P/E map parsing from `"AAPL:25,MSFT:30"` style text.

use std::collections::BTreeMap;
use tracing::debug;

/// Parse `TICKER:PE` pairs separated by commas.
///
/// Tickers are trimmed and upper-cased. Items without exactly one `:`, with
/// an empty ticker, or with a non-numeric P/E are skipped; parsing itself
/// never fails. A repeated ticker keeps the last value.
pub fn parse_peer_pes(text: &str) -> BTreeMap<String, f64> {
    let mut peers = BTreeMap::new();
    for item in text.split(',') {
        let mut parts = item.split(':');
        let (Some(ticker), Some(pe), None) = (parts.next(), parts.next(), parts.next()) else {
            if !item.trim().is_empty() {
                debug!(item, "skipping malformed peer P/E entry");
            }
            continue;
        };
        let ticker = ticker.trim().to_uppercase();
        match pe.trim().parse::<f64>() {
            Ok(pe) if !ticker.is_empty() && pe.is_finite() => {
                peers.insert(ticker, pe);
            }
            _ => debug!(item, "skipping peer P/E entry with bad ticker or value"),
        }
    }
    peers
}
