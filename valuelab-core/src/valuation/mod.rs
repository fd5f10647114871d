//! Valuation scoring: the ScoreProvider contract and a proxy DCF scorer.

pub mod dcf;
pub mod peers;
pub mod score;

pub use dcf::{comparables_estimate, dcf_value};
pub use peers::parse_peer_pes;
pub use score::{ProxyDcfScorer, Score, ScoreMap, ScoreProvider, Valuation, ValuationParams};
