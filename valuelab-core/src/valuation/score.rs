//! Undervaluation scores: lower is cheaper.
//!
//! score = (price - avg_estimate) / price, where the estimates are a DCF
//! value on a price-derived cash-flow proxy and, when a peer P/E is known,
//! a comparables price on a price-derived EPS proxy. A negative score means
//! the estimates sit above the market price.

use super::dcf::{comparables_estimate, dcf_value};
use crate::data::PriceTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// A ranking score, or an explicit "cannot be ranked".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Score {
    Scored(f64),
    Unscored,
}

impl Score {
    /// Non-finite values become `Unscored`.
    pub fn from_f64(value: f64) -> Self {
        if value.is_finite() {
            Score::Scored(value)
        } else {
            Score::Unscored
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Score::Scored(v) => Some(v),
            Score::Unscored => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    pub score: Score,
    pub dcf_value: f64,
    pub comparables_estimate: Option<f64>,
}

/// Valuation inputs. Rates are fractions (0.08 = 8%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuationParams {
    pub discount_rate: f64,
    pub terminal_growth: f64,
    pub projection_years: u32,
    pub growth_rate: f64,
    /// Free cash flow proxy = price * fcf_yield.
    pub fcf_yield: f64,
    /// EPS proxy = price * eps_yield.
    pub eps_yield: f64,
}

impl Default for ValuationParams {
    fn default() -> Self {
        Self {
            discount_rate: 0.08,
            terminal_growth: 0.02,
            projection_years: 5,
            growth_rate: 0.05,
            fcf_yield: 0.05,
            eps_yield: 0.05,
        }
    }
}

/// Maps a ticker and its latest price to a valuation.
///
/// `None` means the ticker is left out of the score map entirely.
pub trait ScoreProvider: Send + Sync {
    fn score(&self, ticker: &str, latest_price: f64) -> Option<Valuation>;
}

/// DCF plus peer-P/E scorer on price-derived proxies.
#[derive(Debug, Clone, Default)]
pub struct ProxyDcfScorer {
    pub params: ValuationParams,
    pub peer_pes: BTreeMap<String, f64>,
}

impl ProxyDcfScorer {
    pub fn new(params: ValuationParams, peer_pes: BTreeMap<String, f64>) -> Self {
        Self { params, peer_pes }
    }
}

impl ScoreProvider for ProxyDcfScorer {
    fn score(&self, ticker: &str, latest_price: f64) -> Option<Valuation> {
        if !latest_price.is_finite() || latest_price <= 0.0 {
            return None;
        }
        let p = &self.params;

        let dcf = dcf_value(
            latest_price * p.fcf_yield,
            p.growth_rate,
            p.discount_rate,
            p.projection_years,
            p.terminal_growth,
        );
        let comparable = self
            .peer_pes
            .get(ticker)
            .map(|pe| comparables_estimate(latest_price * p.eps_yield, *pe))
            .filter(|v| v.is_finite());

        let estimates: Vec<f64> = std::iter::once(dcf)
            .filter(|v| v.is_finite())
            .chain(comparable)
            .collect();
        let avg = if estimates.is_empty() {
            dcf
        } else {
            estimates.iter().sum::<f64>() / estimates.len() as f64
        };

        let score = Score::from_f64((latest_price - avg) / latest_price);

        Some(Valuation {
            score,
            dcf_value: dcf,
            comparables_estimate: comparable,
        })
    }
}

/// Score snapshot for every ticker, taken once before the backtest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreMap {
    entries: BTreeMap<String, Valuation>,
}

impl ScoreMap {
    /// Score each ticker at the table's last row. Tickers with no latest
    /// price, or that the provider declines, get no entry.
    pub fn from_latest(table: &PriceTable, provider: &dyn ScoreProvider) -> Self {
        let entries: BTreeMap<String, Valuation> = table
            .latest_prices()
            .into_iter()
            .filter_map(|(ticker, price)| {
                let valuation = price.and_then(|p| provider.score(ticker, p));
                if valuation.is_none() {
                    debug!(ticker, "no valuation for ticker");
                }
                valuation.map(|v| (ticker.to_string(), v))
            })
            .collect();
        Self { entries }
    }

    pub fn insert(&mut self, ticker: impl Into<String>, valuation: Valuation) {
        self.entries.insert(ticker.into(), valuation);
    }

    pub fn get(&self, ticker: &str) -> Option<&Valuation> {
        self.entries.get(ticker)
    }

    /// Rankable score for a ticker; absent tickers count as unscored.
    pub fn score_of(&self, ticker: &str) -> Option<f64> {
        self.entries.get(ticker).and_then(|v| v.score.value())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Valuation)> {
        self.entries.iter().map(|(t, v)| (t.as_str(), v))
    }

    /// Entries ordered most undervalued first; unscored entries last.
    pub fn ranked(&self) -> Vec<(&str, &Valuation)> {
        let mut rows: Vec<(&str, &Valuation)> = self.iter().collect();
        rows.sort_by(|a, b| match (a.1.score.value(), b.1.score.value()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        rows
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Valuation)> for ScoreMap {
    fn from_iter<I: IntoIterator<Item = (String, Valuation)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl FromIterator<(String, f64)> for ScoreMap {
    /// Bare scores, with NaN mapped to `Unscored`. Estimates are left at zero.
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(t, s)| {
                (
                    t,
                    Valuation {
                        score: Score::from_f64(s),
                        dcf_value: 0.0,
                        comparables_estimate: None,
                    },
                )
            })
            .collect()
    }
}
