//! Summary statistics over a daily return series.
//!
//! Pure functions: return and compounded series in, scalars out. A statistic
//! that is undefined for the input (empty series, zero volatility, a
//! non-finite intermediate) is `None`, never NaN.

use serde::{Deserialize, Serialize};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsRecord {
    pub annual_return: Option<f64>,
    pub annual_vol: Option<f64>,
    pub sharpe: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub final_cum_return: Option<f64>,
}

impl StatsRecord {
    /// `returns`, `cumulative` and `drawdown` are parallel daily series.
    pub fn compute(
        returns: &[f64],
        cumulative: &[f64],
        drawdown: &[f64],
        risk_free_annual: f64,
    ) -> Self {
        let annual_vol = annual_volatility(returns);
        Self {
            annual_return: annualised_return(cumulative),
            annual_vol,
            sharpe: sharpe_ratio(returns, risk_free_annual),
            max_drawdown: max_drawdown(drawdown),
            final_cum_return: cumulative.last().copied().and_then(finite),
        }
    }
}

// ─── Individual statistics ──────────────────────────────────────────

/// `final ^ (252 / days) - 1`.
pub fn annualised_return(cumulative: &[f64]) -> Option<f64> {
    let last = *cumulative.last()?;
    let years_inv = TRADING_DAYS_PER_YEAR / cumulative.len() as f64;
    finite(last.powf(years_inv) - 1.0)
}

/// Sample standard deviation scaled by `sqrt(252)`. Needs two or more days.
pub fn annual_volatility(returns: &[f64]) -> Option<f64> {
    sample_std(returns).and_then(|s| finite(s * TRADING_DAYS_PER_YEAR.sqrt()))
}

/// `(mean * 252 - rf) / (std * sqrt(252))`, only when std > 0.
pub fn sharpe_ratio(returns: &[f64], risk_free_annual: f64) -> Option<f64> {
    let std = sample_std(returns).filter(|s| *s > 0.0)?;
    let mean = mean(returns)?;
    finite(
        (mean * TRADING_DAYS_PER_YEAR - risk_free_annual) / (std * TRADING_DAYS_PER_YEAR.sqrt()),
    )
}

/// Most negative drawdown.
pub fn max_drawdown(drawdown: &[f64]) -> Option<f64> {
    drawdown
        .iter()
        .copied()
        .filter(|d| d.is_finite())
        .reduce(f64::min)
}

// ─── Helpers ────────────────────────────────────────────────────────

fn finite(x: f64) -> Option<f64> {
    x.is_finite().then_some(x)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    finite(values.iter().sum::<f64>() / values.len() as f64)
}

/// Bessel-corrected standard deviation. A constant series is exactly 0.
fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    if values.windows(2).all(|w| w[0] == w[1]) {
        return Some(0.0);
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    finite(var.sqrt())
}
