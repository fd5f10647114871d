//! Discounted-cash-flow and peer-multiple estimates.
//!
//! Both are pure functions over plain numbers. The cash flow and earnings
//! fed into them are proxies derived from price, not reported financials.

/// Present value of a cash flow growing at `growth_rate` for `years`, plus a
/// Gordon-growth terminal value discounted one period after the last year.
///
/// When `discount_rate <= terminal_growth` the perpetuity formula has no
/// finite value and the terminal value is the last projected cash flow.
pub fn dcf_value(
    current_cashflow: f64,
    growth_rate: f64,
    discount_rate: f64,
    years: u32,
    terminal_growth: f64,
) -> f64 {
    let years = years.max(1);
    let projected: Vec<f64> = (1..=years)
        .map(|i| current_cashflow * (1.0 + growth_rate).powi(i as i32))
        .collect();

    let last = projected.last().copied().unwrap_or(current_cashflow);
    let terminal = if discount_rate > terminal_growth {
        last * (1.0 + terminal_growth) / (discount_rate - terminal_growth)
    } else {
        last
    };

    projected
        .iter()
        .chain(std::iter::once(&terminal))
        .enumerate()
        .map(|(i, cf)| cf / (1.0 + discount_rate).powi(i as i32 + 1))
        .sum()
}

/// Price implied by applying a peer P/E to earnings per share.
pub fn comparables_estimate(eps: f64, peer_pe: f64) -> f64 {
    eps * peer_pe
}
