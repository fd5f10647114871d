//! Markdown run report.

use std::fmt::Write;

use valuelab_core::engine::StatsRecord;

use crate::runner::BacktestReport;

/// Rebalances listed in the report before the log is truncated.
const MAX_REBALANCE_ROWS: usize = 24;

fn pct(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:+.2}%", v * 100.0))
}

fn num(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

fn stats_rows(out: &mut String, portfolio: &StatsRecord, benchmark: &StatsRecord) {
    let rows = [
        ("Annual return", pct(portfolio.annual_return), pct(benchmark.annual_return)),
        ("Annual volatility", pct(portfolio.annual_vol), pct(benchmark.annual_vol)),
        ("Sharpe", num(portfolio.sharpe), num(benchmark.sharpe)),
        ("Max drawdown", pct(portfolio.max_drawdown), pct(benchmark.max_drawdown)),
        (
            "Final cumulative",
            num(portfolio.final_cum_return),
            num(benchmark.final_cum_return),
        ),
    ];
    out.push_str("| Metric | Portfolio | Benchmark |\n");
    out.push_str("|--------|-----------|-----------|\n");
    for (name, p, b) in rows {
        let _ = writeln!(out, "| {name} | {p} | {b} |");
    }
}

pub fn render_report(report: &BacktestReport) -> String {
    let cfg = &report.config;
    let meta = &report.metadata;
    let mut out = String::new();

    let _ = writeln!(out, "# ValueLab Run Report\n");
    let _ = writeln!(out, "Run ID: `{}`\n", report.run_id);
    if report.has_synthetic {
        out.push_str("> **Synthetic data.** Some prices were generated, not observed.\n\n");
    }

    out.push_str("## Setup\n\n");
    let period = match (meta.first_date, meta.last_date) {
        (Some(first), Some(last)) => format!("{first} to {last}"),
        _ => "n/a".to_string(),
    };
    let _ = writeln!(out, "- Period: {period} ({} trading days)", meta.trading_days);
    let _ = writeln!(out, "- Universe: {}", meta.tickers.join(", "));
    let _ = writeln!(
        out,
        "- Strategy: top {} by undervaluation, {} rebalance",
        cfg.strategy.top_n, cfg.strategy.rebalance
    );
    let _ = writeln!(
        out,
        "- Risk-free rate: {:.2}%",
        cfg.strategy.risk_free_annual * 100.0
    );
    let _ = writeln!(out, "- Dataset hash: `{}`\n", report.dataset_hash);

    out.push_str("## Performance\n\n");
    stats_rows(&mut out, &report.output.stats, &report.output.benchmark_stats);

    out.push_str("\n## Valuation Scores\n\n");
    out.push_str("| Rank | Ticker | Score | DCF value | Comparables |\n");
    out.push_str("|------|--------|-------|-----------|-------------|\n");
    for (i, (ticker, v)) in report.scores.ranked().into_iter().enumerate() {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {:.2} | {} |",
            i + 1,
            ticker,
            v.score.value().map_or_else(|| "unscored".into(), |s| format!("{s:+.4}")),
            v.dcf_value,
            num(v.comparables_estimate),
        );
    }

    let rebalances = &report.output.rebalances;
    let _ = writeln!(out, "\n## Rebalances ({})\n", rebalances.len());
    if rebalances.is_empty() {
        out.push_str("No rebalance date fell inside the price history.\n");
    } else {
        out.push_str("| Date | Selection |\n");
        out.push_str("|------|-----------|\n");
        let skip = rebalances.len().saturating_sub(MAX_REBALANCE_ROWS);
        if skip > 0 {
            let _ = writeln!(out, "| ... | {skip} earlier rebalances omitted |");
        }
        for event in rebalances.iter().skip(skip) {
            let picks = if event.selection.is_empty() {
                "(none)".to_string()
            } else {
                event.selection.join(", ")
            };
            let _ = writeln!(out, "| {} | {} |", event.date, picks);
        }
    }

    let last = report.output.last_holdings();
    let _ = writeln!(
        out,
        "\n## Last Holdings\n\n{}",
        if last.is_empty() {
            "(none)".to_string()
        } else {
            last.join(", ")
        }
    );

    out
}
