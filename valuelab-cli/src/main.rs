//! ValueLab CLI: download, score, run, sweep and cache management commands.
//!
//! Commands:
//! - `download` fetches prices from Yahoo Finance into the Parquet cache
//! - `score` prints the valuation ranking for the latest prices
//! - `run` executes one backtest and writes its artifacts
//! - `sweep` runs a top-N by rebalance-frequency grid on shared data
//! - `cache status` / `cache clean` inspect and prune the cache

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use valuelab_core::data::{
    download_symbols, CircuitBreaker, ParquetCache, PriceProvider, StdoutProgress, YahooProvider,
};
use valuelab_core::engine::{RebalanceAnchor, RebalanceFrequency, StatsRecord};
use valuelab_core::valuation::{Score, ScoreMap};
use valuelab_runner::{
    load_for_config, run_backtest, run_sweep, scorer_for, ArtifactManager, BacktestReport,
    DataConfig, ParamGrid, RunConfig, SourceKind,
};

#[derive(Parser)]
#[command(
    name = "valuelab",
    about = "ValueLab CLI: valuation-ranked portfolio backtests"
)]
struct Cli {
    /// Log at debug level (RUST_LOG still takes precedence).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download market data from Yahoo Finance and cache as Parquet.
    Download {
        /// Symbols to download (e.g., AAPL MSFT AMD).
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Start date (YYYY-MM-DD). Defaults to 2018-01-01.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,

        /// Force re-download even if cached.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// Print the valuation ranking at the latest available prices.
    Score {
        #[command(flatten)]
        run: RunArgs,

        /// Print the score map as JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Execute a single backtest and save its artifacts.
    Run {
        #[command(flatten)]
        run: RunArgs,

        /// Output directory for run artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Print the summary only; write nothing.
        #[arg(long, default_value_t = false)]
        no_save: bool,
    },
    /// Run every top-N and rebalance-frequency combination on the same data.
    Sweep {
        #[command(flatten)]
        run: RunArgs,

        /// Top-N values to try (comma-separated). Defaults to 1..=10.
        #[arg(long, value_delimiter = ',')]
        top_ns: Vec<usize>,

        /// Rebalance frequencies to try (comma-separated). Defaults to both.
        #[arg(long, value_delimiter = ',')]
        rebalances: Vec<RebalanceFrequency>,

        /// Run grid points one after another instead of in parallel.
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// How many of the best runs to print.
        #[arg(long, default_value_t = 10)]
        show: usize,

        /// Output directory for sweep.csv.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cache size, symbol count, and date ranges.
    Status {
        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// Remove cached symbols not refreshed within the given number of days.
    Clean {
        /// Remove symbols cached more than this many days ago.
        #[arg(long)]
        unused_days: u64,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,

        /// Actually delete (without this flag, only previews what would be removed).
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
}

/// Config file plus command-line overrides, shared by score/run/sweep.
#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Path to a TOML config file. Built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tickers (comma-separated), e.g. AAPL,MSFT,AMD.
    #[arg(long, value_delimiter = ',')]
    tickers: Vec<String>,

    /// Start date (YYYY-MM-DD).
    #[arg(long)]
    start: Option<String>,

    /// End date (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    end: Option<String>,

    /// Price source: yahoo, csv or synthetic.
    #[arg(long)]
    source: Option<SourceKind>,

    /// Long-format price CSV (Date,Ticker,Close). Implies --source csv.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Number of tickers held after each rebalance.
    #[arg(long)]
    top_n: Option<usize>,

    /// Rebalance frequency: monthly or quarterly.
    #[arg(long)]
    rebalance: Option<RebalanceFrequency>,

    /// Rebalance anchor: period-start or period-end.
    #[arg(long)]
    anchor: Option<RebalanceAnchor>,

    /// Annual risk-free rate as a fraction (0.04 = 4%).
    #[arg(long)]
    risk_free: Option<f64>,

    /// Peer P/E ratios, e.g. "AAPL:25,MSFT:30".
    #[arg(long)]
    peer_pes: Option<String>,

    /// Offline mode: serve from the cache only.
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Fall back to synthetic prices when real data is unavailable.
    #[arg(long, default_value_t = false)]
    allow_synthetic: bool,

    /// Cache directory.
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

impl RunArgs {
    /// Load the base config and apply overrides. The result is validated.
    fn resolve(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_file(path)?,
            None => RunConfig::default(),
        };

        let data = &mut config.data;
        if !self.tickers.is_empty() {
            data.tickers = self.tickers.clone();
        }
        if let Some(start) = &self.start {
            data.start_date = parse_date(start)?;
        }
        if let Some(end) = &self.end {
            data.end_date = Some(parse_date(end)?);
        }
        if let Some(source) = self.source {
            data.source = source;
        }
        if let Some(csv) = &self.csv {
            data.csv_path = Some(csv.clone());
            if self.source.is_none() {
                data.source = SourceKind::Csv;
            }
        }
        if let Some(dir) = &self.cache_dir {
            data.cache_dir = dir.clone();
        }
        data.offline |= self.offline;
        data.allow_synthetic |= self.allow_synthetic;

        let strategy = &mut config.strategy;
        if let Some(top_n) = self.top_n {
            strategy.top_n = top_n;
        }
        if let Some(rebalance) = self.rebalance {
            strategy.rebalance = rebalance;
        }
        if let Some(anchor) = self.anchor {
            strategy.anchor = anchor;
        }
        if let Some(rf) = self.risk_free {
            strategy.risk_free_annual = rf;
        }
        if let Some(peers) = &self.peer_pes {
            config.valuation.peer_pes = peers.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Download {
            symbols,
            start,
            end,
            force,
            cache_dir,
        } => run_download(symbols, start, end, force, cache_dir),
        Commands::Score { run, json } => run_score(&run, json),
        Commands::Run {
            run,
            output_dir,
            no_save,
        } => run_backtest_cmd(&run, &output_dir, no_save),
        Commands::Sweep {
            run,
            top_ns,
            rebalances,
            sequential,
            show,
            output_dir,
        } => run_sweep_cmd(&run, top_ns, rebalances, !sequential, show, &output_dir),
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir } => run_cache_status(&cache_dir),
            CacheAction::Clean {
                unused_days,
                cache_dir,
                confirm,
            } => run_cache_clean(&cache_dir, unused_days, confirm),
        },
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .init();
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD"))
}

/// Yahoo provider for configs that may go to the network.
fn provider_for(config: &RunConfig) -> Result<Option<YahooProvider>> {
    if config.data.source != SourceKind::Yahoo || config.data.offline {
        return Ok(None);
    }
    let breaker = Arc::new(CircuitBreaker::default_provider());
    Ok(Some(YahooProvider::new(breaker)?))
}

fn run_download(
    symbols: Vec<String>,
    start: Option<String>,
    end: Option<String>,
    force: bool,
    cache_dir: PathBuf,
) -> Result<()> {
    let start = match start {
        Some(s) => parse_date(&s)?,
        None => DataConfig::default().start_date,
    };
    let end = match end {
        Some(s) => parse_date(&s)?,
        None => chrono::Local::now().date_naive(),
    };
    if start > end {
        bail!("start date {start} is after end date {end}");
    }

    let symbols: Vec<String> = symbols.iter().map(|s| s.trim().to_uppercase()).collect();
    let refs: Vec<&str> = symbols.iter().map(String::as_str).collect();

    let breaker = Arc::new(CircuitBreaker::default_provider());
    let provider = YahooProvider::new(breaker)?;
    let cache = ParquetCache::new(&cache_dir);

    println!(
        "Downloading {} symbol(s) from {start} to {end} into {}",
        refs.len(),
        cache_dir.display()
    );
    let summary = download_symbols(&provider, &cache, &refs, start, end, force, &StdoutProgress);

    if !summary.all_succeeded() {
        for (symbol, err) in &summary.errors {
            eprintln!("  {symbol}: {err}");
        }
        bail!("{} of {} downloads failed", summary.failed, summary.total);
    }
    Ok(())
}

fn run_score(args: &RunArgs, json: bool) -> Result<()> {
    let config = args.resolve()?;
    let cache = ParquetCache::new(&config.data.cache_dir);
    let provider = provider_for(&config)?;

    let data = load_for_config(
        &config,
        &cache,
        provider.as_ref().map(|p| p as &dyn PriceProvider),
        Some(&StdoutProgress),
        None,
    )?;
    let scores = ScoreMap::from_latest(&data.table, &scorer_for(&config));

    if json {
        println!("{}", serde_json::to_string_pretty(&scores)?);
        return Ok(());
    }

    let as_of = data
        .table
        .dates()
        .last()
        .map_or_else(|| "-".to_string(), |d| d.to_string());
    println!();
    println!("=== Valuation Scores (as of {as_of}) ===");
    if data.has_synthetic {
        println!("WARNING: synthetic prices in use; scores are illustrative only.");
    }
    println!();
    print_scores(&scores);
    Ok(())
}

fn print_scores(scores: &ScoreMap) {
    println!(
        "{:>4}  {:<8} {:>10} {:>12} {:>12}",
        "Rank", "Ticker", "Score", "DCF", "Comparables"
    );
    println!("{}", "-".repeat(50));
    for (rank, (ticker, valuation)) in scores.ranked().into_iter().enumerate() {
        let score = match valuation.score {
            Score::Scored(v) => format!("{v:.4}"),
            Score::Unscored => "n/a".to_string(),
        };
        let comparables = valuation
            .comparables_estimate
            .map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
        println!(
            "{:>4}  {:<8} {:>10} {:>12.2} {:>12}",
            rank + 1,
            ticker,
            score,
            valuation.dcf_value,
            comparables
        );
    }
}

fn run_backtest_cmd(args: &RunArgs, output_dir: &Path, no_save: bool) -> Result<()> {
    let config = args.resolve()?;
    let cache = ParquetCache::new(&config.data.cache_dir);
    let provider = provider_for(&config)?;

    let report = run_backtest(
        &config,
        &cache,
        provider.as_ref().map(|p| p as &dyn PriceProvider),
        Some(&StdoutProgress),
        None,
    )?;

    print_summary(&report);

    if !no_save {
        let manager = ArtifactManager::new(output_dir)?;
        let paths = manager.save_run(&report)?;
        info!(dir = %paths.run_dir.display(), "artifacts saved");
        println!();
        println!("Artifacts: {}", paths.run_dir.display());
    }
    Ok(())
}

fn run_sweep_cmd(
    args: &RunArgs,
    top_ns: Vec<usize>,
    rebalances: Vec<RebalanceFrequency>,
    parallel: bool,
    show: usize,
    output_dir: &Path,
) -> Result<()> {
    let base = args.resolve()?.pinned();
    let cache = ParquetCache::new(&base.data.cache_dir);
    let provider = provider_for(&base)?;

    let defaults = ParamGrid::default();
    let grid = ParamGrid {
        top_ns: if top_ns.is_empty() { defaults.top_ns } else { top_ns },
        rebalances: if rebalances.is_empty() {
            defaults.rebalances
        } else {
            rebalances
        },
    };
    if grid.size() == 0 {
        bail!("sweep grid is empty");
    }

    let data = load_for_config(
        &base,
        &cache,
        provider.as_ref().map(|p| p as &dyn PriceProvider),
        Some(&StdoutProgress),
        None,
    )?;

    println!("Running {} configurations...", grid.size());
    let results = run_sweep(&grid, &base, &data, parallel)?;

    println!();
    println!("=== Sweep Results (best {} by Sharpe) ===", show.min(results.len()));
    if data.has_synthetic {
        println!("WARNING: synthetic prices in use; results are illustrative only.");
    }
    println!(
        "{:>5} {:<10} {:>10} {:>10} {:>8} {:>10}",
        "TopN", "Rebalance", "Return", "Vol", "Sharpe", "MaxDD"
    );
    println!("{}", "-".repeat(58));
    for report in results.sorted_by_sharpe().into_iter().take(show) {
        let stats = &report.output.stats;
        println!(
            "{:>5} {:<10} {:>10} {:>10} {:>8} {:>10}",
            report.config.strategy.top_n,
            report.config.strategy.rebalance.to_string(),
            fmt_pct(stats.annual_return),
            fmt_pct(stats.annual_vol),
            fmt_ratio(stats.sharpe),
            fmt_pct(stats.max_drawdown),
        );
    }

    let manager = ArtifactManager::new(output_dir)?;
    let path = manager.save_sweep(&results)?;
    println!();
    println!("Sweep table: {}", path.display());
    Ok(())
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let cache = ParquetCache::new(cache_dir);
    let metas = cache.list();
    if metas.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    let rows: Vec<(String, String, String, u64)> = metas
        .iter()
        .map(|meta| {
            let size = dir_size(&cache_dir.join(format!("symbol={}", meta.symbol)));
            (
                meta.symbol.clone(),
                format!("{} to {}", meta.start_date, meta.end_date),
                format!("{} pts", meta.point_count),
                size,
            )
        })
        .collect();
    let total_size: u64 = rows.iter().map(|r| r.3).sum();

    println!("Cache: {}", cache_dir.display());
    println!("Symbols: {}", rows.len());
    println!("Total size: {}", format_size(total_size));
    println!();
    println!("{:<8} {:<25} {:<12} {:>10}", "Symbol", "Date Range", "Points", "Size");
    println!("{}", "-".repeat(58));
    for (sym, range, points, size) in &rows {
        println!("{:<8} {:<25} {:<12} {:>10}", sym, range, points, format_size(*size));
    }

    Ok(())
}

fn run_cache_clean(cache_dir: &Path, unused_days: u64, confirm: bool) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let cutoff =
        chrono::Local::now().naive_local() - chrono::Duration::days(unused_days as i64);
    let cache = ParquetCache::new(cache_dir);
    let stale: Vec<String> = cache
        .list()
        .into_iter()
        .filter(|meta| meta.cached_at < cutoff)
        .map(|meta| meta.symbol)
        .collect();

    if stale.is_empty() {
        println!("No symbols older than {unused_days} days.");
        return Ok(());
    }

    if !confirm {
        println!("Would remove {} symbol(s):", stale.len());
        for symbol in &stale {
            println!("  {symbol}");
        }
        println!("\nRe-run with --confirm to delete.");
        return Ok(());
    }

    for symbol in &stale {
        cache.remove(symbol)?;
        println!("Removed {symbol}");
    }
    println!("Removed {} symbol(s).", stale.len());
    Ok(())
}

fn dir_size(path: &Path) -> u64 {
    let mut size = 0u64;
    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            if let Ok(meta) = entry.metadata() {
                size += meta.len();
            }
        }
    }
    size
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn fmt_pct(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}%", v * 100.0))
}

fn fmt_ratio(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.3}"))
}

fn print_stats_row(label: &str, portfolio: Option<f64>, benchmark: Option<f64>, pct: bool) {
    let fmt: fn(Option<f64>) -> String = if pct { fmt_pct } else { fmt_ratio };
    println!("{label:<16} {:>12} {:>12}", fmt(portfolio), fmt(benchmark));
}

fn print_summary(report: &BacktestReport) {
    let meta = &report.metadata;
    let strategy = &report.config.strategy;
    let (port, bench): (&StatsRecord, &StatsRecord) =
        (&report.output.stats, &report.output.benchmark_stats);

    println!();
    println!("=== Backtest Result ===");
    println!("Run ID:         {}", &report.run_id[..12]);
    println!("Tickers:        {}", meta.tickers.join(", "));
    if let (Some(first), Some(last)) = (meta.first_date, meta.last_date) {
        println!("Period:         {first} to {last} ({} days)", meta.trading_days);
    }
    println!(
        "Strategy:       top {} / {} ({:?} anchor)",
        strategy.top_n, strategy.rebalance, strategy.anchor
    );
    println!("Rebalances:     {}", report.output.rebalances.len());
    if report.has_synthetic {
        println!("WARNING: synthetic prices in use; results are illustrative only.");
    }
    println!();
    println!("{:<16} {:>12} {:>12}", "--- Metric ---", "Portfolio", "Benchmark");
    print_stats_row("Annual return", port.annual_return, bench.annual_return, true);
    print_stats_row("Annual vol", port.annual_vol, bench.annual_vol, true);
    print_stats_row("Sharpe", port.sharpe, bench.sharpe, false);
    print_stats_row("Max drawdown", port.max_drawdown, bench.max_drawdown, true);
    print_stats_row("Final cum.", port.final_cum_return, bench.final_cum_return, false);
    println!();
    println!("Last holdings:  {}", report.output.last_holdings().join(", "));
    println!("Run time:       {:.2}s", meta.duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let cli = Cli::parse_from([
            "valuelab",
            "run",
            "--tickers",
            "nvda,AMD",
            "--start",
            "2020-01-01",
            "--top-n",
            "1",
            "--rebalance",
            "quarterly",
            "--source",
            "synthetic",
        ]);
        let Commands::Run { run, .. } = cli.command else {
            panic!("expected run command");
        };
        let config = run.resolve().unwrap();
        assert_eq!(config.data.tickers, vec!["nvda", "AMD"]);
        assert_eq!(config.data.start_date, parse_date("2020-01-01").unwrap());
        assert_eq!(config.data.source, SourceKind::Synthetic);
        assert_eq!(config.strategy.top_n, 1);
        assert_eq!(config.strategy.rebalance, RebalanceFrequency::Quarterly);
    }

    #[test]
    fn csv_flag_implies_csv_source() {
        let args = RunArgs {
            csv: Some(PathBuf::from("prices.csv")),
            ..RunArgs::default()
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.data.source, SourceKind::Csv);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let args = RunArgs {
            top_n: Some(0),
            ..RunArgs::default()
        };
        assert!(args.resolve().is_err());
    }

    #[test]
    fn sweep_grid_lists_parse() {
        let cli = Cli::parse_from([
            "valuelab",
            "sweep",
            "--top-ns",
            "1,3,5",
            "--rebalances",
            "monthly,q",
        ]);
        let Commands::Sweep {
            top_ns, rebalances, ..
        } = cli.command
        else {
            panic!("expected sweep command");
        };
        assert_eq!(top_ns, vec![1, 3, 5]);
        assert_eq!(
            rebalances,
            vec![RebalanceFrequency::Monthly, RebalanceFrequency::Quarterly]
        );
    }

    #[test]
    fn bad_dates_are_reported() {
        assert!(parse_date("2024-13-01").is_err());
        assert!(parse_date("01/02/2024").is_err());
    }
}
