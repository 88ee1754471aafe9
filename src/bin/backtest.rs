//! Grid-DCA Backtest CLI
//!
//! Single-symbol runs, batch parameter sweeps and shared-capital
//! portfolio simulations over CSV price history.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use dcasim::application::batch::{BatchProgress, BatchRunner, ParameterRanges, RankMetric};
use dcasim::application::portfolio::{PortfolioConfig, PortfolioSimulator};
use dcasim::application::reporting::Reporter;
use dcasim::application::simulator::Simulator;
use dcasim::domain::market;
use dcasim::domain::params::StrategyParams;
use dcasim::domain::ports::{BarSource, MembershipWindow};
use dcasim::infrastructure::csv_bars::CsvBarSource;
use dcasim::infrastructure::memory::{StaticBetaSource, StaticMembershipSource};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about = "Grid-DCA historical strategy simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a single symbol
    Run {
        /// Symbol to simulate (expects <data_dir>/<SYMBOL>.csv)
        #[arg(short, long)]
        symbol: String,

        /// Directory with per-symbol CSV files
        #[arg(long, default_value = "data")]
        data_dir: String,

        /// Start date (YYYY-MM-DD), defaults to the first bar
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD), defaults to the last bar
        #[arg(long)]
        end: Option<String>,

        /// TOML file overriding strategy parameters
        #[arg(long)]
        params: Option<String>,

        /// Print the full transaction ledger
        #[arg(long)]
        transactions: bool,

        /// Output JSON file for the run result
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Run a parameter sweep over one or many symbols
    Batch {
        /// Comma-separated list of symbols
        #[arg(short, long)]
        symbols: String,

        #[arg(long, default_value = "data")]
        data_dir: String,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,

        /// TOML file with parameter ranges
        #[arg(long)]
        grid: Option<String>,

        /// Ranking metric (total-return, cagr, sharpe, win-rate, drawdown)
        #[arg(long, default_value = "total-return")]
        metric: String,

        /// Number of top results to display
        #[arg(short, long, default_value = "10")]
        top_n: usize,

        /// Output JSON file for the full report
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Run a multi-symbol portfolio over a shared capital pool
    Portfolio {
        /// TOML portfolio configuration
        #[arg(short, long)]
        config: String,

        #[arg(long, default_value = "data")]
        data_dir: String,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,

        /// Output JSON file for the portfolio result
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// TOML shape of `backtest portfolio --config`.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct PortfolioFile {
    total_capital: Option<f64>,
    margin_percent: Option<f64>,
    symbols: Vec<String>,
    beta_coefficient: Option<f64>,
    params: StrategyParams,
    /// Per-symbol beta overrides enabling beta scaling.
    betas: BTreeMap<String, f64>,
    /// Per-symbol index-constituency windows.
    membership: BTreeMap<String, MembershipWindow>,
}

fn main() -> Result<()> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let cli = Cli::parse();
    let reporter = Reporter;

    match cli.command {
        Commands::Run {
            symbol,
            data_dir,
            start,
            end,
            params,
            transactions,
            output,
        } => {
            let params = load_params(params.as_deref())?;
            let source = CsvBarSource::new(&data_dir);
            let bars = source.bars(&symbol, parse_date(start.as_deref())?, parse_date(end.as_deref())?)?;
            market::ensure_min_history(&symbol, &bars)?;

            let result = Simulator::new(params)?.run(&symbol, &bars)?;
            reporter.print_run_summary(&result);
            if transactions {
                reporter.print_transactions(&result);
            }
            if let Some(path) = output {
                reporter.export_json(&result, &path)?;
                info!("result written to {}", path);
            }
        }
        Commands::Batch {
            symbols,
            data_dir,
            start,
            end,
            grid,
            metric,
            top_n,
            output,
        } => {
            let symbol_list: Vec<String> =
                symbols.split(',').map(|s| s.trim().to_string()).collect();
            let ranges = load_ranges(grid.as_deref())?;
            let metric = RankMetric::from_str(&metric)
                .map_err(|e| anyhow::anyhow!(e))
                .context("invalid --metric")?;

            let source = CsvBarSource::new(&data_dir);
            let start = parse_date(start.as_deref())?;
            let end = parse_date(end.as_deref())?;
            let mut bars_by_symbol = BTreeMap::new();
            for symbol in &symbol_list {
                let bars = source.bars(symbol, start, end)?;
                market::ensure_min_history(symbol, &bars)?;
                bars_by_symbol.insert(symbol.clone(), bars);
            }

            let total = ranges.combination_count() * bars_by_symbol.len();
            println!(
                "🚀 sweeping {} combinations across {} symbol(s)...",
                ranges.combination_count(),
                bars_by_symbol.len()
            );

            // fire-and-forget progress printer; the runner never blocks on it
            let (tx, rx) = crossbeam_channel::unbounded::<BatchProgress>();
            let stride = (total / 20).max(1);
            let printer = std::thread::spawn(move || {
                for progress in rx.iter() {
                    if progress.completed % stride == 0 || progress.completed == progress.total {
                        println!("  progress: {}/{}", progress.completed, progress.total);
                    }
                }
            });

            let report = BatchRunner::new(ranges)
                .with_rank_metric(metric)
                .with_top_n(top_n)
                .run(&bars_by_symbol, Some(&tx), None);
            drop(tx);
            printer.join().ok();

            reporter.print_batch_table(&report);
            if let Some(path) = output {
                reporter.export_json(&report, &path)?;
                info!("report written to {}", path);
            }
        }
        Commands::Portfolio {
            config,
            data_dir,
            start,
            end,
            output,
        } => {
            let file: PortfolioFile = toml::from_str(
                &std::fs::read_to_string(&config)
                    .context(format!("Failed to read portfolio config: {}", config))?,
            )
            .context(format!("Failed to parse portfolio config TOML: {}", config))?;

            let mut portfolio = PortfolioConfig {
                symbols: file.symbols.clone(),
                ..PortfolioConfig::default()
            };
            if let Some(capital) = file.total_capital {
                portfolio.total_capital = capital;
            }
            if let Some(margin) = file.margin_percent {
                portfolio.margin_percent = margin;
            }
            if let Some(coefficient) = file.beta_coefficient {
                portfolio.beta_coefficient = coefficient;
            }

            let mut params = file.params.clone();
            if !file.betas.is_empty() {
                params.enable_beta_scaling = true;
            }
            let mut betas = StaticBetaSource::new();
            for (symbol, beta) in &file.betas {
                betas.insert(symbol, *beta, true);
            }
            let mut membership = StaticMembershipSource::new();
            for (symbol, window) in &file.membership {
                membership.insert(symbol, *window);
            }

            let source = CsvBarSource::new(&data_dir);
            let start = parse_date(start.as_deref())?;
            let end = parse_date(end.as_deref())?;
            for symbol in &portfolio.symbols {
                let bars = source.bars(symbol, start, end)?;
                market::ensure_min_history(symbol, &bars)?;
            }

            let result = PortfolioSimulator::new(&source)
                .with_beta_source(&betas)
                .with_membership_source(&membership)
                .run(&portfolio, &params, start, end)?;

            reporter.print_portfolio_summary(&result);
            if let Some(path) = output {
                reporter.export_json(&result, &path)?;
                info!("result written to {}", path);
            }
        }
    }

    Ok(())
}

/// Parses an optional `YYYY-MM-DD` argument.
fn parse_date(value: Option<&str>) -> Result<Option<NaiveDate>> {
    value
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").context(format!("Invalid date: {}", s))
        })
        .transpose()
}

/// Loads strategy parameters from TOML, falling back to defaults.
fn load_params(path: Option<&str>) -> Result<StrategyParams> {
    let Some(path) = path else {
        info!("using default strategy parameters");
        return Ok(StrategyParams::default());
    };
    let content =
        std::fs::read_to_string(path).context(format!("Failed to read params file: {}", path))?;
    toml::from_str(&content).context(format!("Failed to parse params TOML: {}", path))
}

/// Loads batch parameter ranges from TOML, falling back to defaults.
fn load_ranges(path: Option<&str>) -> Result<ParameterRanges> {
    let Some(path) = path else {
        info!("using default parameter ranges");
        return Ok(ParameterRanges::default());
    };
    let content =
        std::fs::read_to_string(path).context(format!("Failed to read grid config: {}", path))?;
    toml::from_str(&content).context(format!("Failed to parse grid config TOML: {}", path))
}
