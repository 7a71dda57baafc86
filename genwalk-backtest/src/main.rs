//! genwalk-backtest CLI
//!
//! Genetic optimization of an SMA/RSI long-only strategy with
//! warm-up-aware walk-forward validation.
//!
//! # Usage
//!
//! ```bash
//! # Inspect a price file
//! genwalk-backtest inspect --config config/default.toml --data data/BTC-USD_1d.csv
//!
//! # Run a single backtest with explicit parameters
//! genwalk-backtest backtest --data data --params '{"SMA_F":20,"SMA_S":100,"RSI_P":14,"RSI_UP":70,"RSI_LO":30,"SL":0.05,"TP":0.1}'
//!
//! # Optimize on a 70/30 train/test split
//! genwalk-backtest optimize --config config/default.toml --data data --population 50 --generations 10
//!
//! # Full walk-forward analysis with CSV/JSON export
//! genwalk-backtest walk-forward --config config/default.toml --data data --output results
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use genwalk_backtest::backtest::BacktestEngine;
use genwalk_backtest::config::AppConfig;
use genwalk_backtest::data::{DataManager, DataSource};
use genwalk_backtest::genetic::StrategyParams;
use genwalk_backtest::metrics::MetricsCalculator;
use genwalk_backtest::report::{
    equity_dataframe, export_walk_forward, trades_dataframe, write_csv, write_json,
};
use genwalk_backtest::validation::DataIntegrityValidator;
use genwalk_backtest::walkforward::{SplitValidator, WalkForwardAnalyzer, WalkForwardReport};

const SEPARATOR: &str = "============================================================";

#[derive(Parser)]
#[command(name = "genwalk-backtest")]
#[command(about = "Genetic strategy optimization with walk-forward validation")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Clone)]
struct DataArgs {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Price file, or directory holding `{ticker}_{interval}.csv|parquet`
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Ticker symbol (overrides the config)
    #[arg(short, long)]
    ticker: Option<String>,
}

/// Optimizer overrides.
#[derive(Args, Clone)]
struct SearchArgs {
    /// Population size
    #[arg(long)]
    population: Option<usize>,

    /// Number of generations
    #[arg(long)]
    generations: Option<usize>,

    /// RNG seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load data and print range, sample rows and integrity checks
    Inspect {
        #[command(flatten)]
        input: DataArgs,
    },

    /// Run a single backtest
    Backtest {
        #[command(flatten)]
        input: DataArgs,

        /// Strategy parameters as JSON (`SMA_F`, `SMA_S`, `RSI_P`, `RSI_UP`, `RSI_LO`, `SL`, `TP`)
        #[arg(short, long)]
        params: Option<String>,

        /// Directory for trade and equity CSV files
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Optimize on a single train/test split
    Optimize {
        #[command(flatten)]
        input: DataArgs,

        #[command(flatten)]
        search: SearchArgs,

        /// Directory for the JSON report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run walk-forward analysis with per-window optimization
    WalkForward {
        #[command(flatten)]
        input: DataArgs,

        #[command(flatten)]
        search: SearchArgs,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,
    },
}

/// Load the config file (or defaults) and apply CLI overrides.
fn load_config(args: &DataArgs) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            AppConfig::from_toml_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?
        }
        None => AppConfig::default(),
    };

    if let Some(ticker) = &args.ticker {
        config.data.ticker = ticker.clone();
    }
    if let Some(data) = &args.data {
        if data.is_dir() {
            config.data.data_dir = data.clone();
        } else {
            config.data.file = Some(data.clone());
        }
    }

    Ok(config)
}

fn apply_search_args(config: &mut AppConfig, search: &SearchArgs, walk_forward: bool) {
    if let Some(population) = search.population {
        if walk_forward {
            config.walk_forward.window_population = population;
        } else {
            config.evolution.population_size = population;
        }
    }
    if let Some(generations) = search.generations {
        if walk_forward {
            config.walk_forward.window_generations = generations;
        } else {
            config.evolution.generations = generations;
        }
    }
    if search.seed.is_some() {
        config.evolution.seed = search.seed;
    }
}

/// Stop flag set on Ctrl-C.
fn install_stop_handler() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing the current generation");
            handler_flag.store(true, Ordering::Relaxed);
        }
    });
    flag
}

fn cmd_inspect(config: AppConfig) -> Result<()> {
    let manager = DataManager::new(config.data.clone());
    let series = manager
        .get_full_data()
        .with_context(|| format!("Failed to load data for {}", config.data.ticker))?;

    println!("{}", SEPARATOR);
    println!("Data: {}", config.data.ticker);
    println!("{}", SEPARATOR);
    println!("Bars: {}", series.len());
    if let (Some(first), Some(last)) = (series.first_date(), series.last_date()) {
        println!("Range: {} to {}", first, last);
    }

    let bars = series.bars();
    let head = bars.len().min(5);
    let tail_start = bars.len().saturating_sub(5).max(head);
    println!(
        "\n{:<12} {:>12} {:>12} {:>12} {:>12} {:>14}",
        "Date", "Open", "High", "Low", "Close", "Volume"
    );
    for bar in bars[..head].iter().chain(&bars[tail_start..]) {
        println!(
            "{:<12} {:>12.4} {:>12.4} {:>12.4} {:>12.4} {:>14.0}",
            bar.date, bar.open, bar.high, bar.low, bar.close, bar.volume
        );
    }

    let report = DataIntegrityValidator::new().validate(&config.data.ticker, bars);
    println!("\n{}", report.summary());
    for check in &report.checks {
        let mark = if check.passed { "PASS" } else { "FAIL" };
        println!("  [{}] {}: {}", mark, check.name, check.message);
        if let Some(details) = &check.details {
            println!("         {}", details);
        }
    }

    Ok(())
}

fn cmd_backtest(config: AppConfig, params: Option<String>, output: Option<PathBuf>) -> Result<()> {
    let params = match params {
        Some(json) => serde_json::from_str::<StrategyParams>(&json)
            .context("Failed to parse --params JSON")?,
        None => StrategyParams::default(),
    };

    let manager = DataManager::new(config.data.clone());
    let series = manager
        .get_full_data()
        .with_context(|| format!("Failed to load data for {}", config.data.ticker))?;

    let engine = BacktestEngine::for_ticker(config.backtest.clone(), &config.data.ticker);
    let result = engine
        .run_with_data(&params, series.bars(), None)
        .context("Backtest failed")?;
    let metrics = MetricsCalculator::calculate(&result);

    println!("{}", SEPARATOR);
    println!("{}", result.summary());
    println!("{}", SEPARATOR);
    println!("{}", metrics.summary());

    if let Some(dir) = output {
        std::fs::create_dir_all(&dir)?;
        let trades_path = dir.join("trades.csv");
        write_csv(&mut trades_dataframe(&result.trades)?, &trades_path)?;
        let equity_path = dir.join("equity.csv");
        write_csv(&mut equity_dataframe(&result.equity_curve)?, &equity_path)?;
        info!(
            "Wrote {} and {}",
            trades_path.display(),
            equity_path.display()
        );
    }

    Ok(())
}

async fn cmd_optimize(config: AppConfig, output: Option<PathBuf>) -> Result<()> {
    let stop = install_stop_handler();
    let ticker = config.data.ticker.clone();

    let report = tokio::task::spawn_blocking(move || -> Result<_> {
        let manager = DataManager::new(config.data.clone());
        let series = manager
            .get_full_data()
            .with_context(|| format!("Failed to load data for {}", config.data.ticker))?;
        let engine = BacktestEngine::for_ticker(config.backtest.clone(), &config.data.ticker);

        let report = SplitValidator::new(&engine)
            .with_config(config.split.clone())
            .with_evolution_config(config.evolution.clone())
            .with_fitness_config(config.fitness.clone())
            .with_bounds(config.gene_bounds)
            .with_stop_flag(stop)
            .run(&series)
            .context("Split optimization failed")?;
        Ok(report)
    })
    .await
    .context("Optimization task panicked")??;

    println!("{}", SEPARATOR);
    println!("Split Optimization: {}", ticker);
    println!("{}", SEPARATOR);
    print!("{}", report.summary());
    println!("\n{:<5} {:>6} {:>10} {:>10} {:>10} {:>10}", "Gen", "Evals", "Avg", "Std", "Min", "Max");
    for stats in &report.logbook {
        println!(
            "{:<5} {:>6} {:>10.2} {:>10.2} {:>10.2} {:>10.2}",
            stats.generation, stats.evaluations, stats.avg, stats.std, stats.min, stats.max
        );
    }

    if let Some(dir) = output {
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("split_optimization.json");
        write_json(&report, &path)?;
        info!("Wrote {}", path.display());
    }

    Ok(())
}

async fn cmd_walk_forward(config: AppConfig, output: PathBuf) -> Result<()> {
    let stop = install_stop_handler();

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );
    pb.set_message(config.data.ticker.clone());
    let progress = pb.clone();

    let report: WalkForwardReport = tokio::task::spawn_blocking(move || -> Result<_> {
        let manager = DataManager::new(config.data.clone());
        let engine = BacktestEngine::for_ticker(config.backtest.clone(), &config.data.ticker);

        let report = WalkForwardAnalyzer::new(&manager, &engine)
            .with_ticker(config.data.ticker.clone())
            .with_config(config.walk_forward.clone())
            .with_evolution_config(config.evolution.clone())
            .with_fitness_config(config.fitness.clone())
            .with_bounds(config.gene_bounds)
            .with_stop_flag(stop)
            .with_progress(move |p| {
                progress.set_length(p.total as u64);
                progress.set_position(p.processed as u64);
                progress.set_message(format!("window {} {}", p.window.index + 1, p.window.test_label()));
            })
            .run()
            .context("Walk-forward analysis failed")?;
        Ok(report)
    })
    .await
    .context("Walk-forward task panicked")??;
    pb.finish_and_clear();

    println!("{}", SEPARATOR);
    print!("{}", report.summary_table());
    println!("{}", SEPARATOR);

    let paths = export_walk_forward(&report, &output)
        .with_context(|| format!("Failed to export results to {}", output.display()))?;
    println!("Windows CSV: {}", paths.windows_csv.display());
    println!("Report JSON: {}", paths.report_json.display());

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let directive = if cli.verbose {
        "genwalk_backtest=debug"
    } else {
        "genwalk_backtest=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .init();

    match cli.command {
        Commands::Inspect { input } => {
            let config = load_config(&input)?;
            cmd_inspect(config)?;
        }
        Commands::Backtest {
            input,
            params,
            output,
        } => {
            let config = load_config(&input)?;
            cmd_backtest(config, params, output)?;
        }
        Commands::Optimize {
            input,
            search,
            output,
        } => {
            let mut config = load_config(&input)?;
            apply_search_args(&mut config, &search, false);
            config.validate()?;
            cmd_optimize(config, output).await?;
        }
        Commands::WalkForward {
            input,
            search,
            output,
        } => {
            let mut config = load_config(&input)?;
            apply_search_args(&mut config, &search, true);
            config.validate()?;
            cmd_walk_forward(config, output).await?;
        }
    }

    Ok(())
}
