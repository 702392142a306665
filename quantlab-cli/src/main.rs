//! QuantLab CLI — run, batch, and signal commands.
//!
//! Commands:
//! - `run` — execute one backtest from a TOML config, optionally sweeping a
//!   parameter grid first
//! - `batch` — run a job file on a bounded worker pool, one child process
//!   per job
//! - `signal` — print today's signal for a config, optionally re-using the
//!   parameters from a saved preset file
//! - `batch-worker` — internal: executes exactly one batch job and exits
//!
//! Exit codes: 0 success, 1 config or data error, 3 the run completed but
//! produced zero trades.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use quantlab_core::data::{BarCache, ChartApiProvider};
use quantlab_core::strategy::{registry, StrategyKind};
use quantlab_runner::artifacts::{load_presets, save_run, PresetFile};
use quantlab_runner::batch::{run_batch, run_worker, BatchConfig, SubprocessExecutor};
use quantlab_runner::config::BacktestConfig;
use quantlab_runner::runner::{load_universe, run_backtest_from_data, BacktestResult};
use quantlab_runner::search::{search, SearchConfig, SearchMethod};

const CHART_API_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

const EXIT_OK: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_NO_TRADES: i32 = 3;

#[derive(Parser)]
#[command(name = "quantlab", about = "QuantLab — backtest optimization and validation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OptimizeArg {
    Grid,
    Random,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one backtest from a TOML config file.
    Run {
        /// Path to a TOML backtest config.
        #[arg(long)]
        config: PathBuf,

        /// Sweep the parameter grid first and run the winner.
        #[arg(long, value_enum)]
        optimize: Option<OptimizeArg>,

        /// Ranking metric for --optimize.
        #[arg(long, default_value = "sharpe")]
        metric: String,

        /// Random-search draw count for --optimize random.
        #[arg(long, default_value_t = 50)]
        n_iter: usize,

        /// Random-search seed.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Bar cache directory.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,

        /// Output directory for run artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Run a batch job file on a bounded worker pool.
    Batch {
        /// Path to a batch config (TOML or JSON).
        #[arg(long)]
        config: PathBuf,
    },
    /// Print today's signal for a config.
    Signal {
        /// Path to a TOML backtest config.
        #[arg(long)]
        config: PathBuf,

        /// Run directory holding a presets.json; its best parameters
        /// replace the config's.
        #[arg(long)]
        preset_dir: Option<PathBuf>,

        /// Bar cache directory.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// Internal: execute one batch job and exit.
    #[command(hide = true, name = "batch-worker")]
    BatchWorker {
        /// Path to the job JSON written by the scheduler.
        #[arg(long)]
        job: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_ERROR
        }
    };
    std::process::exit(code);
}

fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run {
            config,
            optimize,
            metric,
            n_iter,
            seed,
            cache_dir,
            output_dir,
        } => cmd_run(config, optimize, metric, n_iter, seed, cache_dir, output_dir),
        Commands::Batch { config } => cmd_batch(config),
        Commands::Signal {
            config,
            preset_dir,
            cache_dir,
        } => cmd_signal(config, preset_dir, cache_dir),
        Commands::BatchWorker { job } => cmd_batch_worker(job),
    }
}

// ─── run ─────────────────────────────────────────────────────────────

fn cmd_run(
    config_path: PathBuf,
    optimize: Option<OptimizeArg>,
    metric: String,
    n_iter: usize,
    seed: u64,
    cache_dir: PathBuf,
    output_dir: PathBuf,
) -> Result<i32> {
    let config = BacktestConfig::from_path(&config_path)?;
    config.validate()?;

    let cache = BarCache::new(&cache_dir);
    let provider = ChartApiProvider::new(CHART_API_URL)?;
    let joint = load_universe(&cache, &provider, &config)?;

    let (result, presets, optimized_universe) = match optimize {
        None => (run_backtest_from_data(&joint, &config)?, None, Vec::new()),
        Some(arg) => {
            let search_config = SearchConfig {
                method: match arg {
                    OptimizeArg::Grid => SearchMethod::Grid,
                    OptimizeArg::Random => SearchMethod::Random,
                },
                n_iter,
                seed,
                metric: metric.clone(),
                ..SearchConfig::default()
            };
            let outcome = search(&joint, &config, &search_config)?;
            let best = outcome
                .best()
                .context("search produced no ranked candidates")?;
            println!(
                "best {} = {:.4} with {:?} ({} candidates, {} failed)",
                metric,
                best.score,
                best.params,
                outcome.ranked.len(),
                outcome.failures.len()
            );
            let mut best_config = config.clone();
            best_config.params = best.params.clone();
            let result = run_backtest_from_data(&joint, &best_config)?;
            let presets = PresetFile {
                strategy: config.strategy.clone(),
                metric,
                presets: outcome.presets.clone(),
            };
            (result, Some(presets), outcome.optimized_universe)
        }
    };

    print_summary(&result);
    let run_dir = save_run(
        &result,
        &config.strategy,
        &config.universe,
        presets.as_ref(),
        &optimized_universe,
        &output_dir,
    )?;
    println!("artifacts saved to {}", run_dir.display());

    if result.trades.is_empty() {
        eprintln!("warning: run completed without a single trade");
        return Ok(EXIT_NO_TRADES);
    }
    Ok(EXIT_OK)
}

// ─── batch ───────────────────────────────────────────────────────────

fn cmd_batch(config_path: PathBuf) -> Result<i32> {
    let batch = BatchConfig::from_path(&config_path)?;
    let executor = SubprocessExecutor::current_exe()?;
    let report = run_batch(&batch, &executor)?;

    println!(
        "batch finished: {} succeeded, {} failed, summary at {}",
        report.succeeded,
        report.failed,
        batch.summary_path.display()
    );
    for row in report.rows.iter().filter(|r| r.error.is_some()) {
        eprintln!(
            "  {} failed: {}",
            row.job_id,
            row.error.as_deref().unwrap_or("")
        );
    }
    // Per-job failures are recorded, not fatal.
    Ok(EXIT_OK)
}

fn cmd_batch_worker(job_path: PathBuf) -> Result<i32> {
    let raw = std::fs::read_to_string(&job_path)
        .with_context(|| format!("failed to read {}", job_path.display()))?;
    let job: quantlab_runner::batch::BatchJobConfig = serde_json::from_str(&raw)?;
    let cache = BarCache::new(&job.cache_dir);
    let provider = ChartApiProvider::new(CHART_API_URL)?;
    run_worker(&job_path, &cache, &provider)?;
    Ok(EXIT_OK)
}

// ─── signal ──────────────────────────────────────────────────────────

fn cmd_signal(
    config_path: PathBuf,
    preset_dir: Option<PathBuf>,
    cache_dir: PathBuf,
) -> Result<i32> {
    let mut config = BacktestConfig::from_path(&config_path)?;
    if let Some(dir) = preset_dir {
        let presets = load_presets(&dir)?;
        let best = presets
            .presets
            .first()
            .context("preset file holds no presets")?;
        config.params = best.params.clone();
    }
    config.validate()?;

    let cache = BarCache::new(&cache_dir);
    let provider = ChartApiProvider::new(CHART_API_URL)?;
    let joint = load_universe(&cache, &provider, &config)?;

    let strategy = registry::build(&config.strategy)?;
    let mut latest: BTreeMap<String, f64> = BTreeMap::new();
    let mut as_of = None;
    match strategy.kind() {
        StrategyKind::Single => {
            for (symbol, table) in joint.iter() {
                let signal = strategy.signal(table, &config.params)?;
                if let (Some(value), Some(bar)) =
                    (signal.values.last(), table.bars().last())
                {
                    latest.insert(symbol.clone(), *value);
                    as_of = Some(as_of.map_or(bar.ts, |t: chrono::NaiveDateTime| t.max(bar.ts)));
                }
            }
        }
        StrategyKind::Portfolio => {
            let signals = strategy.portfolio_signals(&joint, &config.params)?;
            for (symbol, signal) in &signals {
                let Some(table) = joint.get(symbol) else { continue };
                if let (Some(value), Some(bar)) =
                    (signal.values.last(), table.bars().last())
                {
                    latest.insert(symbol.clone(), *value);
                    as_of = Some(as_of.map_or(bar.ts, |t: chrono::NaiveDateTime| t.max(bar.ts)));
                }
            }
        }
    }

    let out = serde_json::json!({
        "strategy": config.strategy,
        "params": config.params,
        "as_of": as_of.map(|t| t.to_string()),
        "signals": latest,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(EXIT_OK)
}

// ─── output ──────────────────────────────────────────────────────────

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    println!();
    println!("=== Backtest Result ===");
    println!("Run id:         {}", result.run_id);
    println!("Symbols:        {}", result.per_symbol.len());
    println!("Trades:         {}", m.trade_count);
    println!();
    println!("--- Performance ---");
    println!("Total Return:   {:.2}%", m.total_return * 100.0);
    println!("Annualized:     {:.2}%", m.annualized_return * 100.0);
    println!("Sharpe:         {:.3}", m.sharpe);
    println!("Sortino:        {:.3}", m.sortino);
    println!("Calmar:         {:.3}", m.calmar);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown * 100.0);
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    println!("Profit Factor:  {:.2}", m.profit_factor);
    println!();
}
