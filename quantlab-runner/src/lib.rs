//! QuantLab Runner — orchestration on top of `quantlab-core`.
//!
//! This crate builds on `quantlab-core` to provide:
//! - Config loading and validation with content-hashed run ids
//! - Single-backtest runner with equal-weight portfolio aggregation
//! - Grid and seeded random parameter search
//! - Walk-forward validation with train-only parameter selection
//! - Monte Carlo resampling of finished runs
//! - Batch scheduling with process-per-job isolation and JSONL status
//! - Run artifact persistence (metrics, equity, trades, presets)

pub mod artifacts;
pub mod batch;
pub mod config;
pub mod monte_carlo;
pub mod portfolio;
pub mod runner;
pub mod search;
pub mod walk_forward;

#[cfg(test)]
mod testutil;

pub use artifacts::{load_metrics, load_presets, save_run, MetricsManifest, PresetFile};
pub use batch::{
    execute_job, run_batch, run_worker, BatchConfig, BatchError, BatchJobConfig, BatchReport,
    BatchStatus, InProcessExecutor, JobExecutor, JobOutcome, JobState, OptimizationMode,
    StatusLog, SubprocessExecutor, SummaryRow,
};
pub use config::{BacktestConfig, CandleMode, ConfigError, RunId};
pub use monte_carlo::{
    monte_carlo, McError, MonteCarloConfig, MonteCarloReport, PercentileBand, ResampleMethod,
};
pub use portfolio::{aggregate_equal_weight, select_universe};
pub use runner::{
    load_universe, run_backtest_from_data, run_backtest_with_strategy, run_single_backtest,
    BacktestResult, RunError,
};
pub use search::{
    expand_grid, sample_grid, search, search_with_strategy, Candidate, SearchConfig, SearchError,
    SearchMethod, SearchOutcome,
};
pub use walk_forward::{
    walk_forward, WalkForwardConfig, WalkForwardError, WalkForwardReport, WindowReport,
};
