//! Batch scheduler — many jobs, bounded workers, isolated failures.
//!
//! A batch is an ordered job list run on a fixed-size rayon pool. Each job
//! is a full backtest config plus an optimization mode and an output
//! directory. The production executor spawns one OS child process per job
//! through the CLI's `batch-worker` subcommand, so a crashed or leaking job
//! never takes the scheduler down and a worker's memory is reclaimed the
//! moment its job ends. Tests swap in an in-process executor.
//!
//! Progress is appended to a JSONL status file (one JSON object per line,
//! safe to tail from another process) and the final per-job results land in
//! a summary CSV. A failed job becomes a failed row, never an aborted batch.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use quantlab_core::data::{BarCache, DataProvider};
use quantlab_core::metrics::MetricSet;

use crate::artifacts::{save_run, PresetFile};
use crate::config::{BacktestConfig, ConfigError};
use crate::runner::{load_universe, run_backtest_from_data, BacktestResult, RunError};
use crate::search::{search, SearchConfig, SearchError, SearchMethod};
use crate::walk_forward::{walk_forward, WalkForwardConfig, WalkForwardError};

// ─── Configuration ───────────────────────────────────────────────────

fn default_workers() -> usize {
    4
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OptimizationMode {
    /// Run the configured parameters as-is.
    Direct,
    /// Full grid sweep, then one run with the winner.
    Grid {
        #[serde(default)]
        search: SearchConfig,
    },
    /// Seeded random sweep, then one run with the winner.
    Random {
        #[serde(default)]
        search: SearchConfig,
    },
    WalkForward {
        walk_forward: WalkForwardConfig,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJobConfig {
    pub job_id: String,
    pub output_dir: PathBuf,
    /// Bar cache directory the worker reads through.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    pub mode: OptimizationMode,
    pub config: BacktestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    pub jobs: Vec<BatchJobConfig>,
    pub summary_path: PathBuf,
    pub status_path: PathBuf,
}

impl BatchConfig {
    /// Load from TOML or JSON, decided by extension.
    pub fn from_path(path: &Path) -> Result<Self, BatchError> {
        let raw = fs::read_to_string(path).map_err(|source| BatchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&raw)?
        } else {
            toml::from_str(&raw).map_err(|e| BatchError::Parse(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BatchError> {
        if self.jobs.is_empty() {
            return Err(BatchError::NoJobs);
        }
        let mut seen = std::collections::BTreeSet::new();
        for job in &self.jobs {
            if !seen.insert(&job.job_id) {
                return Err(BatchError::DuplicateJobId(job.job_id.clone()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("batch config parse error: {0}")]
    Parse(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("batch has no jobs")]
    NoJobs,
    #[error("duplicate job id '{0}'")]
    DuplicateJobId(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    WalkForward(#[from] WalkForwardError),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("worker pool error: {0}")]
    Pool(String),
}

// ─── Status log ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

/// One line of the JSONL status file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatus {
    pub job_id: String,
    pub state: JobState,
    pub ts: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Append-only JSONL status writer.
///
/// Each append reopens the file in append mode, so concurrent workers
/// interleave whole lines rather than bytes.
pub struct StatusLog {
    path: PathBuf,
}

impl StatusLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn append(&self, job_id: &str, state: JobState, message: Option<String>) {
        let record = BatchStatus {
            job_id: job_id.to_string(),
            state,
            ts: chrono::Utc::now().naive_utc(),
            message,
        };
        // Status is advisory; a full disk must not fail the batch.
        if let Err(e) = self.try_append(&record) {
            eprintln!("status log write failed: {e}");
        }
    }

    fn try_append(&self, record: &BatchStatus) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{json}")?;
        Ok(())
    }

    /// Read every well-formed line, skipping torn tails.
    pub fn read_all(&self) -> std::io::Result<Vec<BatchStatus>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(raw
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

// ─── Job execution ───────────────────────────────────────────────────

/// What a finished job reports back to the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id: String,
    pub run_dir: PathBuf,
    pub metrics: MetricSet,
    pub trade_count: usize,
}

/// Runs one job to completion. Implementations decide the isolation
/// boundary; the scheduler only sees outcome or error text.
pub trait JobExecutor: Send + Sync {
    fn execute(&self, job: &BatchJobConfig) -> Result<JobOutcome, String>;
}

/// The worker side of a job: load, optimize per mode, persist artifacts.
///
/// Shared by the in-process executor and the CLI `batch-worker` subcommand.
pub fn execute_job(
    job: &BatchJobConfig,
    cache: &BarCache,
    provider: &dyn DataProvider,
) -> Result<JobOutcome, BatchError> {
    job.config.validate()?;
    let joint = load_universe(cache, provider, &job.config)?;

    let (result, presets, optimized_universe) = match &job.mode {
        OptimizationMode::Direct => {
            let result = run_backtest_from_data(&joint, &job.config)?;
            (result, None, Vec::new())
        }
        OptimizationMode::Grid { search: sc } | OptimizationMode::Random { search: sc } => {
            let mut sc = sc.clone();
            sc.method = match job.mode {
                OptimizationMode::Random { .. } => SearchMethod::Random,
                _ => SearchMethod::Grid,
            };
            let outcome = search(&joint, &job.config, &sc)?;
            let best = outcome
                .best()
                .ok_or_else(|| BatchError::Search(SearchError::EmptyGrid))?;
            let mut best_config = job.config.clone();
            best_config.params = best.params.clone();
            let result = run_backtest_from_data(&joint, &best_config)?;
            let presets = PresetFile {
                strategy: job.config.strategy.clone(),
                metric: sc.metric.clone(),
                presets: outcome.presets.clone(),
            };
            (result, Some(presets), outcome.optimized_universe)
        }
        OptimizationMode::WalkForward { walk_forward: wf } => {
            let report = walk_forward(&joint, &job.config, wf)?;
            let result = BacktestResult {
                run_id: job.config.run_id()?,
                per_symbol: Default::default(),
                portfolio_log_returns: report.oos_log_returns.clone(),
                portfolio_equity: report.oos_equity.clone(),
                metrics: report.oos_metrics.clone(),
                trades: Vec::new(),
            };
            (result, None, Vec::new())
        }
    };

    let run_dir = save_run(
        &result,
        &job.config.strategy,
        &job.config.universe,
        presets.as_ref(),
        &optimized_universe,
        &job.output_dir,
    )
    .map_err(|e| BatchError::Parse(e.to_string()))?;

    Ok(JobOutcome {
        job_id: job.job_id.clone(),
        run_dir,
        trade_count: result.trades.len(),
        metrics: result.metrics,
    })
}

/// Runs each job inside the scheduler process. Test executor.
pub struct InProcessExecutor<P: DataProvider> {
    pub cache: BarCache,
    pub provider: P,
}

impl<P: DataProvider> JobExecutor for InProcessExecutor<P> {
    fn execute(&self, job: &BatchJobConfig) -> Result<JobOutcome, String> {
        execute_job(job, &self.cache, &self.provider).map_err(|e| e.to_string())
    }
}

/// Spawns one child process per job via the CLI `batch-worker` subcommand.
///
/// The job config is written to `{output_dir}/{job_id}/job.json`; the worker
/// writes `result.json` next to it on success and exits nonzero on failure.
pub struct SubprocessExecutor {
    worker_exe: PathBuf,
}

impl SubprocessExecutor {
    pub fn new(worker_exe: PathBuf) -> Self {
        Self { worker_exe }
    }

    /// Use the currently running binary as the worker.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }
}

impl JobExecutor for SubprocessExecutor {
    fn execute(&self, job: &BatchJobConfig) -> Result<JobOutcome, String> {
        let job_dir = job.output_dir.join(&job.job_id);
        fs::create_dir_all(&job_dir).map_err(|e| e.to_string())?;
        let job_path = job_dir.join("job.json");
        let json = serde_json::to_string_pretty(job).map_err(|e| e.to_string())?;
        fs::write(&job_path, json).map_err(|e| e.to_string())?;

        let output = Command::new(&self.worker_exe)
            .arg("batch-worker")
            .arg("--job")
            .arg(&job_path)
            .output()
            .map_err(|e| format!("failed to spawn worker: {e}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "worker exited with {}: {}",
                output.status,
                stderr.trim()
            ));
        }

        let result_path = job_dir.join("result.json");
        let raw = fs::read_to_string(&result_path)
            .map_err(|e| format!("worker produced no result.json: {e}"))?;
        serde_json::from_str(&raw).map_err(|e| format!("bad result.json: {e}"))
    }
}

/// Worker entry point: load the job file, run it, write `result.json`.
pub fn run_worker(
    job_path: &Path,
    cache: &BarCache,
    provider: &dyn DataProvider,
) -> Result<JobOutcome, BatchError> {
    let raw = fs::read_to_string(job_path).map_err(|source| BatchError::Io {
        path: job_path.to_path_buf(),
        source,
    })?;
    let job: BatchJobConfig = serde_json::from_str(&raw)?;
    let outcome = execute_job(&job, cache, provider)?;
    let result_path = job.output_dir.join(&job.job_id).join("result.json");
    let json = serde_json::to_string_pretty(&outcome)?;
    fs::write(&result_path, json).map_err(|source| BatchError::Io {
        path: result_path,
        source,
    })?;
    Ok(outcome)
}

// ─── Scheduler ───────────────────────────────────────────────────────

/// One row of the summary CSV.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRow {
    pub job_id: String,
    pub state: JobState,
    pub sharpe: Option<f64>,
    pub total_return: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub trade_count: Option<usize>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub rows: Vec<SummaryRow>,
    pub succeeded: usize,
    pub failed: usize,
}

/// Run the whole batch; every job yields a summary row, pass or fail.
pub fn run_batch(
    batch: &BatchConfig,
    executor: &dyn JobExecutor,
) -> Result<BatchReport, BatchError> {
    batch.validate()?;
    let status = StatusLog::new(batch.status_path.clone());
    for job in &batch.jobs {
        status.append(&job.job_id, JobState::Queued, None);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(batch.workers.max(1))
        .build()
        .map_err(|e| BatchError::Pool(e.to_string()))?;

    let rows: Vec<SummaryRow> = pool.install(|| {
        batch
            .jobs
            .par_iter()
            .map(|job| {
                status.append(&job.job_id, JobState::Running, None);
                match executor.execute(job) {
                    Ok(outcome) => {
                        status.append(&job.job_id, JobState::Succeeded, None);
                        SummaryRow {
                            job_id: job.job_id.clone(),
                            state: JobState::Succeeded,
                            sharpe: Some(outcome.metrics.sharpe),
                            total_return: Some(outcome.metrics.total_return),
                            max_drawdown: Some(outcome.metrics.max_drawdown),
                            trade_count: Some(outcome.trade_count),
                            error: None,
                        }
                    }
                    Err(message) => {
                        status.append(&job.job_id, JobState::Failed, Some(message.clone()));
                        SummaryRow {
                            job_id: job.job_id.clone(),
                            state: JobState::Failed,
                            sharpe: None,
                            total_return: None,
                            max_drawdown: None,
                            trade_count: None,
                            error: Some(message),
                        }
                    }
                }
            })
            .collect()
    });

    write_summary(&batch.summary_path, &rows)?;

    let succeeded = rows.iter().filter(|r| r.state == JobState::Succeeded).count();
    Ok(BatchReport {
        failed: rows.len() - succeeded,
        succeeded,
        rows,
    })
}

fn write_summary(path: &Path, rows: &[SummaryRow]) -> Result<(), BatchError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| BatchError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record([
        "job_id",
        "state",
        "sharpe",
        "total_return",
        "max_drawdown",
        "trade_count",
        "error",
    ])?;
    for row in rows {
        wtr.write_record([
            row.job_id.as_str(),
            match row.state {
                JobState::Succeeded => "succeeded",
                JobState::Failed => "failed",
                JobState::Queued => "queued",
                JobState::Running => "running",
            },
            &row.sharpe.map(|v| format!("{v:.6}")).unwrap_or_default(),
            &row.total_return.map(|v| format!("{v:.6}")).unwrap_or_default(),
            &row.max_drawdown.map(|v| format!("{v:.6}")).unwrap_or_default(),
            &row.trade_count.map(|v| v.to_string()).unwrap_or_default(),
            row.error.as_deref().unwrap_or(""),
        ])?;
    }
    wtr.flush().map_err(|source| BatchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}
