//! Parameter search — grid and seeded random sweeps.
//!
//! Candidates are expanded from a [`ParamGrid`] (ordered by parameter name,
//! values in declaration order), evaluated one at a time, and ranked by the
//! configured metric. Evaluation stays sequential so a search nested inside
//! a batch job never competes with the scheduler's own worker pool.
//! Ranking is deterministic: a stable sort
//! on score with the candidate's enumeration index as tie-break, so equal
//! scores keep grid order and reruns agree bit for bit.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use quantlab_core::domain::JointTable;
use quantlab_core::metrics::MetricSet;
use quantlab_core::strategy::{registry, ParamGrid, Params, Strategy};

use crate::config::BacktestConfig;
use crate::portfolio::select_universe;
use crate::runner::{run_backtest_with_strategy, RunError};

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    Grid,
    Random,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub method: SearchMethod,
    /// Random-search draw count; ignored for grid.
    pub n_iter: usize,
    pub seed: u64,
    /// Ranking metric name ("sharpe", "calmar", ...).
    pub metric: String,
    /// How many top presets to keep.
    pub top_k: usize,
    /// Per-symbol score threshold for the optimized universe.
    pub universe_threshold: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            method: SearchMethod::Grid,
            n_iter: 50,
            seed: 42,
            metric: "sharpe".into(),
            top_k: 5,
            universe_threshold: 0.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("parameter grid is empty")]
    EmptyGrid,
    #[error("unknown ranking metric '{0}'")]
    UnknownMetric(String),
    #[error("no candidate evaluated successfully; first failure: {0}")]
    AllFailed(String),
    #[error(transparent)]
    Run(#[from] RunError),
}

// ─── Result types ────────────────────────────────────────────────────

/// One evaluated parameter assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Enumeration index in the expanded candidate list.
    pub index: usize,
    pub params: Params,
    pub score: f64,
    pub metrics: MetricSet,
    pub trade_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// All successfully evaluated candidates, ranked best first.
    pub ranked: Vec<Candidate>,
    /// Top-K presets (clone of the head of `ranked`).
    pub presets: Vec<Candidate>,
    /// Symbols whose per-symbol score under the best params clears the
    /// threshold.
    pub optimized_universe: Vec<String>,
    /// Candidates that failed, as (params, error message) pairs.
    pub failures: Vec<(Params, String)>,
}

impl SearchOutcome {
    pub fn best(&self) -> Option<&Candidate> {
        self.ranked.first()
    }
}

// ─── Candidate expansion ─────────────────────────────────────────────

/// Cartesian product of the grid, parameter names in `BTreeMap` order and
/// values in declaration order.
pub fn expand_grid(grid: &ParamGrid) -> Vec<Params> {
    if grid.is_empty() || grid.values().any(|v| v.is_empty()) {
        return Vec::new();
    }
    let names: Vec<&String> = grid.keys().collect();
    let mut out: Vec<Params> = vec![Params::new()];
    for name in names {
        let values = &grid[name];
        let mut next = Vec::with_capacity(out.len() * values.len());
        for base in &out {
            for &v in values {
                let mut p = base.clone();
                p.insert(name.clone(), v);
                next.push(p);
            }
        }
        out = next;
    }
    out
}

/// Seeded random draw of up to `n_iter` distinct assignments.
///
/// When the full space has at most `n_iter` points the whole grid is
/// returned instead. Duplicate draws are retried up to `5 * n_iter`
/// attempts, then sampling stops with what it has.
pub fn sample_grid(grid: &ParamGrid, n_iter: usize, seed: u64) -> Vec<Params> {
    let space: usize = grid.values().map(|v| v.len()).product();
    if grid.is_empty() || grid.values().any(|v| v.is_empty()) {
        return Vec::new();
    }
    if space <= n_iter {
        return expand_grid(grid);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut seen: BTreeSet<Vec<usize>> = BTreeSet::new();
    let mut out = Vec::with_capacity(n_iter);
    let mut attempts = 0usize;
    while out.len() < n_iter && attempts < 5 * n_iter {
        attempts += 1;
        let choice: Vec<usize> = grid.values().map(|v| rng.gen_range(0..v.len())).collect();
        if !seen.insert(choice.clone()) {
            continue;
        }
        let mut params = Params::new();
        for ((name, values), &idx) in grid.iter().zip(&choice) {
            params.insert(name.clone(), values[idx]);
        }
        out.push(params);
    }
    out
}

// ─── Search ──────────────────────────────────────────────────────────

/// Expand, evaluate sequentially, and rank, resolving the strategy from the
/// registry.
pub fn search(
    joint: &JointTable,
    config: &BacktestConfig,
    search_config: &SearchConfig,
) -> Result<SearchOutcome, SearchError> {
    let strategy = registry::build(&config.strategy)
        .map_err(|e| SearchError::AllFailed(e.to_string()))?;
    search_with_strategy(joint, strategy.as_ref(), config, search_config)
}

/// [`search`] with the strategy supplied by the caller.
pub fn search_with_strategy(
    joint: &JointTable,
    strategy: &dyn Strategy,
    config: &BacktestConfig,
    search_config: &SearchConfig,
) -> Result<SearchOutcome, SearchError> {
    let grid = effective_grid(config, strategy)?;
    let candidates = match search_config.method {
        SearchMethod::Grid => expand_grid(&grid),
        SearchMethod::Random => sample_grid(&grid, search_config.n_iter, search_config.seed),
    };
    if candidates.is_empty() {
        return Err(SearchError::EmptyGrid);
    }

    let results: Vec<Result<Candidate, (Params, String)>> = candidates
        .into_iter()
        .enumerate()
        .map(|(index, params)| {
            let mut run_config = config.clone();
            run_config.params = params.clone();
            match run_backtest_with_strategy(joint, strategy, &run_config) {
                Ok(res) => match res.metrics.by_name(&search_config.metric) {
                    Some(score) => Ok(Candidate {
                        index,
                        params,
                        score,
                        trade_count: res.trades.len(),
                        metrics: res.metrics,
                    }),
                    None => Err((params, format!("unknown metric '{}'", search_config.metric))),
                },
                Err(e) => Err((params, e.to_string())),
            }
        })
        .collect();

    let mut ranked = Vec::new();
    let mut failures = Vec::new();
    for r in results {
        match r {
            Ok(c) => ranked.push(c),
            Err(f) => failures.push(f),
        }
    }
    if ranked.is_empty() {
        let first = failures
            .first()
            .map(|(_, e)| e.clone())
            .unwrap_or_else(|| "empty candidate list".into());
        return Err(SearchError::AllFailed(first));
    }

    // Stable rank: score descending, enumeration index as tie-break.
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.index.cmp(&b.index))
    });

    let presets: Vec<Candidate> = ranked.iter().take(search_config.top_k).cloned().collect();

    // Per-symbol scores under the winning params drive universe selection.
    let optimized_universe = {
        let best = &ranked[0];
        let mut best_config = config.clone();
        best_config.params = best.params.clone();
        let res = run_backtest_with_strategy(joint, strategy, &best_config)?;
        select_universe(
            res.per_symbol
                .iter()
                .map(|(sym, sim)| (sym.as_str(), &sim.metrics)),
            &search_config.metric,
            search_config.universe_threshold,
        )
    };

    Ok(SearchOutcome {
        ranked,
        presets,
        optimized_universe,
        failures,
    })
}

/// Config grid if present, else the strategy's default grid.
fn effective_grid(
    config: &BacktestConfig,
    strategy: &dyn Strategy,
) -> Result<ParamGrid, SearchError> {
    if let Some(grid) = &config.grid {
        if grid.is_empty() {
            return Err(SearchError::EmptyGrid);
        }
        return Ok(grid.clone());
    }
    let grid = strategy.default_grid();
    if grid.is_empty() {
        return Err(SearchError::EmptyGrid);
    }
    Ok(grid)
}
