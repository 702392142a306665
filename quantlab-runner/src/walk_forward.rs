//! Walk-forward validation — rolling train/test windows.
//!
//! The history is cut into consecutive (train, test) windows on the union
//! timestamp axis, stepping by the test length so test windows tile the
//! range without overlap. Each window runs a parameter search on the train
//! slice only; the winning parameters are then run on data up to the test
//! end so indicators warm up normally, and the test-window tail of that run
//! becomes the window's out-of-sample segment. Segments concatenate in time
//! order into one OOS curve.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use quantlab_core::domain::JointTable;
use quantlab_core::metrics::{equity_curve, MetricSet};
use quantlab_core::strategy::Params;

use crate::config::BacktestConfig;
use crate::runner::{run_backtest_from_data, RunError};
use crate::search::{search, SearchConfig, SearchError};

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    pub train_bars: usize,
    pub test_bars: usize,
    /// Bars to advance between windows; defaults to `test_bars`.
    #[serde(default)]
    pub step_bars: Option<usize>,
    #[serde(default)]
    pub search: SearchConfig,
}

impl WalkForwardConfig {
    fn step(&self) -> usize {
        self.step_bars.unwrap_or(self.test_bars)
    }
}

#[derive(Debug, Error)]
pub enum WalkForwardError {
    #[error("train_bars and test_bars must both be positive")]
    EmptyWindow,
    #[error("step of {step} bars overlaps {test_bars}-bar test windows")]
    OverlappingWindows { step: usize, test_bars: usize },
    #[error("history has {available} bars, need at least {needed} for one window")]
    NotEnoughBars { needed: usize, available: usize },
    #[error("window {window}: {source}")]
    Search {
        window: usize,
        source: SearchError,
    },
    #[error("window {window}: {source}")]
    Run { window: usize, source: RunError },
}

// ─── Result types ────────────────────────────────────────────────────

/// One train/test window and what it selected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowReport {
    pub index: usize,
    pub train_start: NaiveDateTime,
    pub test_start: NaiveDateTime,
    /// Exclusive end of the test window.
    pub test_end: NaiveDateTime,
    pub best_params: Params,
    pub train_score: f64,
    pub test_metrics: MetricSet,
    pub test_log_returns: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardReport {
    pub windows: Vec<WindowReport>,
    /// Concatenated out-of-sample log returns, time order.
    pub oos_log_returns: Vec<f64>,
    pub oos_equity: Vec<f64>,
    pub oos_metrics: MetricSet,
}

// ─── Validation ──────────────────────────────────────────────────────

pub fn walk_forward(
    joint: &JointTable,
    config: &BacktestConfig,
    wf: &WalkForwardConfig,
) -> Result<WalkForwardReport, WalkForwardError> {
    if wf.train_bars == 0 || wf.test_bars == 0 {
        return Err(WalkForwardError::EmptyWindow);
    }
    if wf.step() < wf.test_bars {
        return Err(WalkForwardError::OverlappingWindows {
            step: wf.step(),
            test_bars: wf.test_bars,
        });
    }
    let axis = union_timestamps(joint);
    let needed = wf.train_bars + wf.test_bars;
    if axis.len() < needed {
        return Err(WalkForwardError::NotEnoughBars {
            needed,
            available: axis.len(),
        });
    }

    let history_start = axis[0];
    let mut windows = Vec::new();
    let mut oos_log_returns = Vec::new();

    let mut train_lo = 0usize;
    let mut index = 0usize;
    // Final partial test window is dropped.
    while train_lo + needed <= axis.len() {
        let test_lo = train_lo + wf.train_bars;
        let test_hi = test_lo + wf.test_bars;
        let train_start = axis[train_lo];
        let test_start = axis[test_lo];
        let test_end = exclusive_end(&axis, test_hi);

        // Parameter selection sees the train slice only.
        let train_slice = joint.slice_time(train_start, test_start);
        let outcome = search(&train_slice, config, &wf.search)
            .map_err(|source| WalkForwardError::Search { window: index, source })?;
        let best = match outcome.best() {
            Some(c) => c.clone(),
            None => {
                return Err(WalkForwardError::Search {
                    window: index,
                    source: SearchError::EmptyGrid,
                })
            }
        };

        // Test run warms up on everything before the test window.
        let mut test_config = config.clone();
        test_config.params = best.params.clone();
        let warm_slice = joint.slice_time(history_start, test_end);
        let result = run_backtest_from_data(&warm_slice, &test_config)
            .map_err(|source| WalkForwardError::Run { window: index, source })?;

        let rets = &result.portfolio_log_returns;
        let take = wf.test_bars.min(rets.len());
        let test_log_returns: Vec<f64> = rets[rets.len() - take..].to_vec();
        let test_metrics = MetricSet::compute(
            &test_log_returns,
            &[],
            config.interval.annualization_factor(),
        );

        oos_log_returns.extend_from_slice(&test_log_returns);
        windows.push(WindowReport {
            index,
            train_start,
            test_start,
            test_end,
            best_params: best.params,
            train_score: best.score,
            test_metrics,
            test_log_returns,
        });

        train_lo += wf.step();
        index += 1;
    }

    let oos_metrics = MetricSet::compute(
        &oos_log_returns,
        &[],
        config.interval.annualization_factor(),
    );
    let oos_equity = equity_curve(&oos_log_returns);
    Ok(WalkForwardReport {
        windows,
        oos_log_returns,
        oos_equity,
        oos_metrics,
    })
}

/// Sorted union of every symbol's timestamps.
fn union_timestamps(joint: &JointTable) -> Vec<NaiveDateTime> {
    let mut set = BTreeSet::new();
    for (_, table) in joint.iter() {
        for bar in table.bars() {
            set.insert(bar.ts);
        }
    }
    set.into_iter().collect()
}

/// Exclusive end for a half-open slice ending at axis index `hi`.
fn exclusive_end(axis: &[NaiveDateTime], hi: usize) -> NaiveDateTime {
    if hi < axis.len() {
        axis[hi]
    } else {
        // Past the last bar; one second after it closes the half-open range.
        axis[axis.len() - 1] + chrono::Duration::seconds(1)
    }
}
