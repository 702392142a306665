//! Monte Carlo robustness check — resampled equity paths.
//!
//! Resamples a finished backtest with replacement, either bar by bar from
//! the net log-return series or trade by trade from the realized lot PnLs,
//! and reports percentile bands of terminal equity and max drawdown across
//! the trials. Seeded, so a report reproduces exactly.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use quantlab_core::domain::TradeRecord;
use quantlab_core::metrics::{max_drawdown, total_return};

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleMethod {
    /// Draw bars from the net log-return series.
    BarReturns,
    /// Draw trades from the realized lot PnLs.
    TradeReturns,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    pub n_trials: usize,
    pub method: ResampleMethod,
    pub seed: u64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            n_trials: 1000,
            method: ResampleMethod::BarReturns,
            seed: 42,
        }
    }
}

#[derive(Debug, Error)]
pub enum McError {
    #[error("n_trials must be positive")]
    NoTrials,
    #[error("bar resampling needs a non-empty return series")]
    NoReturns,
}

// ─── Result types ────────────────────────────────────────────────────

/// 5th / 50th / 95th percentile of a trial statistic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileBand {
    pub p5: f64,
    pub p50: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloReport {
    pub n_trials: usize,
    pub method: ResampleMethod,
    pub terminal_equity: PercentileBand,
    pub max_drawdown: PercentileBand,
    /// Fraction of trials whose drawdown went below -50%.
    pub prob_ruin: f64,
}

// ─── Simulation ──────────────────────────────────────────────────────

/// Resample the backtest `n_trials` times and band the outcomes.
///
/// A zero-trade backtest is not an error: every trial replays the same
/// flat path and the bands collapse to the no-trade terminal equity.
pub fn monte_carlo(
    net_log_returns: &[f64],
    trades: &[TradeRecord],
    config: &MonteCarloConfig,
) -> Result<MonteCarloReport, McError> {
    if config.n_trials == 0 {
        return Err(McError::NoTrials);
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut terminals = Vec::with_capacity(config.n_trials);
    let mut drawdowns = Vec::with_capacity(config.n_trials);

    match config.method {
        ResampleMethod::BarReturns => {
            if net_log_returns.is_empty() {
                return Err(McError::NoReturns);
            }
            let n = net_log_returns.len();
            let mut path = vec![0.0; n];
            for _ in 0..config.n_trials {
                for slot in path.iter_mut() {
                    *slot = net_log_returns[rng.gen_range(0..n)];
                }
                terminals.push((1.0 + total_return(&path)).max(0.0));
                drawdowns.push(max_drawdown(&path));
            }
        }
        ResampleMethod::TradeReturns => {
            if trades.is_empty() {
                // Degenerate distribution: no trades means every resampled
                // path is the unchanged starting equity.
                terminals.resize(config.n_trials, 1.0);
                drawdowns.resize(config.n_trials, 0.0);
            } else {
                let pnls: Vec<f64> = trades.iter().map(|t| t.pnl).collect();
                let n = pnls.len();
                let mut path = vec![0.0; n];
                for _ in 0..config.n_trials {
                    for slot in path.iter_mut() {
                        // Simple per-trade returns compound into a log path.
                        let r = pnls[rng.gen_range(0..n)];
                        *slot = (1.0 + r).max(f64::MIN_POSITIVE).ln();
                    }
                    terminals.push((1.0 + total_return(&path)).max(0.0));
                    drawdowns.push(max_drawdown(&path));
                }
            }
        }
    }

    let ruined = drawdowns.iter().filter(|&&dd| dd < -0.5).count();
    let prob_ruin = ruined as f64 / config.n_trials as f64;

    terminals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    drawdowns.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    Ok(MonteCarloReport {
        n_trials: config.n_trials,
        method: config.method,
        terminal_equity: band(&terminals),
        max_drawdown: band(&drawdowns),
        prob_ruin,
    })
}

fn band(sorted: &[f64]) -> PercentileBand {
    PercentileBand {
        p5: percentile_sorted(sorted, 0.05),
        p50: percentile_sorted(sorted, 0.50),
        p95: percentile_sorted(sorted, 0.95),
    }
}

/// Linear-interpolated percentile of an ascending slice.
fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}
