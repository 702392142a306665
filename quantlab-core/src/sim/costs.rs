//! Transaction cost model.
//!
//! Costs are charged in log-return space against the equity curve:
//!
//! - slippage per bar: `|Δposition| * slippage_rate * vol_multiplier`
//! - commission per bar with any turnover: `commission / reference_equity`
//!
//! The vol multiplier makes slippage regime-aware: it is the trailing
//! realized vol divided by its expanding mean, clamped to [0.5, 3.0], so
//! fills cost more in stressed tapes and less in quiet ones.

use serde::{Deserialize, Serialize};

use crate::metrics::std_dev;

pub const VOL_MULT_FLOOR: f64 = 0.5;
pub const VOL_MULT_CEIL: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    /// Proportional slippage per unit of turnover (e.g. 0.0005 = 5 bps).
    pub slippage_rate: f64,
    /// Fixed commission per executed bar, in account currency.
    pub commission: f64,
    /// Equity assumed when converting the fixed commission to a return.
    pub reference_equity: f64,
    /// Trailing window for the slippage vol multiplier.
    pub vol_window: usize,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            slippage_rate: 0.0005,
            commission: 1.0,
            reference_equity: 10_000.0,
            vol_window: 20,
        }
    }
}

impl CostConfig {
    pub fn is_free(&self) -> bool {
        self.slippage_rate == 0.0 && self.commission == 0.0
    }

    /// Per-bar cost deductions given the traded position series and the
    /// asset log returns. Output is non-negative and the same length as
    /// `positions`.
    pub fn per_bar_costs(&self, positions: &[f64], log_returns: &[f64]) -> Vec<f64> {
        let n = positions.len();
        let mut costs = vec![0.0; n];
        if self.is_free() || n == 0 {
            return costs;
        }

        let mult = vol_multiplier(log_returns, self.vol_window);
        let commission_ret = if self.reference_equity > 0.0 {
            self.commission / self.reference_equity
        } else {
            0.0
        };

        let mut prev = 0.0;
        for i in 0..n {
            let turnover = (positions[i] - prev).abs();
            if turnover > 1e-12 {
                let m = mult.get(i).copied().unwrap_or(1.0);
                costs[i] = turnover * self.slippage_rate * m + commission_ret;
            }
            prev = positions[i];
        }
        costs
    }
}

/// Trailing vol over `window` bars divided by the expanding mean of that
/// trailing vol, clamped to [0.5, 3.0]. Warmup bars get 1.0.
pub fn vol_multiplier(log_returns: &[f64], window: usize) -> Vec<f64> {
    let n = log_returns.len();
    let window = window.max(2);
    let mut mult = vec![1.0; n];
    let mut vol_sum = 0.0;
    let mut vol_count = 0usize;
    for i in 0..n {
        if i + 1 < window {
            continue;
        }
        let vol = std_dev(&log_returns[i + 1 - window..=i]);
        vol_sum += vol;
        vol_count += 1;
        let mean_vol = vol_sum / vol_count as f64;
        if mean_vol > 1e-15 {
            mult[i] = (vol / mean_vol).clamp(VOL_MULT_FLOOR, VOL_MULT_CEIL);
        }
    }
    mult
}
