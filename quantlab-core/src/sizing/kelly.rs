//! Fractional Kelly sizer.

use crate::domain::{PriceTable, SignalSeries};
use crate::sizing::PositionSizer;

/// Fractional Kelly over an expanding window of realized gross strategy
/// returns.
///
/// At bar t the Kelly estimate is mean/variance of `signal[i] * log_ret[i]`
/// for i < t, scaled by `fraction` and clamped to `[0, cap]`. Before
/// `min_periods` observations accrue, or when the estimated edge is not
/// positive, the sizer falls back to a conservative `fraction * 0.1`.
#[derive(Debug, Clone)]
pub struct FractionalKelly {
    fraction: f64,
    min_periods: usize,
    cap: f64,
}

impl FractionalKelly {
    pub fn new(fraction: f64, min_periods: usize, cap: f64) -> Self {
        Self {
            fraction: fraction.max(0.0),
            min_periods: min_periods.max(2),
            cap: cap.max(0.0),
        }
    }

    fn fallback(&self) -> f64 {
        self.fraction * 0.1
    }
}

impl PositionSizer for FractionalKelly {
    fn exposures(&self, table: &PriceTable, signal: &SignalSeries) -> Vec<f64> {
        let rets = table.log_returns();
        let n = signal.len().min(rets.len());
        let mut out = vec![0.0; signal.len()];

        // Expanding moments maintained incrementally: only bars where the
        // signal was active contribute to the edge estimate.
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;

        for i in 0..n {
            let sig = signal.values[i];
            if sig != 0.0 {
                let scale = if count < self.min_periods {
                    self.fallback()
                } else {
                    let mean = sum / count as f64;
                    let var = (sum_sq / count as f64 - mean * mean).max(0.0);
                    if mean <= 0.0 || var < 1e-15 {
                        self.fallback()
                    } else {
                        (self.fraction * mean / var).clamp(0.0, self.cap)
                    }
                };
                out[i] = sig * scale;
            }
            // Update with this bar after sizing it, so bar i never sees its
            // own return.
            if sig != 0.0 {
                let gross = sig * rets[i];
                count += 1;
                sum += gross;
                sum_sq += gross * gross;
            }
        }
        out
    }

    fn name(&self) -> &'static str {
        "fractional_kelly"
    }
}
