//! Inverse-volatility sizer.

use crate::domain::{PriceTable, SignalSeries};
use crate::metrics::std_dev;
use crate::sizing::PositionSizer;

/// Targets a constant annualized volatility: exposure is
/// `signal * target_vol / realized_vol`, where realized vol is a trailing
/// rolling estimate. Bars inside the warmup window get zero exposure, and
/// the scaling is capped so quiet tapes cannot blow up leverage.
#[derive(Debug, Clone)]
pub struct InverseVolatility {
    target_vol: f64,
    window: usize,
    cap: f64,
    ann_factor: f64,
}

impl InverseVolatility {
    pub fn new(target_vol: f64, window: usize, cap: f64, ann_factor: f64) -> Self {
        Self {
            target_vol: target_vol.max(0.0),
            window: window.max(2),
            cap: cap.max(0.0),
            ann_factor,
        }
    }
}

impl PositionSizer for InverseVolatility {
    fn exposures(&self, table: &PriceTable, signal: &SignalSeries) -> Vec<f64> {
        let rets = table.log_returns();
        let n = signal.len().min(rets.len());
        let mut out = vec![0.0; signal.len()];
        for i in 0..n {
            if i + 1 < self.window {
                continue;
            }
            // Trailing window ending at bar i, inclusive.
            let vol = std_dev(&rets[i + 1 - self.window..=i]) * self.ann_factor.sqrt();
            if !(vol > 1e-12) {
                continue;
            }
            let scale = (self.target_vol / vol).min(self.cap);
            out[i] = signal.values[i] * scale;
        }
        out
    }

    fn name(&self) -> &'static str {
        "inverse_vol"
    }
}
