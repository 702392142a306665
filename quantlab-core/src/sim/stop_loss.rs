//! Stop-loss overlay on the lagged position series.
//!
//! Tracks the cumulative position-weighted log return since each entry.
//! When it breaches the configured loss threshold the position is forced
//! flat from the next bar and stays flat until the underlying series itself
//! goes flat or flips sign, which re-arms the stop.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopLossConfig {
    /// Loss threshold as a positive fraction (0.05 = stop after -5%).
    pub threshold: f64,
}

impl StopLossConfig {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.abs(),
        }
    }

    /// Apply the stop to an already-lagged position series. Returns the
    /// overlaid positions and the bar indices where a stop fired.
    pub fn apply(&self, positions: &[f64], log_returns: &[f64]) -> (Vec<f64>, Vec<usize>) {
        let n = positions.len();
        let mut out = positions.to_vec();
        let mut fired = Vec::new();
        if self.threshold == 0.0 || n == 0 {
            return (out, fired);
        }

        let mut entry_sign = 0.0_f64;
        let mut excursion = 0.0;
        let mut stopped = false;

        for i in 0..n {
            let raw_sign = sign(positions[i]);

            if raw_sign != entry_sign {
                // New entry, exit, or flip in the underlying series.
                entry_sign = raw_sign;
                excursion = 0.0;
                stopped = false;
            }

            if stopped {
                out[i] = 0.0;
                continue;
            }
            if raw_sign == 0.0 {
                continue;
            }

            excursion += positions[i] * log_returns.get(i).copied().unwrap_or(0.0);
            if excursion <= -self.threshold {
                // Loss realized on this bar; flat starting next bar.
                stopped = true;
                fired.push(i);
            }
        }
        (out, fired)
    }
}

fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}
