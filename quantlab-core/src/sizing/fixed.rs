//! Fixed-fraction sizer.

use crate::domain::{PriceTable, SignalSeries};
use crate::sizing::PositionSizer;

/// Scales every signal by a constant fraction of equity.
#[derive(Debug, Clone)]
pub struct FixedFractional {
    fraction: f64,
}

impl FixedFractional {
    pub fn new(fraction: f64) -> Self {
        Self {
            fraction: fraction.max(0.0),
        }
    }
}

impl PositionSizer for FixedFractional {
    fn exposures(&self, _table: &PriceTable, signal: &SignalSeries) -> Vec<f64> {
        signal.values.iter().map(|s| s * self.fraction).collect()
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sizing::tests::table_from_closes;

    #[test]
    fn scales_signal_by_fraction() {
        let t = table_from_closes(&[100.0, 101.0, 99.0]);
        let sig = SignalSeries::new(vec![1.0, -1.0, 0.0]);
        let exp = FixedFractional::new(0.5).exposures(&t, &sig);
        assert_eq!(exp, vec![0.5, -0.5, 0.0]);
    }

    #[test]
    fn negative_fraction_clamped_to_zero() {
        let t = table_from_closes(&[100.0, 101.0]);
        let sig = SignalSeries::new(vec![1.0, 1.0]);
        let exp = FixedFractional::new(-1.0).exposures(&t, &sig);
        assert!(exp.iter().all(|&e| e == 0.0));
    }
}
