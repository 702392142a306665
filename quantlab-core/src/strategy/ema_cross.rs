//! EMA crossover trend strategy.

use crate::domain::{PriceTable, SignalSeries};
use crate::strategy::{require_period, ParamGrid, Params, Strategy, StrategyError, StrategyKind};

/// Long when the fast EMA is above the slow EMA, short when below, flat
/// during the slow EMA's warmup.
///
/// Parameters: `fast`, `slow` (bar counts, fast < slow).
#[derive(Debug, Default, Clone)]
pub struct EmaCross;

impl EmaCross {
    pub const ID: &'static str = "ema_cross";
}

impl Strategy for EmaCross {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Single
    }

    fn signal(&self, table: &PriceTable, params: &Params) -> Result<SignalSeries, StrategyError> {
        let fast = require_period(params, Self::ID, "fast")?;
        let slow = require_period(params, Self::ID, "slow")?;
        if fast >= slow {
            return Err(StrategyError::InvalidParam {
                strategy: Self::ID,
                param: "fast",
                reason: format!("fast ({fast}) must be below slow ({slow})"),
            });
        }

        let closes = table.closes();
        let fast_ema = ema(&closes, fast);
        let slow_ema = ema(&closes, slow);

        let values = fast_ema
            .iter()
            .zip(&slow_ema)
            .enumerate()
            .map(|(i, (f, s))| {
                if i + 1 < slow {
                    0.0
                } else if f > s {
                    1.0
                } else if f < s {
                    -1.0
                } else {
                    0.0
                }
            })
            .collect();
        Ok(SignalSeries::new(values))
    }

    fn default_grid(&self) -> ParamGrid {
        let mut grid = ParamGrid::new();
        grid.insert("fast".into(), vec![5.0, 10.0, 20.0, 30.0]);
        grid.insert("slow".into(), vec![50.0, 100.0, 150.0, 200.0]);
        grid
    }
}

/// Exponential moving average seeded with the first value.
fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = match values.first() {
        Some(&v) => v,
        None => return out,
    };
    for &v in values {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bar;
    use chrono::{Duration, NaiveDate};

    fn table(closes: &[f64]) -> PriceTable {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let bars: Vec<Bar> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                ts: start + Duration::days(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 0.0,
            })
            .collect();
        PriceTable::new("TEST", bars).unwrap()
    }

    fn params(fast: f64, slow: f64) -> Params {
        let mut p = Params::new();
        p.insert("fast".into(), fast);
        p.insert("slow".into(), slow);
        p
    }

    #[test]
    fn uptrend_goes_long() {
        let closes: Vec<f64> = (0..120).map(|i| 100.0 + i as f64).collect();
        let sig = EmaCross.signal(&table(&closes), &params(10.0, 30.0)).unwrap();
        assert_eq!(sig.len(), closes.len());
        assert!(sig.values[60..].iter().all(|&s| s == 1.0));
    }

    #[test]
    fn downtrend_goes_short() {
        let closes: Vec<f64> = (0..120).map(|i| 300.0 - i as f64).collect();
        let sig = EmaCross.signal(&table(&closes), &params(10.0, 30.0)).unwrap();
        assert!(sig.values[60..].iter().all(|&s| s == -1.0));
    }

    #[test]
    fn warmup_is_flat() {
        let closes: Vec<f64> = (0..120).map(|i| 100.0 + i as f64).collect();
        let sig = EmaCross.signal(&table(&closes), &params(10.0, 30.0)).unwrap();
        assert!(sig.values[..29].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn fast_must_be_below_slow() {
        let closes: Vec<f64> = (0..50).map(|i| 100.0 + i as f64).collect();
        assert!(matches!(
            EmaCross.signal(&table(&closes), &params(30.0, 10.0)),
            Err(StrategyError::InvalidParam { .. })
        ));
    }

    #[test]
    fn flat_tape_stays_flat_after_convergence() {
        let closes = vec![100.0; 200];
        let sig = EmaCross.signal(&table(&closes), &params(10.0, 30.0)).unwrap();
        assert!(sig.values.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn default_grid_is_well_formed() {
        let grid = EmaCross.default_grid();
        assert!(grid.contains_key("fast") && grid.contains_key("slow"));
        assert!(grid.values().all(|vs| !vs.is_empty()));
    }
}
