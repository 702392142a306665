//! Renko reconstruction of a price table.
//!
//! Renko bars are built from closes only: a new brick forms each time price
//! moves a full brick size away from the last brick close. Brick size is
//! either a fixed price increment or a multiple of a rolling ATR.
//!
//! Several bricks can complete inside one source bar. Only the last brick of
//! each source bar is kept, carrying that bar's timestamp, so the output has
//! strictly increasing timestamps and stays a valid [`PriceTable`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Bar, PriceTable, TableError};

/// How bricks are sized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BrickSize {
    /// Fixed price increment per brick.
    Fixed { size: f64 },
    /// Brick size tracks `mult` times a rolling ATR.
    Atr { period: usize, mult: f64 },
}

#[derive(Debug, Error)]
pub enum RenkoError {
    #[error("brick size must be positive, got {0}")]
    NonPositiveBrick(f64),
    #[error("atr period must be at least 1")]
    ZeroAtrPeriod,
    #[error("not enough bars to seed renko: have {have}, need {need}")]
    TooFewBars { have: usize, need: usize },
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Rebuild `table` as Renko bricks.
pub fn to_renko(table: &PriceTable, size: BrickSize) -> Result<PriceTable, RenkoError> {
    let warmup = match size {
        BrickSize::Fixed { size } => {
            if size <= 0.0 {
                return Err(RenkoError::NonPositiveBrick(size));
            }
            1
        }
        BrickSize::Atr { period, mult } => {
            if period == 0 {
                return Err(RenkoError::ZeroAtrPeriod);
            }
            if mult <= 0.0 {
                return Err(RenkoError::NonPositiveBrick(mult));
            }
            period + 1
        }
    };
    let bars = table.bars();
    if bars.len() < warmup + 1 {
        return Err(RenkoError::TooFewBars {
            have: bars.len(),
            need: warmup + 1,
        });
    }

    let atr = match size {
        BrickSize::Atr { period, .. } => rolling_atr(bars, period),
        BrickSize::Fixed { .. } => Vec::new(),
    };

    let mut anchor = bars[warmup - 1].close;
    let mut out: Vec<Bar> = Vec::new();

    for (i, bar) in bars.iter().enumerate().skip(warmup) {
        let brick = match size {
            BrickSize::Fixed { size } => size,
            BrickSize::Atr { mult, .. } => {
                let a = atr[i];
                if !(a > 0.0) {
                    continue;
                }
                a * mult
            }
        };

        // Walk the anchor toward the close one brick at a time; only the
        // final brick of this source bar survives.
        let mut last: Option<Bar> = None;
        while bar.close - anchor >= brick {
            let open = anchor;
            anchor += brick;
            last = Some(Bar {
                ts: bar.ts,
                open,
                high: anchor,
                low: open,
                close: anchor,
                volume: bar.volume,
            });
        }
        while anchor - bar.close >= brick {
            let open = anchor;
            anchor -= brick;
            last = Some(Bar {
                ts: bar.ts,
                open,
                high: open,
                low: anchor,
                close: anchor,
                volume: bar.volume,
            });
        }
        if let Some(b) = last {
            out.push(b);
        }
    }

    Ok(PriceTable::new(table.symbol.clone(), out)?)
}

/// Rolling ATR with a simple moving average of true ranges. Index i holds
/// the ATR available at bar i, NaN during warmup.
fn rolling_atr(bars: &[Bar], period: usize) -> Vec<f64> {
    let mut tr = vec![f64::NAN; bars.len()];
    for i in 1..bars.len() {
        let prev_close = bars[i - 1].close;
        let b = &bars[i];
        tr[i] = (b.high - b.low)
            .max((b.high - prev_close).abs())
            .max((b.low - prev_close).abs());
    }
    let mut atr = vec![f64::NAN; bars.len()];
    for i in period..bars.len() {
        let window = &tr[i + 1 - period..=i];
        atr[i] = window.iter().sum::<f64>() / period as f64;
    }
    atr
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn table_from_closes(closes: &[f64]) -> PriceTable {
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
                high: c + 0.5,
                low: c - 0.5,
                close: c,
                volume: 1000.0,
            })
            .collect();
        PriceTable::new("TEST", bars).unwrap()
    }

    #[test]
    fn fixed_bricks_follow_trend() {
        // Climbs 1.0 per bar with brick 2.0: a brick every other bar.
        let closes: Vec<f64> = (0..21).map(|i| 100.0 + i as f64).collect();
        let t = table_from_closes(&closes);
        let renko = to_renko(&t, BrickSize::Fixed { size: 2.0 }).unwrap();
        assert_eq!(renko.len(), 10);
        for bar in renko.bars() {
            assert!((bar.close - bar.open - 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn multiple_bricks_in_one_bar_keep_last() {
        // One 10-point jump with brick 2.0 emits a single bar whose close
        // lands at the furthest completed brick boundary.
        let closes = vec![100.0, 100.0, 110.5];
        let t = table_from_closes(&closes);
        let renko = to_renko(&t, BrickSize::Fixed { size: 2.0 }).unwrap();
        assert_eq!(renko.len(), 1);
        assert!((renko.bars()[0].close - 110.0).abs() < 1e-12);
    }

    #[test]
    fn timestamps_strictly_increase() {
        let closes: Vec<f64> = (0..60)
            .map(|i| 100.0 + 3.0 * ((i as f64) * 0.4).sin() + i as f64 * 0.3)
            .collect();
        let t = table_from_closes(&closes);
        let renko = to_renko(&t, BrickSize::Fixed { size: 1.0 }).unwrap();
        let ts: Vec<_> = renko.timestamps().collect();
        assert!(ts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn sideways_tape_emits_no_bricks_then_errors_never() {
        let closes = vec![100.0; 30];
        let t = table_from_closes(&closes);
        let renko = to_renko(&t, BrickSize::Fixed { size: 2.0 }).unwrap();
        assert_eq!(renko.len(), 0);
    }

    #[test]
    fn down_moves_make_down_bricks() {
        let closes: Vec<f64> = (0..11).map(|i| 100.0 - i as f64).collect();
        let t = table_from_closes(&closes);
        let renko = to_renko(&t, BrickSize::Fixed { size: 2.0 }).unwrap();
        assert!(!renko.is_empty());
        for bar in renko.bars() {
            assert!(bar.close < bar.open);
        }
    }

    #[test]
    fn atr_bricks_need_warmup() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let t = table_from_closes(&closes);
        let renko = to_renko(
            &t,
            BrickSize::Atr {
                period: 14,
                mult: 1.0,
            },
        )
        .unwrap();
        assert!(!renko.is_empty());
        // No brick may carry a timestamp from inside the ATR warmup.
        let warmup_end = t.bars()[14].ts;
        assert!(renko.bars().iter().all(|b| b.ts > warmup_end));
    }

    #[test]
    fn invalid_config_rejected() {
        let t = table_from_closes(&[100.0, 101.0, 102.0]);
        assert!(matches!(
            to_renko(&t, BrickSize::Fixed { size: 0.0 }),
            Err(RenkoError::NonPositiveBrick(_))
        ));
        assert!(matches!(
            to_renko(&t, BrickSize::Atr { period: 0, mult: 1.0 }),
            Err(RenkoError::ZeroAtrPeriod)
        ));
    }

    #[test]
    fn too_few_bars_rejected() {
        let t = table_from_closes(&[100.0]);
        assert!(matches!(
            to_renko(&t, BrickSize::Fixed { size: 1.0 }),
            Err(RenkoError::TooFewBars { .. })
        ));
    }
}
