//! Donchian channel breakout strategy.

use crate::domain::{PriceTable, SignalSeries};
use crate::strategy::{require_period, ParamGrid, Params, Strategy, StrategyError, StrategyKind};

/// Goes long on a close above the prior `lookback`-bar high, short on a
/// close below the prior low, and holds the position until the opposite
/// channel breaks.
///
/// Parameters: `lookback` (bars in the channel).
#[derive(Debug, Default, Clone)]
pub struct ChannelBreakout;

impl ChannelBreakout {
    pub const ID: &'static str = "channel_breakout";
}

impl Strategy for ChannelBreakout {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Single
    }

    fn signal(&self, table: &PriceTable, params: &Params) -> Result<SignalSeries, StrategyError> {
        let lookback = require_period(params, Self::ID, "lookback")?;
        let bars = table.bars();
        let mut values = vec![0.0; bars.len()];
        let mut state = 0.0_f64;

        for i in lookback..bars.len() {
            // Channel over the lookback window ending at the prior bar.
            let window = &bars[i - lookback..i];
            let hi = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
            let lo = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
            let close = bars[i].close;
            if close > hi {
                state = 1.0;
            } else if close < lo {
                state = -1.0;
            }
            values[i] = state;
        }
        Ok(SignalSeries::new(values))
    }

    fn default_grid(&self) -> ParamGrid {
        let mut grid = ParamGrid::new();
        grid.insert("lookback".into(), vec![20.0, 40.0, 55.0, 80.0, 120.0]);
        grid
    }
}
