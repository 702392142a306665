//! Vectorized single-asset simulation.
//!
//! Pipeline, in order:
//!
//! 1. sizer turns the signal into target exposures
//! 2. exposures are lagged one bar (a signal seen at the close of bar t
//!    trades at bar t+1, so it earns bar t+1's return at the earliest)
//! 3. the stop-loss overlay forces losing positions flat
//! 4. gross per-bar return = position × asset log return
//! 5. costs are deducted per bar of turnover
//! 6. equity compounds from 1.0 over net log returns
//! 7. trades are reconstructed FIFO from the traded positions
//!
//! The lag in step 2 is the look-ahead guard: no bar's return is ever
//! earned by a position derived from that same bar.

pub mod costs;
pub mod stop_loss;
pub mod trades;

pub use costs::CostConfig;
pub use stop_loss::StopLossConfig;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{BarInterval, PriceTable, SignalSeries, TradeRecord};
use crate::metrics::{equity_curve, MetricSet};
use crate::sizing::SizerConfig;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("signal length {signal} does not match table length {table}")]
    SignalLengthMismatch { signal: usize, table: usize },
    #[error("price table is empty")]
    EmptyTable,
}

/// Everything the simulator needs besides data and signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub interval: BarInterval,
    pub sizer: SizerConfig,
    pub costs: CostConfig,
    pub stop_loss: Option<StopLossConfig>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            interval: BarInterval::Day1,
            sizer: SizerConfig::default(),
            costs: CostConfig::default(),
            stop_loss: None,
        }
    }
}

/// Output of one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimResult {
    /// Exposure actually held on each bar, after lag and stops.
    pub positions: Vec<f64>,
    /// Net per-bar log returns.
    pub net_log_returns: Vec<f64>,
    /// Equity curve starting at 1.0, length = bars + 1.
    pub equity: Vec<f64>,
    pub trades: Vec<TradeRecord>,
    pub metrics: MetricSet,
    /// Bar indices where the stop-loss fired.
    pub stop_events: Vec<usize>,
}

/// Run the full pipeline for one symbol.
pub fn simulate(
    table: &PriceTable,
    signal: &SignalSeries,
    config: &SimConfig,
) -> Result<SimResult, SimError> {
    if table.is_empty() {
        return Err(SimError::EmptyTable);
    }
    if signal.len() != table.len() {
        return Err(SimError::SignalLengthMismatch {
            signal: signal.len(),
            table: table.len(),
        });
    }

    let ann = config.interval.annualization_factor();
    let log_returns = table.log_returns();

    let exposures = config.sizer.build(ann).exposures(table, signal);

    // Lag one bar.
    let mut positions = vec![0.0; exposures.len()];
    positions[1..].copy_from_slice(&exposures[..exposures.len() - 1]);

    let stop_events = match config.stop_loss {
        Some(stop) => {
            let (overlaid, events) = stop.apply(&positions, &log_returns);
            positions = overlaid;
            events
        }
        None => Vec::new(),
    };

    let cost = config.costs.per_bar_costs(&positions, &log_returns);
    let net_log_returns: Vec<f64> = positions
        .iter()
        .zip(&log_returns)
        .zip(&cost)
        .map(|((p, r), c)| p * r - c)
        .collect();

    let trades = trades::extract_trades(&table.symbol, &positions, table.bars());
    let metrics = MetricSet::compute(&net_log_returns, &trades, ann);

    Ok(SimResult {
        equity: equity_curve(&net_log_returns),
        positions,
        net_log_returns,
        trades,
        metrics,
        stop_events,
    })
}
