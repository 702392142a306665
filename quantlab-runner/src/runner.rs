//! Single-backtest runner.
//!
//! Orchestrates one run end to end: load the universe through the cache,
//! apply the candle mode, generate signals (the strategy's shape decides
//! whether that happens per symbol or once against the joint table),
//! simulate each leg, and aggregate equal-weight into portfolio-level
//! returns, metrics, and trades.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use quantlab_core::data::{BarCache, DataError, DataProvider};
use quantlab_core::domain::{JointTable, PriceTable, TradeRecord};
use quantlab_core::metrics::{equity_curve, MetricSet};
use quantlab_core::renko::{to_renko, RenkoError};
use quantlab_core::sim::{simulate, SimConfig, SimError, SimResult};
use quantlab_core::strategy::{registry, Strategy, StrategyError, StrategyKind};

use crate::config::{BacktestConfig, CandleMode, ConfigError, RunId};
use crate::portfolio::aggregate_equal_weight;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("data error for '{symbol}': {source}")]
    Data {
        symbol: String,
        #[source]
        source: DataError,
    },
    #[error(transparent)]
    Strategy(#[from] StrategyError),
    #[error("simulation failed for '{symbol}': {source}")]
    Sim {
        symbol: String,
        #[source]
        source: SimError,
    },
    #[error("renko reconstruction failed for '{symbol}': {source}")]
    Renko {
        symbol: String,
        #[source]
        source: RenkoError,
    },
    #[error("strategy produced no signal for '{0}'")]
    MissingSignal(String),
}

/// Everything a finished run exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub run_id: RunId,
    pub per_symbol: BTreeMap<String, SimResult>,
    /// Equal-weight portfolio log returns.
    pub portfolio_log_returns: Vec<f64>,
    pub portfolio_equity: Vec<f64>,
    /// Portfolio-level metrics over all trades.
    pub metrics: MetricSet,
    pub trades: Vec<TradeRecord>,
}

impl BacktestResult {
    pub fn total_trades(&self) -> usize {
        self.trades.len()
    }
}

/// Load every universe symbol through the cache and apply the candle mode.
pub fn load_universe(
    cache: &BarCache,
    provider: &dyn DataProvider,
    config: &BacktestConfig,
) -> Result<JointTable, RunError> {
    let mut joint = JointTable::new();
    for symbol in &config.universe {
        let table = cache
            .load_or_fetch(
                provider,
                symbol,
                config.interval,
                config.start_ts(),
                config.end_ts(),
            )
            .map_err(|source| RunError::Data {
                symbol: symbol.clone(),
                source,
            })?;
        joint.insert(apply_candle_mode(table, config.candle_mode)?);
    }
    Ok(joint)
}

fn apply_candle_mode(table: PriceTable, mode: CandleMode) -> Result<PriceTable, RunError> {
    match mode {
        CandleMode::Standard => Ok(table),
        CandleMode::Renko { brick } => {
            let symbol = table.symbol.clone();
            to_renko(&table, brick).map_err(|source| RunError::Renko { symbol, source })
        }
    }
}

/// Run a backtest on already-loaded data.
pub fn run_backtest_from_data(
    joint: &JointTable,
    config: &BacktestConfig,
) -> Result<BacktestResult, RunError> {
    let strategy = registry::build(&config.strategy)?;
    run_backtest_with_strategy(joint, strategy.as_ref(), config)
}

/// Run with an explicit strategy instance instead of a registry lookup.
pub fn run_backtest_with_strategy(
    joint: &JointTable,
    strategy: &dyn Strategy,
    config: &BacktestConfig,
) -> Result<BacktestResult, RunError> {
    let sim_config = SimConfig {
        interval: config.interval,
        sizer: config.sizer.clone(),
        costs: config.costs.clone(),
        stop_loss: config.stop_loss,
    };

    let mut per_symbol: BTreeMap<String, SimResult> = BTreeMap::new();

    match strategy.kind() {
        StrategyKind::Single => {
            for (symbol, table) in joint.iter() {
                let signal = strategy.signal(table, &config.params)?;
                let result =
                    simulate(table, &signal, &sim_config).map_err(|source| RunError::Sim {
                        symbol: symbol.clone(),
                        source,
                    })?;
                per_symbol.insert(symbol.clone(), result);
            }
        }
        StrategyKind::Portfolio => {
            // The joint table crosses the strategy exactly once; legs are
            // then simulated independently.
            let signals = strategy.portfolio_signals(joint, &config.params)?;
            for (symbol, table) in joint.iter() {
                let signal = signals
                    .get(symbol)
                    .ok_or_else(|| RunError::MissingSignal(symbol.clone()))?;
                let result =
                    simulate(table, signal, &sim_config).map_err(|source| RunError::Sim {
                        symbol: symbol.clone(),
                        source,
                    })?;
                per_symbol.insert(symbol.clone(), result);
            }
        }
    }

    let legs: Vec<Vec<f64>> = per_symbol
        .values()
        .map(|r| r.net_log_returns.clone())
        .collect();
    let portfolio_log_returns = aggregate_equal_weight(&legs);

    let mut trades: Vec<TradeRecord> = per_symbol
        .values()
        .flat_map(|r| r.trades.iter().cloned())
        .collect();
    trades.sort_by_key(|t| t.entry_ts);

    let metrics = MetricSet::compute(
        &portfolio_log_returns,
        &trades,
        config.interval.annualization_factor(),
    );

    Ok(BacktestResult {
        run_id: config.run_id()?,
        portfolio_equity: equity_curve(&portfolio_log_returns),
        per_symbol,
        portfolio_log_returns,
        metrics,
        trades,
    })
}

/// Load data and run in one call.
pub fn run_single_backtest(
    cache: &BarCache,
    provider: &dyn DataProvider,
    config: &BacktestConfig,
) -> Result<BacktestResult, RunError> {
    config.validate()?;
    let joint = load_universe(cache, provider, config)?;
    run_backtest_from_data(&joint, config)
}
