//! Strategy contract and built-in strategies.
//!
//! A strategy turns price history into a directional signal series. Two
//! shapes exist:
//!
//! - `Single`: one symbol in, one signal out; the runner fans it across a
//!   universe one symbol at a time
//! - `Portfolio`: the whole joint table in at once, one signal per symbol
//!   out; used by strategies that need cross-symbol state such as spreads
//!
//! Signals are computed on the full history and lagged by the simulator,
//! never by the strategy.

pub mod breakout;
pub mod ema_cross;
pub mod pair_spread;
pub mod registry;

pub use breakout::ChannelBreakout;
pub use ema_cross::EmaCross;
pub use pair_spread::PairSpread;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{JointTable, PriceTable, SignalSeries};

/// Parameter assignment for one simulation, keyed by parameter name.
pub type Params = BTreeMap<String, f64>;

/// Candidate values per parameter, in declaration order.
pub type ParamGrid = BTreeMap<String, Vec<f64>>;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("unknown strategy id '{0}'")]
    Unknown(String),
    #[error("strategy '{strategy}' missing required parameter '{param}'")]
    MissingParam {
        strategy: &'static str,
        param: &'static str,
    },
    #[error("strategy '{strategy}' parameter '{param}' is invalid: {reason}")]
    InvalidParam {
        strategy: &'static str,
        param: &'static str,
        reason: String,
    },
    #[error("strategy '{0}' operates on a single symbol, not a joint table")]
    NotPortfolio(&'static str),
    #[error("strategy '{0}' requires the joint table, not a single symbol")]
    NotSingle(&'static str),
    #[error("pair strategy needs exactly 2 symbols, got {0}")]
    NeedsPair(usize),
    #[error("symbols are not aligned: {left} has {left_len} bars, {right} has {right_len}")]
    Misaligned {
        left: String,
        left_len: usize,
        right: String,
        right_len: usize,
    },
}

/// Whether a strategy consumes one symbol or the joint table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Single,
    Portfolio,
}

pub trait Strategy: Send + Sync {
    /// Stable identifier used in configs and artifacts.
    fn id(&self) -> &'static str;

    fn kind(&self) -> StrategyKind;

    /// Signal for one symbol. Only called when `kind()` is `Single`.
    fn signal(&self, table: &PriceTable, params: &Params) -> Result<SignalSeries, StrategyError> {
        let _ = (table, params);
        Err(StrategyError::NotSingle(self.id()))
    }

    /// Signals for every symbol in the joint table. Only called when
    /// `kind()` is `Portfolio`.
    fn portfolio_signals(
        &self,
        joint: &JointTable,
        params: &Params,
    ) -> Result<BTreeMap<String, SignalSeries>, StrategyError> {
        let _ = (joint, params);
        Err(StrategyError::NotPortfolio(self.id()))
    }

    /// Default search grid for this strategy.
    fn default_grid(&self) -> ParamGrid;
}

/// Fetch a required parameter.
pub(crate) fn require(
    params: &Params,
    strategy: &'static str,
    name: &'static str,
) -> Result<f64, StrategyError> {
    params
        .get(name)
        .copied()
        .ok_or(StrategyError::MissingParam {
            strategy,
            param: name,
        })
}

/// A required parameter that must be a positive integer period.
pub(crate) fn require_period(
    params: &Params,
    strategy: &'static str,
    name: &'static str,
) -> Result<usize, StrategyError> {
    let v = require(params, strategy, name)?;
    if v < 1.0 || v.fract() != 0.0 || !v.is_finite() {
        return Err(StrategyError::InvalidParam {
            strategy,
            param: name,
            reason: format!("expected positive integer, got {v}"),
        });
    }
    Ok(v as usize)
}
