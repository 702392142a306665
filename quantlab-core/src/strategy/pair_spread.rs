//! Mean-reversion pair spread strategy.

use std::collections::BTreeMap;

use crate::domain::{JointTable, SignalSeries};
use crate::strategy::{
    require, require_period, ParamGrid, Params, Strategy, StrategyError, StrategyKind,
};

/// Trades the z-score of the log-price spread between two symbols.
///
/// The alphabetically first symbol is the dependent leg; its log price is
/// regressed on the other leg over a trailing `lookback` window to get the
/// hedge ratio, and the spread z-score uses the same window. A spread-short
/// position (short the dependent leg, long the other) opens when z exceeds
/// `entry_z`, the mirror opens below `-entry_z`, and both close once |z|
/// falls inside `exit_z`.
///
/// Parameters: `lookback`, `entry_z`, `exit_z`.
#[derive(Debug, Default, Clone)]
pub struct PairSpread;

impl PairSpread {
    pub const ID: &'static str = "pair_spread";
}

impl Strategy for PairSpread {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Portfolio
    }

    fn portfolio_signals(
        &self,
        joint: &JointTable,
        params: &Params,
    ) -> Result<BTreeMap<String, SignalSeries>, StrategyError> {
        let lookback = require_period(params, Self::ID, "lookback")?;
        let entry_z = require(params, Self::ID, "entry_z")?;
        let exit_z = require(params, Self::ID, "exit_z")?;
        if exit_z >= entry_z {
            return Err(StrategyError::InvalidParam {
                strategy: Self::ID,
                param: "exit_z",
                reason: format!("exit_z ({exit_z}) must be below entry_z ({entry_z})"),
            });
        }

        let symbols = joint.symbols();
        if symbols.len() != 2 {
            return Err(StrategyError::NeedsPair(symbols.len()));
        }
        let (dep_sym, base_sym) = (&symbols[0], &symbols[1]);
        let dep = joint.get(dep_sym).ok_or(StrategyError::NeedsPair(0))?;
        let base = joint.get(base_sym).ok_or(StrategyError::NeedsPair(0))?;
        if dep.len() != base.len() {
            return Err(StrategyError::Misaligned {
                left: dep_sym.clone(),
                left_len: dep.len(),
                right: base_sym.clone(),
                right_len: base.len(),
            });
        }

        let y: Vec<f64> = dep.closes().iter().map(|c| c.ln()).collect();
        let x: Vec<f64> = base.closes().iter().map(|c| c.ln()).collect();
        let n = y.len();

        let mut dep_sig = vec![0.0; n];
        let mut base_sig = vec![0.0; n];
        let mut state = 0.0_f64; // +1 long spread (long dep), -1 short spread

        for i in lookback..n {
            let yw = &y[i - lookback..i];
            let xw = &x[i - lookback..i];
            let Some(beta) = trailing_beta(yw, xw) else {
                continue;
            };
            let spreads: Vec<f64> = yw.iter().zip(xw).map(|(yv, xv)| yv - beta * xv).collect();
            let mean = spreads.iter().sum::<f64>() / spreads.len() as f64;
            let var = spreads.iter().map(|s| (s - mean).powi(2)).sum::<f64>()
                / (spreads.len() - 1) as f64;
            if var < 1e-18 {
                continue;
            }
            let z = (y[i] - beta * x[i] - mean) / var.sqrt();

            if state == 0.0 {
                if z > entry_z {
                    state = -1.0;
                } else if z < -entry_z {
                    state = 1.0;
                }
            } else if z.abs() < exit_z {
                state = 0.0;
            }
            dep_sig[i] = state;
            base_sig[i] = -state;
        }

        let mut out = BTreeMap::new();
        out.insert(dep_sym.clone(), SignalSeries::new(dep_sig));
        out.insert(base_sym.clone(), SignalSeries::new(base_sig));
        Ok(out)
    }

    fn default_grid(&self) -> ParamGrid {
        let mut grid = ParamGrid::new();
        grid.insert("lookback".into(), vec![30.0, 60.0, 90.0, 120.0]);
        grid.insert("entry_z".into(), vec![1.5, 2.0, 2.5]);
        grid.insert("exit_z".into(), vec![0.25, 0.5, 0.75]);
        grid
    }
}

/// Slope of y on x over the window, None when x is degenerate.
fn trailing_beta(y: &[f64], x: &[f64]) -> Option<f64> {
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var = 0.0;
    for (&a, &b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        var += (a - mx).powi(2);
    }
    if var < 1e-18 {
        None
    } else {
        Some(cov / var)
    }
}
