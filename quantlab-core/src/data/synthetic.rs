//! Synthetic spread instruments.
//!
//! Builds a tradeable series from two legs by timestamp intersection:
//! either a hedge-weighted difference or a ratio. The synthetic bar's OHLC
//! is derived from the legs' closes only (intraleg highs and lows do not
//! line up in time), so open = close of the prior row and high/low bracket
//! the two.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Bar, PriceTable, TableError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpreadKind {
    /// `left - hedge * right`
    Diff,
    /// `left / right` (hedge ignored)
    Ratio,
}

#[derive(Debug, Error)]
pub enum SyntheticError {
    #[error("no overlapping timestamps between '{left}' and '{right}'")]
    NoOverlap { left: String, right: String },
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Build the spread series between two legs over their common timestamps.
pub fn spread_table(
    left: &PriceTable,
    right: &PriceTable,
    kind: SpreadKind,
    hedge: f64,
) -> Result<PriceTable, SyntheticError> {
    let right_closes: std::collections::BTreeMap<_, _> =
        right.bars().iter().map(|b| (b.ts, b.close)).collect();

    let mut rows: Vec<(chrono::NaiveDateTime, f64, f64)> = Vec::new();
    for b in left.bars() {
        if let Some(&rc) = right_closes.get(&b.ts) {
            let value = match kind {
                SpreadKind::Diff => b.close - hedge * rc,
                SpreadKind::Ratio => {
                    if rc.abs() < 1e-12 {
                        continue;
                    }
                    b.close / rc
                }
            };
            rows.push((b.ts, value, b.volume));
        }
    }
    if rows.is_empty() {
        return Err(SyntheticError::NoOverlap {
            left: left.symbol.clone(),
            right: right.symbol.clone(),
        });
    }

    let mut bars = Vec::with_capacity(rows.len());
    let mut prev = rows[0].1;
    for (ts, value, volume) in rows {
        bars.push(Bar {
            ts,
            open: prev,
            high: value.max(prev),
            low: value.min(prev),
            close: value,
            volume,
        });
        prev = value;
    }

    let tag = match kind {
        SpreadKind::Diff => "DIFF",
        SpreadKind::Ratio => "RATIO",
    };
    let symbol = format!("{}~{}:{}", left.symbol, right.symbol, tag);
    Ok(PriceTable::new(symbol, bars)?)
}
