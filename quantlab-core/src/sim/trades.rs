//! FIFO trade extraction from a position series.
//!
//! The simulator works in exposure space, so "trades" are reconstructed
//! after the fact: each increase in position magnitude opens a lot, each
//! decrease closes the oldest open lots first, splitting a lot when only
//! part of it is closed. A sign flip closes every open lot and opens the
//! remainder on the new side. Lots still open at the end of the series are
//! closed at the final bar.

use crate::domain::{Bar, TradeDirection, TradeRecord};

#[derive(Debug, Clone)]
struct OpenLot {
    entry_idx: usize,
    size: f64, // signed exposure
}

/// Rebuild the trade log from traded positions and the bar series.
///
/// `positions[i]` is the exposure held during bar i; fills happen at the
/// close of the bar where the position changes.
pub fn extract_trades(symbol: &str, positions: &[f64], bars: &[Bar]) -> Vec<TradeRecord> {
    let n = positions.len().min(bars.len());
    let mut trades = Vec::new();
    let mut open: Vec<OpenLot> = Vec::new();
    let mut prev = 0.0_f64;

    for i in 0..n {
        let target = positions[i];
        if (target - prev).abs() < 1e-12 {
            continue;
        }

        if prev != 0.0 && target * prev < 0.0 {
            // Sign flip: close everything, then open the new side.
            close_lots(symbol, &mut open, &mut trades, bars, i, f64::INFINITY);
            open.push(OpenLot {
                entry_idx: i,
                size: target,
            });
        } else if target.abs() > prev.abs() {
            open.push(OpenLot {
                entry_idx: i,
                size: target - prev,
            });
        } else {
            close_lots(
                symbol,
                &mut open,
                &mut trades,
                bars,
                i,
                (prev - target).abs(),
            );
        }
        prev = target;
    }

    if !open.is_empty() && n > 0 {
        close_lots(symbol, &mut open, &mut trades, bars, n - 1, f64::INFINITY);
    }
    trades
}

/// Close up to `amount` of exposure from the oldest lots at bar `exit_idx`.
fn close_lots(
    symbol: &str,
    open: &mut Vec<OpenLot>,
    trades: &mut Vec<TradeRecord>,
    bars: &[Bar],
    exit_idx: usize,
    mut amount: f64,
) {
    while amount > 1e-12 && !open.is_empty() {
        let lot = &mut open[0];
        let closing = lot.size.abs().min(amount);
        let signed = closing * lot.size.signum();

        let entry = &bars[lot.entry_idx];
        let exit = &bars[exit_idx];
        let direction = if lot.size > 0.0 {
            TradeDirection::Long
        } else {
            TradeDirection::Short
        };
        let ret = match direction {
            TradeDirection::Long => exit.close / entry.close - 1.0,
            TradeDirection::Short => entry.close / exit.close - 1.0,
        };
        trades.push(TradeRecord {
            symbol: symbol.to_string(),
            direction,
            entry_ts: entry.ts,
            entry_price: entry.close,
            exit_ts: exit.ts,
            exit_price: exit.close,
            size: closing,
            pnl: closing * ret,
            bars_held: exit_idx - lot.entry_idx,
        });

        lot.size -= signed;
        amount -= closing;
        if lot.size.abs() < 1e-12 {
            open.remove(0);
        }
    }
}
