//! TradeRecord — a completed round-trip lot.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Direction of a trade lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDirection {
    Long,
    Short,
}

/// One round-trip lot reconstructed from the position series.
///
/// Positions that scale in and out produce fractional lots matched
/// first-in-first-out, so `size` is the lot's exposure fraction, not shares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub direction: TradeDirection,
    pub entry_ts: NaiveDateTime,
    pub entry_price: f64,
    pub exit_ts: NaiveDateTime,
    pub exit_price: f64,
    /// Exposure fraction of the lot (always positive).
    pub size: f64,
    /// Realized simple return of the lot, signed by direction and scaled by size.
    pub pnl: f64,
    pub bars_held: usize,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn trade_serialization_roundtrip() {
        let trade = TradeRecord {
            symbol: "EURUSD=X".into(),
            direction: TradeDirection::Long,
            entry_ts: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            entry_price: 1.09,
            exit_ts: NaiveDate::from_ymd_opt(2024, 1, 11).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            exit_price: 1.10,
            size: 0.5,
            pnl: 0.0045,
            bars_held: 4,
        };
        let json = serde_json::to_string(&trade).unwrap();
        let deser: TradeRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(trade.symbol, deser.symbol);
        assert_eq!(trade.pnl, deser.pnl);
        assert!(deser.is_winner());
    }
}
