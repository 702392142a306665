//! Bar and bar-interval types — the fundamental market data units.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// OHLCV bar for a single symbol at a single timestamp.
///
/// Timestamps are naive (exchange-local); intraday intervals carry the bar's
/// opening time. Volume is `f64` because forex and spread symbols report
/// fractional or synthetic volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Returns true if any OHLC field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high bounds the range, prices positive.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }
}

/// Bar interval for a backtest.
///
/// The annualization factor is interval-specific: intraday intervals scale by
/// bars-per-session, not by a hardcoded daily constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BarInterval {
    Min1,
    Min2,
    Min5,
    Min15,
    Min30,
    Hour1,
    Min90,
    Day1,
    Week1,
    Month1,
}

impl BarInterval {
    /// Periods per year for this interval, used to annualize returns and
    /// volatility. Intraday factors assume a 252-day equity session.
    pub fn annualization_factor(&self) -> f64 {
        match self {
            BarInterval::Min1 => 252.0 * 390.0,
            BarInterval::Min2 => 252.0 * 195.0,
            BarInterval::Min5 => 252.0 * 78.0,
            BarInterval::Min15 => 252.0 * 26.0,
            BarInterval::Min30 => 252.0 * 13.0,
            BarInterval::Hour1 => 252.0 * 7.0,
            BarInterval::Min90 => 252.0 * 4.0,
            BarInterval::Day1 => 252.0,
            BarInterval::Week1 => 52.0,
            BarInterval::Month1 => 12.0,
        }
    }

    /// Nominal wall-clock span of one bar, used for cache gap arithmetic.
    pub fn span(&self) -> Duration {
        match self {
            BarInterval::Min1 => Duration::minutes(1),
            BarInterval::Min2 => Duration::minutes(2),
            BarInterval::Min5 => Duration::minutes(5),
            BarInterval::Min15 => Duration::minutes(15),
            BarInterval::Min30 => Duration::minutes(30),
            BarInterval::Hour1 => Duration::hours(1),
            BarInterval::Min90 => Duration::minutes(90),
            BarInterval::Day1 => Duration::days(1),
            BarInterval::Week1 => Duration::weeks(1),
            BarInterval::Month1 => Duration::days(30),
        }
    }

    /// Parse the conventional short form used in configs ("1d", "1h", "5m"...).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(BarInterval::Min1),
            "2m" => Some(BarInterval::Min2),
            "5m" => Some(BarInterval::Min5),
            "15m" => Some(BarInterval::Min15),
            "30m" => Some(BarInterval::Min30),
            "60m" | "1h" => Some(BarInterval::Hour1),
            "90m" => Some(BarInterval::Min90),
            "1d" => Some(BarInterval::Day1),
            "5d" | "1wk" => Some(BarInterval::Week1),
            "1mo" => Some(BarInterval::Month1),
            _ => None,
        }
    }

    /// The short form, inverse of `parse`.
    pub fn as_str(&self) -> &'static str {
        match self {
            BarInterval::Min1 => "1m",
            BarInterval::Min2 => "2m",
            BarInterval::Min5 => "5m",
            BarInterval::Min15 => "15m",
            BarInterval::Min30 => "30m",
            BarInterval::Hour1 => "1h",
            BarInterval::Min90 => "90m",
            BarInterval::Day1 => "1d",
            BarInterval::Week1 => "1wk",
            BarInterval::Month1 => "1mo",
        }
    }
}

impl std::fmt::Display for BarInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Configs and artifacts use the short form ("1d", "1h"), so the serde
// representation goes through it rather than the variant names.
impl Serialize for BarInterval {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BarInterval {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown bar interval '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_bar() -> Bar {
        Bar {
            ts: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 103.0,
            volume: 50_000.0,
        }
    }

    #[test]
    fn bar_is_sane() {
        assert!(sample_bar().is_sane());
    }

    #[test]
    fn bar_detects_void() {
        let mut bar = sample_bar();
        bar.close = f64::NAN;
        assert!(bar.is_void());
        assert!(!bar.is_sane());
    }

    #[test]
    fn bar_detects_insane_high_low() {
        let mut bar = sample_bar();
        bar.high = 97.0; // below low
        assert!(!bar.is_sane());
    }

    #[test]
    fn interval_parse_roundtrip() {
        for s in ["1m", "2m", "5m", "15m", "30m", "1h", "90m", "1d", "1wk", "1mo"] {
            let iv = BarInterval::parse(s).unwrap();
            assert_eq!(iv.as_str(), s);
        }
        assert!(BarInterval::parse("7d").is_none());
    }

    #[test]
    fn interval_serde_uses_short_form() {
        let json = serde_json::to_string(&BarInterval::Hour1).unwrap();
        assert_eq!(json, "\"1h\"");
        let back: BarInterval = serde_json::from_str("\"1d\"").unwrap();
        assert_eq!(back, BarInterval::Day1);
        assert!(serde_json::from_str::<BarInterval>("\"7d\"").is_err());
    }

    #[test]
    fn interval_orders_finest_to_coarsest() {
        assert!(BarInterval::Min1 < BarInterval::Hour1);
        assert!(BarInterval::Hour1 < BarInterval::Day1);
        assert!(BarInterval::Day1 < BarInterval::Month1);

        // Usable as a composite map key.
        let mut map = std::collections::BTreeMap::new();
        map.insert(("SPY".to_string(), BarInterval::Day1), 1);
        map.insert(("SPY".to_string(), BarInterval::Hour1), 2);
        assert_eq!(map.get(&("SPY".to_string(), BarInterval::Day1)), Some(&1));
    }

    #[test]
    fn daily_annualization_is_252() {
        assert_eq!(BarInterval::Day1.annualization_factor(), 252.0);
    }

    #[test]
    fn intraday_annualization_exceeds_daily() {
        assert!(BarInterval::Min5.annualization_factor() > BarInterval::Day1.annualization_factor());
    }
}
