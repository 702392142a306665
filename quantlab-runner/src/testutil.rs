//! Shared fixtures for unit tests.

use chrono::{Duration, NaiveDate};
use quantlab_core::domain::{Bar, PriceTable};

pub fn daily_table(symbol: &str, closes: &[f64]) -> PriceTable {
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
            high: c * 1.005,
            low: c * 0.995,
            close: c,
            volume: 1_000_000.0,
        })
        .collect();
    PriceTable::new(symbol, bars).unwrap()
}

/// Geometric drift with a deterministic wobble, long enough for warmups.
pub fn trending_closes(n: usize, drift: f64) -> Vec<f64> {
    (0..n)
        .map(|i| 100.0 * ((drift * i as f64) + 0.01 * (i as f64 * 0.7).sin()).exp())
        .collect()
}

/// Mean-reverting wobble around a level, no drift.
pub fn choppy_closes(n: usize, seed: u64) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let x = (i as u64)
                .wrapping_add(seed)
                .wrapping_mul(6364136223846793005);
            100.0 + ((x % 1000) as f64 / 1000.0 - 0.5) * 4.0
        })
        .collect()
}
