//! Data provider trait and structured error types.
//!
//! The DataProvider trait abstracts over bar sources (remote chart API,
//! CSV import, in-memory fixtures) so the cache and runner can swap
//! implementations and tests can run without a network.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Bar, BarInterval};

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("interval {interval} not supported by provider '{provider}'")]
    IntervalUnsupported {
        interval: BarInterval,
        provider: String,
    },

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("no cached data for '{symbol}' at {interval}")]
    NoCachedData {
        symbol: String,
        interval: BarInterval,
    },

    #[error("no bars for '{symbol}' in the requested range")]
    EmptyRange { symbol: String },

    #[error("data error: {0}")]
    Other(String),
}

/// Where a batch of bars came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Remote,
    Cache,
    Fixture,
}

/// Result of a successful fetch for one symbol.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub symbol: String,
    pub interval: BarInterval,
    pub bars: Vec<Bar>,
    pub source: DataSource,
}

/// Bar source. Providers fetch raw bars; validation, forward-fill, and
/// caching all happen above this trait.
pub trait DataProvider: Send + Sync {
    fn name(&self) -> &str;

    fn fetch(
        &self,
        symbol: &str,
        interval: BarInterval,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<FetchResult, DataError>;
}

/// Progress callback for multi-symbol loads.
pub trait LoadProgress: Send {
    fn on_start(&self, symbol: &str, index: usize, total: usize);
    fn on_complete(&self, symbol: &str, result: &Result<(), DataError>);
}

/// No-op progress reporter.
pub struct SilentProgress;

impl LoadProgress for SilentProgress {
    fn on_start(&self, _symbol: &str, _index: usize, _total: usize) {}
    fn on_complete(&self, _symbol: &str, _result: &Result<(), DataError>) {}
}

/// In-memory provider serving pre-loaded bars. Used by tests and by the
/// batch workers, which receive their data up front.
#[derive(Debug, Default)]
pub struct FixtureProvider {
    series: std::collections::BTreeMap<(String, BarInterval), Vec<Bar>>,
}

impl FixtureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(
        mut self,
        symbol: impl Into<String>,
        interval: BarInterval,
        bars: Vec<Bar>,
    ) -> Self {
        self.series.insert((symbol.into(), interval), bars);
        self
    }
}

impl DataProvider for FixtureProvider {
    fn name(&self) -> &str {
        "fixture"
    }

    fn fetch(
        &self,
        symbol: &str,
        interval: BarInterval,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<FetchResult, DataError> {
        let bars = self
            .series
            .get(&(symbol.to_string(), interval))
            .ok_or_else(|| DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            })?;
        let selected: Vec<Bar> = bars
            .iter()
            .filter(|b| b.ts >= start && b.ts < end)
            .cloned()
            .collect();
        if selected.is_empty() {
            return Err(DataError::EmptyRange {
                symbol: symbol.to_string(),
            });
        }
        Ok(FetchResult {
            symbol: symbol.to_string(),
            interval,
            bars: selected,
            source: DataSource::Fixture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn daily_bars(n: usize) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n)
            .map(|i| Bar {
                ts: start + Duration::days(i as i64),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn fixture_serves_half_open_range() {
        let bars = daily_bars(10);
        let provider =
            FixtureProvider::new().with_series("SPY", BarInterval::Day1, bars.clone());
        let start = bars[2].ts;
        let end = bars[5].ts;
        let res = provider.fetch("SPY", BarInterval::Day1, start, end).unwrap();
        assert_eq!(res.bars.len(), 3);
        assert_eq!(res.source, DataSource::Fixture);
    }

    #[test]
    fn fixture_unknown_symbol_errors() {
        let provider = FixtureProvider::new();
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert!(matches!(
            provider.fetch("QQQ", BarInterval::Day1, ts, ts),
            Err(DataError::SymbolNotFound { .. })
        ));
    }
}
