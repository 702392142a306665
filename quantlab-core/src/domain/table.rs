//! PriceTable and JointTable — rectangular, time-ordered market data.
//!
//! A `PriceTable` holds one symbol's bars plus named indicator columns, all
//! the same length. A `JointTable` holds the per-symbol tables for a
//! portfolio strategy; symbol insertion order never matters (BTreeMap), but
//! rows within a symbol are strictly time-ordered.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::bar::Bar;

/// Errors from table construction and column operations.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("duplicate timestamp {ts} in table for '{symbol}'")]
    DuplicateTimestamp { symbol: String, ts: NaiveDateTime },
    #[error("timestamps out of order at row {row} in table for '{symbol}'")]
    UnorderedTimestamps { symbol: String, row: usize },
    #[error("column '{name}' has {got} rows, table has {expected}")]
    ColumnLengthMismatch { name: String, got: usize, expected: usize },
    #[error("column '{0}' not found")]
    ColumnNotFound(String),
}

/// Per-bar directional instruction produced by a strategy.
///
/// Values are -1/0/+1 for discrete strategies or a continuous target weight.
/// Always aligned 1:1 with the table that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSeries {
    pub values: Vec<f64>,
}

impl SignalSeries {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Constant series of the given length.
    pub fn flat(value: f64, len: usize) -> Self {
        Self {
            values: vec![value; len],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Time-ordered OHLCV rows for one symbol plus indicator columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTable {
    pub symbol: String,
    bars: Vec<Bar>,
    columns: BTreeMap<String, Vec<f64>>,
    /// Row indices whose prices were forward-filled during sanitization.
    filled_rows: Vec<usize>,
}

impl PriceTable {
    /// Build a table, enforcing strictly increasing timestamps.
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> Result<Self, TableError> {
        let symbol = symbol.into();
        for (i, pair) in bars.windows(2).enumerate() {
            if pair[1].ts == pair[0].ts {
                return Err(TableError::DuplicateTimestamp { symbol, ts: pair[1].ts });
            }
            if pair[1].ts < pair[0].ts {
                return Err(TableError::UnorderedTimestamps { symbol, row: i + 1 });
            }
        }
        Ok(Self {
            symbol,
            bars,
            columns: BTreeMap::new(),
            filled_rows: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn timestamps(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        self.bars.iter().map(|b| b.ts)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Per-bar log returns; first element is 0.0 so the series stays aligned.
    pub fn log_returns(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.bars.len()];
        for i in 1..self.bars.len() {
            let prev = self.bars[i - 1].close;
            let cur = self.bars[i].close;
            if prev > 0.0 && cur > 0.0 {
                out[i] = (cur / prev).ln();
            }
        }
        out
    }

    /// Attach a named indicator column. Length must match the bar count.
    pub fn set_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<(), TableError> {
        let name = name.into();
        if values.len() != self.bars.len() {
            return Err(TableError::ColumnLengthMismatch {
                name,
                got: values.len(),
                expected: self.bars.len(),
            });
        }
        self.columns.insert(name, values);
        Ok(())
    }

    pub fn column(&self, name: &str) -> Result<&[f64], TableError> {
        self.columns
            .get(name)
            .map(|v| v.as_slice())
            .ok_or_else(|| TableError::ColumnNotFound(name.to_string()))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|s| s.as_str())
    }

    /// Rows whose prices were forward-filled by `sanitize`.
    pub fn filled_rows(&self) -> &[usize] {
        &self.filled_rows
    }

    /// NaN policy: drop leading void rows, forward-fill interior void rows
    /// from the last valid bar, and record the filled indices. Metrics and
    /// the simulation core never see NaN prices.
    pub fn sanitize(&mut self) {
        let first_valid = match self.bars.iter().position(|b| !b.is_void()) {
            Some(i) => i,
            None => {
                self.bars.clear();
                for col in self.columns.values_mut() {
                    col.clear();
                }
                return;
            }
        };
        if first_valid > 0 {
            self.bars.drain(..first_valid);
            for col in self.columns.values_mut() {
                col.drain(..first_valid);
            }
        }

        let mut filled = Vec::new();
        for i in 1..self.bars.len() {
            if self.bars[i].is_void() {
                let carry = self.bars[i - 1].close;
                let bar = &mut self.bars[i];
                bar.open = carry;
                bar.high = carry;
                bar.low = carry;
                bar.close = carry;
                if bar.volume.is_nan() {
                    bar.volume = 0.0;
                }
                filled.push(i);
            }
        }
        self.filled_rows = filled;
    }

    /// Rows with `ts` in `[from, to)`, with indicator columns sliced to match.
    pub fn slice_time(&self, from: NaiveDateTime, to: NaiveDateTime) -> PriceTable {
        let start = self.bars.partition_point(|b| b.ts < from);
        let end = self.bars.partition_point(|b| b.ts < to);
        self.slice_rows(start, end)
    }

    /// Rows `[start, end)` by index, clamped to the table bounds.
    pub fn slice_rows(&self, start: usize, end: usize) -> PriceTable {
        let end = end.min(self.bars.len());
        let start = start.min(end);
        let columns = self
            .columns
            .iter()
            .map(|(k, v)| (k.clone(), v[start..end].to_vec()))
            .collect();
        PriceTable {
            symbol: self.symbol.clone(),
            bars: self.bars[start..end].to_vec(),
            columns,
            filled_rows: self
                .filled_rows
                .iter()
                .filter(|&&r| r >= start && r < end)
                .map(|&r| r - start)
                .collect(),
        }
    }
}

/// Multi-symbol view for portfolio strategies: symbol → PriceTable.
///
/// Keyed by BTreeMap so iteration order is the sorted symbol set, independent
/// of insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JointTable {
    tables: BTreeMap<String, PriceTable>,
}

impl JointTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tables(tables: impl IntoIterator<Item = PriceTable>) -> Self {
        let mut joint = Self::new();
        for t in tables {
            joint.insert(t);
        }
        joint
    }

    pub fn insert(&mut self, table: PriceTable) {
        self.tables.insert(table.symbol.clone(), table);
    }

    pub fn get(&self, symbol: &str) -> Option<&PriceTable> {
        self.tables.get(symbol)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PriceTable)> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Earliest and latest timestamp across all symbols, None when empty.
    pub fn time_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let mut range: Option<(NaiveDateTime, NaiveDateTime)> = None;
        for table in self.tables.values() {
            let (Some(first), Some(last)) = (table.bars().first(), table.bars().last()) else {
                continue;
            };
            range = Some(match range {
                None => (first.ts, last.ts),
                Some((lo, hi)) => (lo.min(first.ts), hi.max(last.ts)),
            });
        }
        range
    }

    /// Slice every symbol's table to `[from, to)`.
    pub fn slice_time(&self, from: NaiveDateTime, to: NaiveDateTime) -> JointTable {
        JointTable {
            tables: self
                .tables
                .iter()
                .map(|(k, v)| (k.clone(), v.slice_time(from, to)))
                .collect(),
        }
    }

    /// Restrict to the given symbols, dropping the rest.
    pub fn restrict(&self, symbols: &[String]) -> JointTable {
        JointTable {
            tables: self
                .tables
                .iter()
                .filter(|(k, _)| symbols.contains(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}
