//! Incremental Parquet bar cache.
//!
//! Layout: `{cache_dir}/symbol={SYMBOL}/{interval}.parquet` with a
//! `{interval}.meta.json` sidecar recording the covered range and a content
//! hash.
//!
//! Loads go through [`BarCache::load_or_fetch`]: if the cached range covers
//! the request only the cache is read; otherwise just the missing head/tail
//! ranges are fetched from the provider, merged with the cached bars,
//! deduplicated by timestamp, and written back atomically (.tmp then
//! rename).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::provider::{DataError, DataProvider};
use crate::domain::{Bar, BarInterval, PriceTable};

/// Metadata sidecar for one cached (symbol, interval) series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub symbol: String,
    pub interval: BarInterval,
    pub first_ts: NaiveDateTime,
    pub last_ts: NaiveDateTime,
    pub bar_count: usize,
    pub data_hash: String,
    pub source: String,
    pub cached_at: NaiveDateTime,
}

pub struct BarCache {
    cache_dir: PathBuf,
}

impl BarCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.cache_dir.join(format!("symbol={symbol}"))
    }

    fn data_path(&self, symbol: &str, interval: BarInterval) -> PathBuf {
        self.symbol_dir(symbol).join(format!("{interval}.parquet"))
    }

    fn meta_path(&self, symbol: &str, interval: BarInterval) -> PathBuf {
        self.symbol_dir(symbol).join(format!("{interval}.meta.json"))
    }

    pub fn meta(&self, symbol: &str, interval: BarInterval) -> Option<CacheMeta> {
        let content = fs::read_to_string(self.meta_path(symbol, interval)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Load bars for the requested range, fetching only what the cache is
    /// missing. Returns a sanitized [`PriceTable`] restricted to
    /// `[start, end)`.
    pub fn load_or_fetch(
        &self,
        provider: &dyn DataProvider,
        symbol: &str,
        interval: BarInterval,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<PriceTable, DataError> {
        let mut bars = self.load_bars(symbol, interval).unwrap_or_default();

        let needs_head = bars.first().map_or(true, |b| b.ts > start);
        let needs_tail = bars.last().map_or(true, |b| b.ts < end - interval.span());

        let mut dirty = false;
        if bars.is_empty() {
            bars = provider.fetch(symbol, interval, start, end)?.bars;
            dirty = true;
        } else {
            if needs_head {
                let head_end = bars[0].ts;
                if let Ok(res) = provider.fetch(symbol, interval, start, head_end) {
                    bars.extend(res.bars);
                    dirty = true;
                }
            }
            if needs_tail {
                let tail_start = bars[bars.len() - 1].ts + interval.span();
                if let Ok(res) = provider.fetch(symbol, interval, tail_start, end) {
                    bars.extend(res.bars);
                    dirty = true;
                }
            }
        }

        // Merge on timestamp. Cached rows were pushed first and fetched rows
        // after, so later map inserts overwrite: a bar the provider re-serves
        // replaces its stale cached copy.
        let merged: BTreeMap<NaiveDateTime, Bar> =
            bars.into_iter().map(|b| (b.ts, b)).collect();
        let bars: Vec<Bar> = merged.into_values().collect();

        if dirty && !bars.is_empty() {
            self.write_bars(symbol, interval, &bars, provider.name())?;
        }

        let selected: Vec<Bar> = bars
            .into_iter()
            .filter(|b| b.ts >= start && b.ts < end)
            .collect();
        if selected.is_empty() {
            return Err(DataError::EmptyRange {
                symbol: symbol.to_string(),
            });
        }

        let mut table = PriceTable::new(symbol, selected)
            .map_err(|e| DataError::CacheError(e.to_string()))?;
        table.sanitize();
        Ok(table)
    }

    /// Write a full bar series for a symbol+interval, atomically.
    pub fn write_bars(
        &self,
        symbol: &str,
        interval: BarInterval,
        bars: &[Bar],
        source: &str,
    ) -> Result<(), DataError> {
        if bars.is_empty() {
            return Err(DataError::CacheError("no bars to cache".into()));
        }
        let dir = self.symbol_dir(symbol);
        fs::create_dir_all(&dir)
            .map_err(|e| DataError::CacheError(format!("create dir: {e}")))?;

        let df = bars_to_dataframe(bars)?;
        let path = self.data_path(symbol, interval);
        let tmp = path.with_extension("parquet.tmp");
        write_parquet(&df, &tmp)?;
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            DataError::CacheError(format!("atomic rename failed: {e}"))
        })?;

        let meta = CacheMeta {
            symbol: symbol.to_string(),
            interval,
            first_ts: bars[0].ts,
            last_ts: bars[bars.len() - 1].ts,
            bar_count: bars.len(),
            data_hash: blake3::hash(
                &serde_json::to_vec(bars)
                    .map_err(|e| DataError::CacheError(format!("hash serialization: {e}")))?,
            )
            .to_hex()
            .to_string(),
            source: source.to_string(),
            cached_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::CacheError(format!("meta serialization: {e}")))?;
        fs::write(self.meta_path(symbol, interval), meta_json)
            .map_err(|e| DataError::CacheError(format!("meta write: {e}")))?;
        Ok(())
    }

    /// Load all cached bars for a symbol+interval, sorted ascending.
    pub fn load_bars(
        &self,
        symbol: &str,
        interval: BarInterval,
    ) -> Result<Vec<Bar>, DataError> {
        let path = self.data_path(symbol, interval);
        if !path.exists() {
            return Err(DataError::NoCachedData {
                symbol: symbol.to_string(),
                interval,
            });
        }
        match load_and_validate_parquet(&path) {
            Ok(mut bars) => {
                bars.sort_by_key(|b| b.ts);
                Ok(bars)
            }
            Err(e) => {
                // Quarantine the corrupt file so the next load refetches.
                let quarantine = path.with_extension("parquet.quarantined");
                let _ = fs::rename(&path, &quarantine);
                Err(DataError::CacheError(format!(
                    "quarantined corrupt cache file {}: {e}",
                    path.display()
                )))
            }
        }
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

const COLUMNS: [&str; 6] = ["ts", "open", "high", "low", "close", "volume"];

fn bars_to_dataframe(bars: &[Bar]) -> Result<DataFrame, DataError> {
    let ts: Vec<i64> = bars.iter().map(|b| b.ts.and_utc().timestamp()).collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    DataFrame::new(vec![
        Column::new("ts".into(), ts),
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), DataError> {
    let file =
        fs::File::create(path).map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    Ok(())
}

fn load_and_validate_parquet(path: &Path) -> Result<Vec<Bar>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::ParquetError(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(DataError::ParquetError("empty parquet file".into()));
    }
    for col in &COLUMNS {
        if df.column(col).is_err() {
            return Err(DataError::ParquetError(format!("missing column '{col}'")));
        }
    }
    dataframe_to_bars(&df)
}

fn dataframe_to_bars(df: &DataFrame) -> Result<Vec<Bar>, DataError> {
    let col_err = |e: PolarsError| DataError::ParquetError(format!("column read: {e}"));
    let ts_ca = df.column("ts").map_err(col_err)?.i64().map_err(col_err)?;
    let open_ca = df.column("open").map_err(col_err)?.f64().map_err(col_err)?;
    let high_ca = df.column("high").map_err(col_err)?.f64().map_err(col_err)?;
    let low_ca = df.column("low").map_err(col_err)?.f64().map_err(col_err)?;
    let close_ca = df.column("close").map_err(col_err)?.f64().map_err(col_err)?;
    let vol_ca = df.column("volume").map_err(col_err)?.f64().map_err(col_err)?;

    let mut bars = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let epoch = ts_ca
            .get(i)
            .ok_or_else(|| DataError::ParquetError(format!("null ts at row {i}")))?;
        let ts = chrono::DateTime::from_timestamp(epoch, 0)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| DataError::ParquetError(format!("invalid ts: {epoch}")))?;
        bars.push(Bar {
            ts,
            open: open_ca.get(i).unwrap_or(f64::NAN),
            high: high_ca.get(i).unwrap_or(f64::NAN),
            low: low_ca.get(i).unwrap_or(f64::NAN),
            close: close_ca.get(i).unwrap_or(f64::NAN),
            volume: vol_ca.get(i).unwrap_or(0.0),
        });
    }
    Ok(bars)
}
