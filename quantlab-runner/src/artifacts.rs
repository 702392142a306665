//! Run artifacts — JSON and CSV outputs for a finished run.
//!
//! Every run persists the same bundle under `{output_dir}/{run_id}/`:
//! - `metrics.json` — portfolio metrics plus the optimized universe
//! - `equity.csv` — bar-by-bar portfolio equity
//! - `trades.csv` — the full trade tape
//! - `presets.json` — top-K parameter presets, reusable as a config seed

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use quantlab_core::domain::TradeRecord;
use quantlab_core::metrics::MetricSet;

use crate::runner::BacktestResult;
use crate::search::Candidate;

// ─── Serialized shapes ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsManifest {
    pub run_id: String,
    pub strategy: String,
    pub universe: Vec<String>,
    pub metrics: MetricSet,
    /// Symbols that cleared the selection threshold, when a search ran.
    #[serde(default)]
    pub optimized_universe: Vec<String>,
}

/// Top-K presets as persisted in `presets.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetFile {
    pub strategy: String,
    pub metric: String,
    pub presets: Vec<Candidate>,
}

// ─── CSV rendering ──────────────────────────────────────────────────

/// Trade tape as CSV.
///
/// Columns: symbol, direction, entry_ts, entry_price, exit_ts, exit_price,
/// size, pnl, bars_held.
pub fn render_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "symbol",
        "direction",
        "entry_ts",
        "entry_price",
        "exit_ts",
        "exit_price",
        "size",
        "pnl",
        "bars_held",
    ])?;
    for t in trades {
        wtr.write_record([
            &t.symbol,
            &format!("{:?}", t.direction),
            &t.entry_ts.to_string(),
            &format!("{:.6}", t.entry_price),
            &t.exit_ts.to_string(),
            &format!("{:.6}", t.exit_price),
            &format!("{:.6}", t.size),
            &format!("{:.6}", t.pnl),
            &t.bars_held.to_string(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Equity curve as CSV with bar_index and equity columns.
pub fn render_equity_csv(equity: &[f64]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["bar_index", "equity"])?;
    for (i, eq) in equity.iter().enumerate() {
        wtr.write_record([&i.to_string(), &format!("{:.8}", eq)])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Write the artifact bundle for one run; returns the run directory.
pub fn save_run(
    result: &BacktestResult,
    strategy: &str,
    universe: &[String],
    presets: Option<&PresetFile>,
    optimized_universe: &[String],
    output_dir: &Path,
) -> Result<PathBuf> {
    let run_dir = output_dir.join(&result.run_id);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create run dir: {}", run_dir.display()))?;

    let manifest = MetricsManifest {
        run_id: result.run_id.clone(),
        strategy: strategy.to_string(),
        universe: universe.to_vec(),
        metrics: result.metrics.clone(),
        optimized_universe: optimized_universe.to_vec(),
    };
    let json = serde_json::to_string_pretty(&manifest)
        .context("failed to serialize metrics manifest")?;
    std::fs::write(run_dir.join("metrics.json"), json)?;

    std::fs::write(
        run_dir.join("equity.csv"),
        render_equity_csv(&result.portfolio_equity)?,
    )?;
    std::fs::write(run_dir.join("trades.csv"), render_trades_csv(&result.trades)?)?;

    if let Some(presets) = presets {
        let json =
            serde_json::to_string_pretty(presets).context("failed to serialize presets")?;
        std::fs::write(run_dir.join("presets.json"), json)?;
    }

    Ok(run_dir)
}

/// Load a previously written metrics manifest.
pub fn load_metrics(run_dir: &Path) -> Result<MetricsManifest> {
    let path = run_dir.join("metrics.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("bad manifest in {}", path.display()))
}

/// Load presets written by a prior search, usable to seed a new run.
pub fn load_presets(run_dir: &Path) -> Result<PresetFile> {
    let path = run_dir.join("presets.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("bad presets in {}", path.display()))
}
