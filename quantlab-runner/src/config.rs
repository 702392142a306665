//! Serializable backtest configuration.
//!
//! A [`BacktestConfig`] captures everything needed to reproduce a run:
//! strategy and parameters, universe, date range, interval and candle mode,
//! sizing, costs, and stop settings. Configs load from TOML and validate
//! fail-fast, naming the offending field.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use quantlab_core::domain::BarInterval;
use quantlab_core::renko::BrickSize;
use quantlab_core::sim::{CostConfig, StopLossConfig};
use quantlab_core::sizing::SizerConfig;
use quantlab_core::strategy::{registry, Params};

/// Content-addressable run identifier.
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid field '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// How raw bars become simulation candles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandleMode {
    #[default]
    Standard,
    Renko {
        brick: BrickSize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Strategy id from the registry.
    pub strategy: String,
    /// Parameter assignment; empty means "use defaults during search".
    #[serde(default)]
    pub params: Params,
    /// Symbols to load. A portfolio strategy consumes them jointly.
    pub universe: Vec<String>,
    pub interval: BarInterval,
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default)]
    pub candle_mode: CandleMode,
    #[serde(default)]
    pub sizer: SizerConfig,
    #[serde(default)]
    pub costs: CostConfig,
    #[serde(default)]
    pub stop_loss: Option<StopLossConfig>,
    /// Optional explicit parameter grid; falls back to the strategy default.
    #[serde(default)]
    pub grid: Option<BTreeMap<String, Vec<f64>>>,
}

impl BacktestConfig {
    /// Load and validate a TOML config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Fail-fast validation. Each violation names the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if registry::build(&self.strategy).is_err() {
            return Err(ConfigError::Invalid {
                field: "strategy",
                reason: format!(
                    "unknown strategy '{}', known: {}",
                    self.strategy,
                    registry::known_ids().join(", ")
                ),
            });
        }
        if self.universe.is_empty() {
            return Err(ConfigError::Invalid {
                field: "universe",
                reason: "at least one symbol is required".into(),
            });
        }
        let mut sorted = self.universe.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != self.universe.len() {
            return Err(ConfigError::Invalid {
                field: "universe",
                reason: "duplicate symbols".into(),
            });
        }
        if self.start >= self.end {
            return Err(ConfigError::Invalid {
                field: "start",
                reason: format!("start {} is not before end {}", self.start, self.end),
            });
        }
        if self.costs.slippage_rate < 0.0 {
            return Err(ConfigError::Invalid {
                field: "costs.slippage_rate",
                reason: "must be non-negative".into(),
            });
        }
        if self.costs.commission < 0.0 {
            return Err(ConfigError::Invalid {
                field: "costs.commission",
                reason: "must be non-negative".into(),
            });
        }
        if self.costs.reference_equity <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "costs.reference_equity",
                reason: "must be positive".into(),
            });
        }
        if let Some(stop) = &self.stop_loss {
            if stop.threshold <= 0.0 {
                return Err(ConfigError::Invalid {
                    field: "stop_loss.threshold",
                    reason: "must be positive".into(),
                });
            }
        }
        match &self.sizer {
            SizerConfig::Fixed { fraction } => {
                if *fraction <= 0.0 {
                    return Err(ConfigError::Invalid {
                        field: "sizer.fraction",
                        reason: "must be positive".into(),
                    });
                }
            }
            SizerConfig::InverseVol {
                target_vol, window, ..
            } => {
                if *target_vol <= 0.0 {
                    return Err(ConfigError::Invalid {
                        field: "sizer.target_vol",
                        reason: "must be positive".into(),
                    });
                }
                if *window < 2 {
                    return Err(ConfigError::Invalid {
                        field: "sizer.window",
                        reason: "must be at least 2".into(),
                    });
                }
            }
            SizerConfig::FractionalKelly { fraction, .. } => {
                if *fraction <= 0.0 {
                    return Err(ConfigError::Invalid {
                        field: "sizer.fraction",
                        reason: "must be positive".into(),
                    });
                }
            }
        }
        if let Some(grid) = &self.grid {
            for (name, values) in grid {
                if values.is_empty() {
                    return Err(ConfigError::Invalid {
                        field: "grid",
                        reason: format!("parameter '{name}' has no candidate values"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Deterministic content hash: identical configs share a RunId.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_string(self).map_err(|e| ConfigError::Invalid {
            field: "config",
            reason: format!("serialization failed: {e}"),
        })?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    pub fn start_ts(&self) -> NaiveDateTime {
        self.start.and_hms_opt(0, 0, 0).unwrap_or_default()
    }

    pub fn end_ts(&self) -> NaiveDateTime {
        self.end.and_hms_opt(0, 0, 0).unwrap_or_default()
    }
}
