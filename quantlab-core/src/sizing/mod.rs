//! Position sizers — translate signals into target exposures.
//!
//! Sizers map a directional signal series to a per-bar exposure series
//! (fraction of equity, sign carries direction). They operate on the whole
//! series at once so the simulation stays vectorized, and they may only use
//! information up to the bar being sized.
//!
//! # Responsibilities
//! - Scale signals by a risk budget (fixed fraction, vol target, Kelly)
//! - Cap leverage and zero out bars where their estimate is undefined
//!
//! # Non-Responsibilities
//! - Sizers do NOT decide direction (that's the strategy's job)
//! - Sizers do NOT apply costs or stops (that's the simulator's job)

pub mod fixed;
pub mod kelly;
pub mod vol_target;

pub use fixed::FixedFractional;
pub use kelly::FractionalKelly;
pub use vol_target::InverseVolatility;

use serde::{Deserialize, Serialize};

use crate::domain::{PriceTable, SignalSeries};

/// Per-bar exposure computation.
pub trait PositionSizer: Send + Sync {
    /// Target exposure per bar, same length as the signal. Values are
    /// fractions of equity; the sign is the trade direction.
    fn exposures(&self, table: &PriceTable, signal: &SignalSeries) -> Vec<f64>;

    /// Sizer name for logging and artifacts.
    fn name(&self) -> &'static str;
}

/// Declarative sizer selection for configs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SizerConfig {
    Fixed {
        fraction: f64,
    },
    InverseVol {
        target_vol: f64,
        window: usize,
        #[serde(default = "default_cap")]
        cap: f64,
    },
    FractionalKelly {
        fraction: f64,
        #[serde(default = "default_min_periods")]
        min_periods: usize,
        #[serde(default = "default_cap")]
        cap: f64,
    },
}

fn default_cap() -> f64 {
    2.0
}

fn default_min_periods() -> usize {
    60
}

impl Default for SizerConfig {
    fn default() -> Self {
        Self::Fixed { fraction: 1.0 }
    }
}

impl SizerConfig {
    /// Build the sizer, with an annualization factor for vol targeting.
    pub fn build(&self, ann_factor: f64) -> Box<dyn PositionSizer> {
        match *self {
            Self::Fixed { fraction } => Box::new(FixedFractional::new(fraction)),
            Self::InverseVol {
                target_vol,
                window,
                cap,
            } => Box::new(InverseVolatility::new(target_vol, window, cap, ann_factor)),
            Self::FractionalKelly {
                fraction,
                min_periods,
                cap,
            } => Box::new(FractionalKelly::new(fraction, min_periods, cap)),
        }
    }
}
