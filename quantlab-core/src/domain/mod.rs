//! Domain types: bars, tables, signals, trades.

pub mod bar;
pub mod table;
pub mod trade;

pub use bar::{Bar, BarInterval};
pub use table::{JointTable, PriceTable, SignalSeries, TableError};
pub use trade::{TradeDirection, TradeRecord};
