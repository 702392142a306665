//! QuantLab Core — domain types, simulation, strategies, data layer.
//!
//! This crate contains the heart of the research engine:
//! - Domain types (bars, intervals, price tables, signals, trades)
//! - Vectorized log-return simulation with sizing, stops, and costs
//! - Interval-aware performance metrics
//! - Strategy contract with single-symbol and portfolio shapes
//! - Statistical tests for pair research (ADF, cointegration, half-life)
//! - Renko reconstruction
//! - Data providers with an incremental Parquet cache

pub mod data;
pub mod domain;
pub mod metrics;
pub mod renko;
pub mod sim;
pub mod sizing;
pub mod stats;
pub mod strategy;
