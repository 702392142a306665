//! Look-ahead contamination tests for the simulation pipeline.
//!
//! Invariant: no quantity at bar t may depend on price data from bar t+1 or
//! later. Method: run on a truncated series (bars 0..100) and the full
//! series (bars 0..200) and assert the first 100 bars agree. Any difference
//! means future data leaked into the past.

use chrono::{Duration, NaiveDate};
use quantlab_core::domain::{Bar, PriceTable, SignalSeries};
use quantlab_core::sim::{simulate, SimConfig, StopLossConfig};
use quantlab_core::sizing::SizerConfig;
use quantlab_core::strategy::{registry, Params, Strategy};

/// Deterministic pseudo-random walk using a simple LCG.
fn make_test_bars(n: usize) -> Vec<Bar> {
    let base = NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let mut bars = Vec::with_capacity(n);
    let mut price = 100.0_f64;
    for i in 0..n {
        let seed = (i as u64).wrapping_mul(6364136223846793005).wrapping_add(1);
        let change = ((seed % 200) as f64 - 100.0) * 0.05;
        price = (price + change).max(10.0);
        let open = price - 0.5;
        let close = price + 0.3;
        bars.push(Bar {
            ts: base + Duration::days(i as i64),
            open,
            high: open.max(close) + 2.0,
            low: open.min(close) - 2.0,
            close,
            volume: 1000.0 + i as f64 * 100.0,
        });
    }
    bars
}

fn table(bars: Vec<Bar>) -> PriceTable {
    PriceTable::new("TEST", bars).unwrap()
}

fn assert_prefix_equal(label: &str, truncated: &[f64], full: &[f64], len: usize) {
    for i in 0..len {
        let t = truncated[i];
        let f = full[i];
        assert!(
            (t - f).abs() < 1e-10,
            "{label}: look-ahead contamination at bar {i}: truncated={t}, full={f}"
        );
    }
}

#[test]
fn strategy_signals_have_no_lookahead() {
    let bars = make_test_bars(200);
    let full = table(bars.clone());
    let truncated = table(bars[..100].to_vec());

    for id in ["ema_cross", "channel_breakout"] {
        let strat = registry::build(id).unwrap();
        let mut params = Params::new();
        params.insert("fast".into(), 10.0);
        params.insert("slow".into(), 30.0);
        params.insert("lookback".into(), 20.0);
        let sig_full = strat.signal(&full, &params).unwrap();
        let sig_trunc = strat.signal(&truncated, &params).unwrap();
        assert_prefix_equal(id, &sig_trunc.values, &sig_full.values, 100);
    }
}

#[test]
fn simulation_positions_have_no_lookahead() {
    let bars = make_test_bars(200);
    let full = table(bars.clone());
    let truncated = table(bars[..100].to_vec());

    let strat = registry::build("ema_cross").unwrap();
    let mut params = Params::new();
    params.insert("fast".into(), 5.0);
    params.insert("slow".into(), 20.0);

    for sizer in [
        SizerConfig::Fixed { fraction: 1.0 },
        SizerConfig::InverseVol {
            target_vol: 0.15,
            window: 10,
            cap: 2.0,
        },
        SizerConfig::FractionalKelly {
            fraction: 0.5,
            min_periods: 20,
            cap: 2.0,
        },
    ] {
        let config = SimConfig {
            sizer: sizer.clone(),
            stop_loss: Some(StopLossConfig::new(0.08)),
            ..SimConfig::default()
        };
        let res_full = simulate(&full, &strat.signal(&full, &params).unwrap(), &config).unwrap();
        let res_trunc =
            simulate(&truncated, &strat.signal(&truncated, &params).unwrap(), &config).unwrap();
        assert_prefix_equal(
            &format!("{sizer:?} positions"),
            &res_trunc.positions,
            &res_full.positions,
            100,
        );
        assert_prefix_equal(
            &format!("{sizer:?} net returns"),
            &res_trunc.net_log_returns,
            &res_full.net_log_returns,
            100,
        );
    }
}

#[test]
fn signal_at_last_bar_earns_nothing() {
    // A signal that only fires on the final bar can never affect equity.
    let bars = make_test_bars(50);
    let t = table(bars);
    let mut values = vec![0.0; 50];
    values[49] = 1.0;
    let res = simulate(&t, &SignalSeries::new(values), &SimConfig::default()).unwrap();
    assert!(res.equity.iter().all(|&e| (e - 1.0).abs() < 1e-12));
    assert!(res.trades.is_empty());
}
