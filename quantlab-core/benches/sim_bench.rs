//! Criterion benchmarks for simulation hot paths.
//!
//! Benchmarks:
//! 1. Full simulation pipeline (signal to metrics)
//! 2. FIFO trade extraction
//! 3. Metric computation over a long return series

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use chrono::{Duration, NaiveDate};
use quantlab_core::domain::{Bar, PriceTable, SignalSeries};
use quantlab_core::metrics::MetricSet;
use quantlab_core::sim::{simulate, trades::extract_trades, SimConfig};

fn make_table(n: usize) -> PriceTable {
    let start = NaiveDate::from_ymd_opt(2020, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let bars: Vec<Bar> = (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            Bar {
                ts: start + Duration::minutes(i as i64),
                open: close - 0.3,
                high: close + 1.5,
                low: close - 1.5,
                close,
                volume: 1_000_000.0,
            }
        })
        .collect();
    PriceTable::new("BENCH", bars).expect("bars are ordered")
}

fn make_signal(n: usize) -> SignalSeries {
    SignalSeries::new(
        (0..n)
            .map(|i| if (i / 40) % 2 == 0 { 1.0 } else { -1.0 })
            .collect(),
    )
}

fn bench_simulate(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulate");
    for n in [1_000usize, 10_000, 100_000] {
        let table = make_table(n);
        let signal = make_signal(n);
        let config = SimConfig::default();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| simulate(black_box(&table), black_box(&signal), black_box(&config)))
        });
    }
    group.finish();
}

fn bench_trade_extraction(c: &mut Criterion) {
    let n = 50_000;
    let table = make_table(n);
    let positions: Vec<f64> = (0..n)
        .map(|i| if (i / 10) % 2 == 0 { 1.0 } else { 0.0 })
        .collect();
    c.bench_function("extract_trades_50k", |b| {
        b.iter(|| extract_trades(black_box("BENCH"), black_box(&positions), table.bars()))
    });
}

fn bench_metrics(c: &mut Criterion) {
    let rets: Vec<f64> = (0..100_000)
        .map(|i| 0.0001 * ((i as f64) * 0.37).sin())
        .collect();
    c.bench_function("metric_set_100k", |b| {
        b.iter(|| MetricSet::compute(black_box(&rets), &[], 252.0 * 390.0))
    });
}

criterion_group!(benches, bench_simulate, bench_trade_extraction, bench_metrics);
criterion_main!(benches);
