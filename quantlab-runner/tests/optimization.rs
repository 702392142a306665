//! Integration tests for the search engine: grid determinism, portfolio
//! dispatch, and the degenerate flat-tape run.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread::ThreadId;

use chrono::{Duration, NaiveDate};
use quantlab_core::domain::{Bar, BarInterval, JointTable, PriceTable, SignalSeries};
use quantlab_core::sim::CostConfig;
use quantlab_core::strategy::{ParamGrid, Params, Strategy, StrategyError, StrategyKind};
use quantlab_runner::config::{BacktestConfig, CandleMode};
use quantlab_runner::runner::{run_backtest_from_data, run_backtest_with_strategy};
use quantlab_runner::search::{search, search_with_strategy, SearchConfig, SearchMethod};

// ─── Fixtures ────────────────────────────────────────────────────────

fn daily_table(symbol: &str, closes: &[f64]) -> PriceTable {
    let start = NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let bars: Vec<Bar> = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            ts: start + Duration::days(i as i64),
            open: close,
            high: close * 1.005,
            low: close * 0.995,
            close,
            volume: 1_000_000.0,
        })
        .collect();
    PriceTable::new(symbol, bars).unwrap()
}

fn choppy_closes(n: usize, seed: u64) -> Vec<f64> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
    let mut close = 100.0;
    (0..n)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let step = ((state >> 33) as f64 / (1u64 << 31) as f64 - 1.0) * 0.01;
            close *= 1.0 + step;
            close
        })
        .collect()
}

fn config(strategy: &str, universe: &[&str], grid: Option<ParamGrid>) -> BacktestConfig {
    BacktestConfig {
        strategy: strategy.into(),
        params: Params::new(),
        universe: universe.iter().map(|s| s.to_string()).collect(),
        interval: BarInterval::Day1,
        start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        candle_mode: CandleMode::Standard,
        sizer: Default::default(),
        costs: CostConfig {
            slippage_rate: 0.0,
            commission: 0.0,
            ..CostConfig::default()
        },
        stop_loss: None,
        grid,
    }
}

fn ema_grid() -> ParamGrid {
    let mut grid = ParamGrid::new();
    grid.insert("fast".into(), vec![5.0, 10.0, 15.0]);
    grid.insert("slow".into(), vec![30.0, 50.0]);
    grid
}

fn search_config(method: SearchMethod) -> SearchConfig {
    SearchConfig {
        method,
        n_iter: 4,
        seed: 11,
        metric: "sharpe".into(),
        top_k: 3,
        universe_threshold: -100.0,
    }
}

// ─── Grid determinism ────────────────────────────────────────────────

#[test]
fn grid_of_six_yields_six_rows() {
    let joint = JointTable::from_tables([daily_table("AAA", &choppy_closes(300, 5))]);
    let cfg = config("ema_cross", &["AAA"], Some(ema_grid()));
    let out = search(&joint, &cfg, &search_config(SearchMethod::Grid)).unwrap();
    assert_eq!(out.ranked.len() + out.failures.len(), 6);
}

#[test]
fn same_seed_reruns_rank_identically() {
    let joint = JointTable::from_tables([daily_table("AAA", &choppy_closes(300, 5))]);
    let cfg = config("ema_cross", &["AAA"], Some(ema_grid()));
    for method in [SearchMethod::Grid, SearchMethod::Random] {
        let a = search(&joint, &cfg, &search_config(method)).unwrap();
        let b = search(&joint, &cfg, &search_config(method)).unwrap();
        let rank_a: Vec<(usize, String)> = a
            .ranked
            .iter()
            .map(|c| (c.index, format!("{:?}", c.params)))
            .collect();
        let rank_b: Vec<(usize, String)> = b
            .ranked
            .iter()
            .map(|c| (c.index, format!("{:?}", c.params)))
            .collect();
        assert_eq!(rank_a, rank_b);
    }
}

#[test]
fn tied_scores_keep_insertion_order() {
    // Flat tape: every candidate scores exactly 0.0.
    let joint = JointTable::from_tables([daily_table("AAA", &[100.0; 300])]);
    let cfg = config("ema_cross", &["AAA"], Some(ema_grid()));
    let out = search(&joint, &cfg, &search_config(SearchMethod::Grid)).unwrap();
    let order: Vec<usize> = out.ranked.iter().map(|c| c.index).collect();
    let mut sorted = order.clone();
    sorted.sort_unstable();
    assert_eq!(order, sorted);
}

// ─── Sequential evaluation ───────────────────────────────────────────

/// Records the thread each signal call runs on.
struct ThreadTrackingStrategy {
    threads: Mutex<Vec<ThreadId>>,
}

impl Strategy for ThreadTrackingStrategy {
    fn id(&self) -> &'static str {
        "thread_tracking"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Single
    }

    fn signal(&self, table: &PriceTable, _params: &Params) -> Result<SignalSeries, StrategyError> {
        self.threads.lock().unwrap().push(std::thread::current().id());
        Ok(SignalSeries::flat(1.0, table.len()))
    }

    fn default_grid(&self) -> ParamGrid {
        ParamGrid::new()
    }
}

#[test]
fn search_evaluates_every_candidate_on_the_calling_thread() {
    // A search nested inside a batch job must not fan out onto its own
    // thread pool; every evaluation runs on the thread that called it.
    let joint = JointTable::from_tables([daily_table("AAA", &choppy_closes(200, 7))]);
    let strategy = ThreadTrackingStrategy {
        threads: Mutex::new(Vec::new()),
    };
    let mut grid = ParamGrid::new();
    grid.insert("lookback".into(), vec![1.0, 2.0, 3.0, 4.0]);
    let cfg = config("thread_tracking", &["AAA"], Some(grid));

    let out =
        search_with_strategy(&joint, &strategy, &cfg, &search_config(SearchMethod::Grid)).unwrap();
    assert_eq!(out.ranked.len(), 4);

    let caller = std::thread::current().id();
    let seen = strategy.threads.lock().unwrap();
    // Four candidates plus the best-params rerun.
    assert_eq!(seen.len(), 5);
    assert!(seen.iter().all(|&id| id == caller));
}

// ─── Portfolio dispatch ──────────────────────────────────────────────

/// Counts how often each entry point runs.
struct CountingStrategy {
    portfolio_calls: AtomicUsize,
    single_calls: AtomicUsize,
}

impl CountingStrategy {
    fn new() -> Self {
        Self {
            portfolio_calls: AtomicUsize::new(0),
            single_calls: AtomicUsize::new(0),
        }
    }
}

impl Strategy for CountingStrategy {
    fn id(&self) -> &'static str {
        "counting"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Portfolio
    }

    fn signal(&self, _table: &PriceTable, _params: &Params) -> Result<SignalSeries, StrategyError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        Err(StrategyError::NotSingle("counting"))
    }

    fn portfolio_signals(
        &self,
        joint: &JointTable,
        _params: &Params,
    ) -> Result<BTreeMap<String, SignalSeries>, StrategyError> {
        self.portfolio_calls.fetch_add(1, Ordering::SeqCst);
        Ok(joint
            .iter()
            .map(|(sym, table)| (sym.clone(), SignalSeries::flat(1.0, table.len())))
            .collect())
    }

    fn default_grid(&self) -> ParamGrid {
        ParamGrid::new()
    }
}

#[test]
fn portfolio_strategy_sees_joint_table_once_per_combination() {
    let joint = JointTable::from_tables([
        daily_table("AAA", &choppy_closes(200, 1)),
        daily_table("BBB", &choppy_closes(200, 2)),
    ]);
    let strategy = CountingStrategy::new();
    let cfg = config("pair_spread", &["AAA", "BBB"], None);

    let combinations = 5;
    for _ in 0..combinations {
        run_backtest_with_strategy(&joint, &strategy, &cfg).unwrap();
    }

    assert_eq!(strategy.portfolio_calls.load(Ordering::SeqCst), combinations);
    assert_eq!(strategy.single_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn portfolio_legs_all_simulated() {
    let joint = JointTable::from_tables([
        daily_table("AAA", &choppy_closes(200, 1)),
        daily_table("BBB", &choppy_closes(200, 2)),
    ]);
    let strategy = CountingStrategy::new();
    let cfg = config("pair_spread", &["AAA", "BBB"], None);
    let result = run_backtest_with_strategy(&joint, &strategy, &cfg).unwrap();
    assert_eq!(result.per_symbol.len(), 2);
    assert!(result.per_symbol.contains_key("AAA"));
    assert!(result.per_symbol.contains_key("BBB"));
}

// ─── Degenerate flat tape ────────────────────────────────────────────

#[test]
fn ema_cross_on_flat_series_trades_nothing() {
    let joint = JointTable::from_tables([daily_table("AAA", &[100.0; 300])]);
    let mut cfg = config("ema_cross", &["AAA"], None);
    cfg.params.insert("fast".into(), 10.0);
    cfg.params.insert("slow".into(), 50.0);
    let result = run_backtest_from_data(&joint, &cfg).unwrap();
    assert_eq!(result.trades.len(), 0);
    assert_eq!(result.metrics.sharpe, 0.0);
    assert_eq!(result.metrics.total_return, 0.0);
}
