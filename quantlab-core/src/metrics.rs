//! Performance metrics — pure functions over net log returns and trades.
//!
//! Every metric is a pure function: return series and/or trade list in,
//! scalar out. Annualization always goes through the configured bar-interval
//! factor, never a hardcoded daily constant. Degenerate inputs (empty series,
//! zero variance, zero trades) produce 0.0 sentinels, never NaN or a panic.

use serde::{Deserialize, Serialize};

use crate::domain::TradeRecord;

/// Aggregate metric set for a single simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_vol: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub max_drawdown: f64,
    pub calmar: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub trade_count: usize,
}

impl MetricSet {
    /// Compute all metrics from per-bar net log returns and the trade log.
    pub fn compute(net_log_returns: &[f64], trades: &[TradeRecord], ann_factor: f64) -> Self {
        Self {
            total_return: total_return(net_log_returns),
            annualized_return: annualized_return(net_log_returns, ann_factor),
            annualized_vol: annualized_vol(net_log_returns, ann_factor),
            sharpe: sharpe_ratio(net_log_returns, ann_factor),
            sortino: sortino_ratio(net_log_returns, ann_factor),
            max_drawdown: max_drawdown(net_log_returns),
            calmar: calmar_ratio(net_log_returns, ann_factor),
            win_rate: win_rate(trades),
            profit_factor: profit_factor(trades),
            avg_win: avg_win(trades),
            avg_loss: avg_loss(trades),
            trade_count: trades.len(),
        }
    }

    /// Look up a metric by the name used in configs ("sharpe", "calmar"...).
    pub fn by_name(&self, name: &str) -> Option<f64> {
        match name {
            "sharpe" => Some(self.sharpe),
            "sortino" => Some(self.sortino),
            "calmar" => Some(self.calmar),
            "total_return" => Some(self.total_return),
            "annualized_return" => Some(self.annualized_return),
            "max_drawdown" => Some(self.max_drawdown),
            "profit_factor" => Some(self.profit_factor),
            "win_rate" => Some(self.win_rate),
            _ => None,
        }
    }
}

// ─── Equity helpers ─────────────────────────────────────────────────

/// Equity curve from log returns: starts at 1.0, one point per bar plus the
/// starting point.
pub fn equity_curve(log_returns: &[f64]) -> Vec<f64> {
    let mut curve = Vec::with_capacity(log_returns.len() + 1);
    let mut cum = 0.0;
    curve.push(1.0);
    for r in log_returns {
        cum += r;
        curve.push(cum.exp());
    }
    curve
}

// ─── Individual metric functions ────────────────────────────────────

/// Total simple return: exp(sum of log returns) - 1.
pub fn total_return(log_returns: &[f64]) -> f64 {
    if log_returns.is_empty() {
        return 0.0;
    }
    log_returns.iter().sum::<f64>().exp() - 1.0
}

/// Annualized simple return: exp(mean log return × factor) - 1.
pub fn annualized_return(log_returns: &[f64], ann_factor: f64) -> f64 {
    if log_returns.is_empty() {
        return 0.0;
    }
    (mean(log_returns) * ann_factor).exp() - 1.0
}

/// Annualized volatility: std of log returns × sqrt(factor).
pub fn annualized_vol(log_returns: &[f64], ann_factor: f64) -> f64 {
    std_dev(log_returns) * ann_factor.sqrt()
}

/// Sharpe ratio: annualized return / annualized vol, 0.0 on zero variance.
pub fn sharpe_ratio(log_returns: &[f64], ann_factor: f64) -> f64 {
    let vol = annualized_vol(log_returns, ann_factor);
    if vol < 1e-15 {
        return 0.0;
    }
    annualized_return(log_returns, ann_factor) / vol
}

/// Sortino ratio: annualized return / annualized downside deviation.
///
/// Downside deviation uses only negative simple returns; 0.0 when there is
/// no downside.
pub fn sortino_ratio(log_returns: &[f64], ann_factor: f64) -> f64 {
    if log_returns.is_empty() {
        return 0.0;
    }
    let downside_sq: Vec<f64> = log_returns
        .iter()
        .map(|r| r.exp() - 1.0)
        .filter(|&r| r < 0.0)
        .map(|r| r * r)
        .collect();
    if downside_sq.is_empty() {
        return 0.0;
    }
    let downside_dev =
        (downside_sq.iter().sum::<f64>() / downside_sq.len() as f64).sqrt() * ann_factor.sqrt();
    if downside_dev < 1e-15 {
        return 0.0;
    }
    annualized_return(log_returns, ann_factor) / downside_dev
}

/// Maximum drawdown of the implied equity curve, as a negative fraction.
pub fn max_drawdown(log_returns: &[f64]) -> f64 {
    let curve = equity_curve(log_returns);
    let mut peak = curve[0];
    let mut max_dd = 0.0_f64;
    for &eq in &curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            let dd = (eq - peak) / peak;
            if dd < max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// Calmar ratio: annualized return / |max drawdown|, 0.0 when flat.
pub fn calmar_ratio(log_returns: &[f64], ann_factor: f64) -> f64 {
    let dd = max_drawdown(log_returns);
    if dd >= 0.0 {
        return 0.0;
    }
    annualized_return(log_returns, ann_factor) / dd.abs()
}

/// Fraction of trades with positive pnl.
pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

/// Gross profits / gross losses, capped at 100.0 when losses are zero.
pub fn profit_factor(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let gross_profit: f64 = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
    let gross_loss: f64 = trades.iter().filter(|t| t.pnl < 0.0).map(|t| t.pnl.abs()).sum();
    if gross_loss < 1e-12 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

/// Mean pnl of winning trades, 0.0 when there are none.
pub fn avg_win(trades: &[TradeRecord]) -> f64 {
    let wins: Vec<f64> = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).collect();
    if wins.is_empty() {
        0.0
    } else {
        wins.iter().sum::<f64>() / wins.len() as f64
    }
}

/// Mean pnl of losing trades (negative), 0.0 when there are none.
pub fn avg_loss(trades: &[TradeRecord]) -> f64 {
    let losses: Vec<f64> = trades.iter().filter(|t| t.pnl < 0.0).map(|t| t.pnl).collect();
    if losses.is_empty() {
        0.0
    } else {
        losses.iter().sum::<f64>() / losses.len() as f64
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TradeDirection;
    use chrono::NaiveDate;

    fn make_trade(pnl: f64) -> TradeRecord {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(0, 0, 0).unwrap();
        TradeRecord {
            symbol: "SPY".into(),
            direction: TradeDirection::Long,
            entry_ts: ts,
            entry_price: 100.0,
            exit_ts: ts,
            exit_price: 100.0,
            size: 1.0,
            pnl,
            bars_held: 5,
        }
    }

    // ── Total / annualized return ──

    #[test]
    fn total_return_known() {
        let rets = vec![0.01, 0.02, -0.005];
        let expected = (0.025_f64).exp() - 1.0;
        assert!((total_return(&rets) - expected).abs() < 1e-12);
    }

    #[test]
    fn total_return_empty() {
        assert_eq!(total_return(&[]), 0.0);
    }

    #[test]
    fn annualized_return_daily_factor() {
        // Constant 0.1% daily log return over one year
        let rets = vec![0.001; 252];
        let expected = (0.001_f64 * 252.0).exp() - 1.0;
        assert!((annualized_return(&rets, 252.0) - expected).abs() < 1e-12);
    }

    // ── Sharpe ──

    #[test]
    fn sharpe_zero_variance_is_sentinel() {
        let rets = vec![0.001; 100];
        assert_eq!(sharpe_ratio(&rets, 252.0), 0.0);
    }

    #[test]
    fn sharpe_all_zero_is_sentinel() {
        let rets = vec![0.0; 300];
        assert_eq!(sharpe_ratio(&rets, 252.0), 0.0);
    }

    #[test]
    fn sharpe_positive_for_positive_drift() {
        let rets: Vec<f64> = (0..252).map(|i| 0.001 + 0.002 * ((i as f64 * 0.7).sin())).collect();
        assert!(sharpe_ratio(&rets, 252.0) > 0.0);
    }

    #[test]
    fn sharpe_scales_with_annualization_factor() {
        let rets: Vec<f64> = (0..500).map(|i| 0.0001 + 0.001 * ((i as f64 * 0.3).sin())).collect();
        let daily = sharpe_ratio(&rets, 252.0);
        let hourly = sharpe_ratio(&rets, 252.0 * 7.0);
        assert!(daily.is_finite() && hourly.is_finite());
        assert_ne!(daily, hourly);
    }

    // ── Sortino ──

    #[test]
    fn sortino_no_downside_is_sentinel() {
        let rets = vec![0.001, 0.002, 0.0005];
        assert_eq!(sortino_ratio(&rets, 252.0), 0.0);
    }

    #[test]
    fn sortino_with_downside_positive_drift() {
        let rets: Vec<f64> = (0..252)
            .map(|i| if i % 3 == 0 { -0.002 } else { 0.003 })
            .collect();
        assert!(sortino_ratio(&rets, 252.0) > 0.0);
    }

    // ── Drawdown / Calmar ──

    #[test]
    fn max_drawdown_known() {
        // +10% then -20%: trough at 0.88 of peak 1.1
        let rets = vec![(1.1_f64).ln(), (0.8_f64).ln()];
        let expected = (1.1 * 0.8 - 1.1) / 1.1;
        assert!((max_drawdown(&rets) - expected).abs() < 1e-10);
    }

    #[test]
    fn max_drawdown_monotonic_is_zero() {
        let rets = vec![0.01; 50];
        assert_eq!(max_drawdown(&rets), 0.0);
    }

    #[test]
    fn calmar_zero_without_drawdown() {
        let rets = vec![0.01; 50];
        assert_eq!(calmar_ratio(&rets, 252.0), 0.0);
    }

    // ── Trade metrics ──

    #[test]
    fn win_rate_mixed() {
        let trades = vec![make_trade(0.02), make_trade(-0.01), make_trade(0.03), make_trade(-0.02)];
        assert!((win_rate(&trades) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn profit_factor_mixed() {
        let trades = vec![make_trade(0.05), make_trade(-0.02), make_trade(0.03)];
        assert!((profit_factor(&trades) - 4.0).abs() < 1e-10);
    }

    #[test]
    fn profit_factor_all_winners_capped() {
        let trades = vec![make_trade(0.05), make_trade(0.03)];
        assert_eq!(profit_factor(&trades), 100.0);
    }

    #[test]
    fn avg_win_and_loss() {
        let trades = vec![make_trade(0.04), make_trade(0.02), make_trade(-0.01)];
        assert!((avg_win(&trades) - 0.03).abs() < 1e-12);
        assert!((avg_loss(&trades) - (-0.01)).abs() < 1e-12);
    }

    // ── Aggregate ──

    #[test]
    fn compute_degenerate_no_trades_all_sentinels() {
        let m = MetricSet::compute(&[], &[], 252.0);
        assert_eq!(m.sharpe, 0.0);
        assert_eq!(m.sortino, 0.0);
        assert_eq!(m.calmar, 0.0);
        assert_eq!(m.win_rate, 0.0);
        assert_eq!(m.trade_count, 0);
        assert!(m.total_return.is_finite());
    }

    #[test]
    fn compute_all_finite_with_activity() {
        let rets: Vec<f64> = (0..300).map(|i| 0.0005 * ((i as f64 * 0.5).sin())).collect();
        let trades = vec![make_trade(0.02), make_trade(-0.01)];
        let m = MetricSet::compute(&rets, &trades, 252.0);
        assert!(m.sharpe.is_finite());
        assert!(m.sortino.is_finite());
        assert!(m.calmar.is_finite());
        assert!(m.max_drawdown <= 0.0);
        assert_eq!(m.trade_count, 2);
    }

    #[test]
    fn by_name_lookup() {
        let m = MetricSet::compute(&[0.01, -0.005], &[], 252.0);
        assert_eq!(m.by_name("sharpe"), Some(m.sharpe));
        assert_eq!(m.by_name("bogus"), None);
    }

    #[test]
    fn equity_curve_starts_at_one() {
        let curve = equity_curve(&[0.01, -0.01]);
        assert_eq!(curve.len(), 3);
        assert_eq!(curve[0], 1.0);
    }
}
