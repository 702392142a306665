//! Portfolio aggregation — equal-weight combination of per-symbol runs.
//!
//! Per-symbol simulations produce log returns. Combining them equal-weight
//! must happen in simple-return space (portfolio return is the mean of leg
//! simple returns), then convert back: exp, mean, ln1p. Legs that start
//! later than others are treated as flat (zero return) before inception, so
//! series are aligned on their final bar and padded at the head.

use quantlab_core::metrics::MetricSet;

/// Equal-weight combination of per-leg log-return series.
///
/// Series may differ in length; shorter ones are head-padded with zeros.
/// Returns an empty vec when no legs are given.
pub fn aggregate_equal_weight(legs: &[Vec<f64>]) -> Vec<f64> {
    if legs.is_empty() {
        return Vec::new();
    }
    let max_len = legs.iter().map(|l| l.len()).max().unwrap_or(0);
    let mut out = Vec::with_capacity(max_len);
    let n = legs.len() as f64;
    for i in 0..max_len {
        let mut sum_simple = 0.0;
        for leg in legs {
            let pad = max_len - leg.len();
            let r = if i < pad { 0.0 } else { leg[i - pad] };
            sum_simple += r.exp() - 1.0;
        }
        out.push((sum_simple / n).ln_1p());
    }
    out
}

/// Symbols whose chosen metric clears `threshold`, in score order
/// (best first, symbol name as tie-break).
pub fn select_universe<'a>(
    per_symbol: impl Iterator<Item = (&'a str, &'a MetricSet)>,
    metric: &str,
    threshold: f64,
) -> Vec<String> {
    let mut keep: Vec<(String, f64)> = per_symbol
        .filter_map(|(sym, m)| {
            let score = m.by_name(metric)?;
            (score >= threshold).then(|| (sym.to_string(), score))
        })
        .collect();
    keep.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    keep.into_iter().map(|(sym, _)| sym).collect()
}
