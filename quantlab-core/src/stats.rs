//! Statistical tests for pair research.
//!
//! Implements the tests needed by the pair-spread workflow without an
//! external stats crate:
//!
//! - Augmented Dickey-Fuller unit-root test with MacKinnon (1994)
//!   approximate p-values for the constant-only case
//! - Engle-Granger two-step cointegration test (OLS hedge fit, then ADF
//!   on the residual spread)
//! - Ornstein-Uhlenbeck half-life of mean reversion
//! - Lagged cross-correlation scan
//!
//! All regressions are small (a handful of coefficients) so the OLS solver
//! uses plain normal equations with Gaussian elimination.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("series too short for {test}: {len} observations, need at least {min}")]
    TooShort {
        test: &'static str,
        len: usize,
        min: usize,
    },
    #[error("series lengths differ: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },
    #[error("regression matrix is singular")]
    SingularMatrix,
}

/// Result of an augmented Dickey-Fuller test.
#[derive(Debug, Clone, PartialEq)]
pub struct AdfResult {
    /// The tau statistic on the lagged-level coefficient.
    pub statistic: f64,
    /// MacKinnon approximate p-value.
    pub p_value: f64,
    /// Number of lagged difference terms included.
    pub lags: usize,
    /// Effective observations after differencing and lagging.
    pub n_obs: usize,
}

/// Result of an Engle-Granger cointegration test between two series.
#[derive(Debug, Clone, PartialEq)]
pub struct CointResult {
    /// OLS hedge ratio of y on x.
    pub hedge_ratio: f64,
    /// OLS intercept.
    pub intercept: f64,
    /// ADF test on the residual spread.
    pub adf: AdfResult,
    /// Half-life of the residual spread in bars, if mean reverting.
    pub half_life: Option<f64>,
}

// ─── ADF test ───────────────────────────────────────────────────────

/// Augmented Dickey-Fuller test with a constant term.
///
/// Regresses dy_t on y_{t-1}, a constant, and `lags` lagged differences.
/// The null hypothesis is a unit root; small p-values indicate
/// stationarity.
pub fn adf_test(series: &[f64], lags: usize) -> Result<AdfResult, StatsError> {
    let min = lags + 12;
    if series.len() < min {
        return Err(StatsError::TooShort {
            test: "adf",
            len: series.len(),
            min,
        });
    }

    let diffs: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();

    // Rows start so that all lagged difference terms exist.
    let start = lags;
    let n_obs = diffs.len() - start;
    let n_coef = 2 + lags;

    let mut xs: Vec<Vec<f64>> = Vec::with_capacity(n_obs);
    let mut ys: Vec<f64> = Vec::with_capacity(n_obs);
    for t in start..diffs.len() {
        let mut row = Vec::with_capacity(n_coef);
        row.push(series[t]); // y_{t-1} relative to diff index t
        row.push(1.0);
        for l in 1..=lags {
            row.push(diffs[t - l]);
        }
        xs.push(row);
        ys.push(diffs[t]);
    }

    let fit = ols(&xs, &ys)?;
    let gamma = fit.coef[0];
    let se = fit.std_err[0];
    if se < 1e-15 {
        return Err(StatsError::SingularMatrix);
    }
    let tau = gamma / se;

    Ok(AdfResult {
        statistic: tau,
        p_value: mackinnon_p(tau),
        lags,
        n_obs,
    })
}

/// MacKinnon (1994) approximate asymptotic p-value for the constant-only
/// ADF tau statistic. Maps tau to a normal quantile via the published
/// polynomial fits, then evaluates the normal CDF.
fn mackinnon_p(tau: f64) -> f64 {
    const TAU_MAX: f64 = 2.74;
    const TAU_MIN: f64 = -18.83;
    const TAU_STAR: f64 = -1.61;
    // Small-p and large-p polynomial coefficients, ascending order.
    const SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
    const LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

    if tau >= TAU_MAX {
        return 1.0;
    }
    if tau <= TAU_MIN {
        return 0.0;
    }
    let z = if tau <= TAU_STAR {
        polyval(&SMALL_P, tau)
    } else {
        polyval(&LARGE_P, tau)
    };
    norm_cdf(z)
}

fn polyval(coefs: &[f64], x: f64) -> f64 {
    let mut acc = 0.0;
    let mut pow = 1.0;
    for c in coefs {
        acc += c * pow;
        pow *= x;
    }
    acc
}

// ─── Cointegration ──────────────────────────────────────────────────

/// Engle-Granger two-step cointegration test of `y` against `x`.
///
/// Step one fits y = a + b·x by OLS; step two runs an ADF test on the
/// residual spread. The half-life of the residual is included when the
/// spread shows mean reversion.
pub fn coint_test(y: &[f64], x: &[f64], adf_lags: usize) -> Result<CointResult, StatsError> {
    if y.len() != x.len() {
        return Err(StatsError::LengthMismatch {
            left: y.len(),
            right: x.len(),
        });
    }
    let min = adf_lags + 14;
    if y.len() < min {
        return Err(StatsError::TooShort {
            test: "coint",
            len: y.len(),
            min,
        });
    }

    let xs: Vec<Vec<f64>> = x.iter().map(|&v| vec![v, 1.0]).collect();
    let fit = ols(&xs, y)?;
    let hedge_ratio = fit.coef[0];
    let intercept = fit.coef[1];

    let spread: Vec<f64> = y
        .iter()
        .zip(x)
        .map(|(&yv, &xv)| yv - hedge_ratio * xv - intercept)
        .collect();

    let adf = adf_test(&spread, adf_lags)?;
    let half_life = half_life(&spread).ok();

    Ok(CointResult {
        hedge_ratio,
        intercept,
        adf,
        half_life,
    })
}

/// Half-life of mean reversion in bars, from the OU discretization:
/// regress d(spread) on lagged spread, half-life = -ln(2) / beta.
///
/// Errors if the series is too short; a non-negative beta (no reversion)
/// also comes back as an error so callers can treat it as "not a pair".
pub fn half_life(spread: &[f64]) -> Result<f64, StatsError> {
    if spread.len() < 10 {
        return Err(StatsError::TooShort {
            test: "half_life",
            len: spread.len(),
            min: 10,
        });
    }
    let xs: Vec<Vec<f64>> = spread[..spread.len() - 1]
        .iter()
        .map(|&v| vec![v, 1.0])
        .collect();
    let ys: Vec<f64> = spread.windows(2).map(|w| w[1] - w[0]).collect();
    let fit = ols(&xs, &ys)?;
    let beta = fit.coef[0];
    if beta >= 0.0 {
        return Err(StatsError::SingularMatrix);
    }
    Ok(-(2.0_f64.ln()) / beta)
}

/// Pearson correlation between x shifted back by `lag` bars and y.
///
/// `lag` of 2 correlates x[t-2] with y[t]. Returns 0.0 when the overlap is
/// too short or either side is constant.
pub fn lagged_correlation(x: &[f64], y: &[f64], lag: usize) -> f64 {
    if x.len() != y.len() || x.len() <= lag + 2 {
        return 0.0;
    }
    let xs = &x[..x.len() - lag];
    let ys = &y[lag..];
    pearson(xs, ys)
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (&a, &b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        vx += (a - mx).powi(2);
        vy += (b - my).powi(2);
    }
    if vx < 1e-15 || vy < 1e-15 {
        return 0.0;
    }
    cov / (vx.sqrt() * vy.sqrt())
}

// ─── OLS ────────────────────────────────────────────────────────────

struct OlsFit {
    coef: Vec<f64>,
    std_err: Vec<f64>,
}

/// Ordinary least squares via normal equations. Rows of `xs` are
/// observations, each with the same number of regressors.
fn ols(xs: &[Vec<f64>], ys: &[f64]) -> Result<OlsFit, StatsError> {
    let n = xs.len();
    let k = xs[0].len();
    if n <= k {
        return Err(StatsError::TooShort {
            test: "ols",
            len: n,
            min: k + 1,
        });
    }

    // X'X and X'y
    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for (row, &y) in xs.iter().zip(ys) {
        for i in 0..k {
            xty[i] += row[i] * y;
            for j in 0..k {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }

    let inv = invert(&xtx)?;
    let coef: Vec<f64> = (0..k)
        .map(|i| (0..k).map(|j| inv[i][j] * xty[j]).sum())
        .collect();

    // Residual variance and coefficient standard errors.
    let mut sse = 0.0;
    for (row, &y) in xs.iter().zip(ys) {
        let fitted: f64 = row.iter().zip(&coef).map(|(x, c)| x * c).sum();
        sse += (y - fitted).powi(2);
    }
    let sigma2 = sse / (n - k) as f64;
    let std_err: Vec<f64> = (0..k).map(|i| (sigma2 * inv[i][i]).max(0.0).sqrt()).collect();

    Ok(OlsFit { coef, std_err })
}

/// Gauss-Jordan inversion with partial pivoting.
fn invert(m: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, StatsError> {
    let k = m.len();
    let mut aug: Vec<Vec<f64>> = m
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut r = row.clone();
            r.extend((0..k).map(|j| if i == j { 1.0 } else { 0.0 }));
            r
        })
        .collect();

    for col in 0..k {
        let pivot = (col..k)
            .max_by(|&a, &b| {
                aug[a][col]
                    .abs()
                    .partial_cmp(&aug[b][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .ok_or(StatsError::SingularMatrix)?;
        if aug[pivot][col].abs() < 1e-12 {
            return Err(StatsError::SingularMatrix);
        }
        aug.swap(col, pivot);
        let p = aug[col][col];
        for v in aug[col].iter_mut() {
            *v /= p;
        }
        for row in 0..k {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..2 * k {
                aug[row][j] -= factor * aug[col][j];
            }
        }
    }

    Ok(aug.into_iter().map(|row| row[k..].to_vec()).collect())
}

// ─── Normal CDF ─────────────────────────────────────────────────────

/// Standard normal CDF via the Abramowitz-Stegun erfc approximation,
/// accurate to ~1.5e-7 which is plenty for approximate p-values.
fn norm_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / std::f64::consts::SQRT_2)
}

fn erfc(x: f64) -> f64 {
    let ax = x.abs();
    let t = 1.0 / (1.0 + 0.5 * ax);
    let poly = -ax * ax - 1.26551223
        + t * (1.00002368
            + t * (0.37409196
                + t * (0.09678418
                    + t * (-0.18628806
                        + t * (0.27886807
                            + t * (-1.13520398
                                + t * (1.48851587
                                    + t * (-0.82215223 + t * 0.17087277))))))));
    let v = t * poly.exp();
    if x >= 0.0 {
        v
    } else {
        2.0 - v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_walk(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut out = Vec::with_capacity(n);
        let mut level = 100.0;
        for _ in 0..n {
            level += rng.gen_range(-1.0..1.0);
            out.push(level);
        }
        out
    }

    fn mean_reverting(n: usize, seed: u64, speed: f64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut out = Vec::with_capacity(n);
        let mut level = 0.0_f64;
        for _ in 0..n {
            level += -speed * level + rng.gen_range(-0.5..0.5);
            out.push(level);
        }
        out
    }

    #[test]
    fn norm_cdf_symmetry() {
        assert!((norm_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((norm_cdf(1.96) - 0.975).abs() < 1e-3);
        assert!((norm_cdf(-1.96) - 0.025).abs() < 1e-3);
    }

    #[test]
    fn adf_rejects_on_stationary_series() {
        let series = mean_reverting(500, 7, 0.3);
        let res = adf_test(&series, 1).unwrap();
        assert!(res.p_value < 0.05, "p = {}", res.p_value);
        assert!(res.statistic < -2.86);
    }

    #[test]
    fn adf_accepts_on_random_walk() {
        let series = random_walk(500, 11);
        let res = adf_test(&series, 1).unwrap();
        assert!(res.p_value > 0.05, "p = {}", res.p_value);
    }

    #[test]
    fn adf_too_short_errors() {
        let short = vec![1.0; 8];
        assert!(matches!(
            adf_test(&short, 1),
            Err(StatsError::TooShort { .. })
        ));
    }

    #[test]
    fn coint_detects_constructed_pair() {
        // y = 2x + 5 + stationary noise must cointegrate.
        let x = random_walk(600, 3);
        let noise = mean_reverting(600, 4, 0.4);
        let y: Vec<f64> = x
            .iter()
            .zip(&noise)
            .map(|(&xv, &nv)| 2.0 * xv + 5.0 + nv)
            .collect();
        let res = coint_test(&y, &x, 1).unwrap();
        assert!((res.hedge_ratio - 2.0).abs() < 0.1, "b = {}", res.hedge_ratio);
        assert!(res.adf.p_value < 0.05, "p = {}", res.adf.p_value);
        assert!(res.half_life.is_some());
    }

    #[test]
    fn coint_rejects_independent_walks() {
        let x = random_walk(600, 21);
        let y = random_walk(600, 99);
        let res = coint_test(&y, &x, 1).unwrap();
        assert!(res.adf.p_value > 0.01, "p = {}", res.adf.p_value);
    }

    #[test]
    fn half_life_matches_reversion_speed() {
        // level_{t+1} = (1 - speed) * level_t + noise, so beta = -speed and
        // the half-life is ln(2)/speed.
        let spread = mean_reverting(2000, 17, 0.2);
        let hl = half_life(&spread).unwrap();
        let expected = 2.0_f64.ln() / 0.2;
        assert!((hl - expected).abs() < expected * 0.5, "hl = {hl}");
    }

    #[test]
    fn half_life_errors_on_trending_series() {
        let trend: Vec<f64> = (0..100).map(|i| i as f64).collect();
        assert!(half_life(&trend).is_err());
    }

    #[test]
    fn lagged_correlation_finds_shift() {
        let x = mean_reverting(400, 5, 0.3);
        let lag = 3;
        let y: Vec<f64> = (0..x.len())
            .map(|i| if i >= lag { x[i - lag] } else { 0.0 })
            .collect();
        let c = lagged_correlation(&x, &y, lag);
        assert!(c > 0.95, "c = {c}");
        assert!(lagged_correlation(&x, &y, 0).abs() < c);
    }

    #[test]
    fn lagged_correlation_degenerate_is_zero() {
        let flat = vec![1.0; 50];
        let other: Vec<f64> = (0..50).map(|i| i as f64).collect();
        assert_eq!(lagged_correlation(&flat, &other, 2), 0.0);
    }

    #[test]
    fn ols_recovers_known_line() {
        let xs: Vec<Vec<f64>> = (0..50).map(|i| vec![i as f64, 1.0]).collect();
        let ys: Vec<f64> = (0..50).map(|i| 3.0 * i as f64 + 7.0).collect();
        let fit = ols(&xs, &ys).unwrap();
        assert!((fit.coef[0] - 3.0).abs() < 1e-9);
        assert!((fit.coef[1] - 7.0).abs() < 1e-9);
    }
}
