//! Augmented Dickey-Fuller unit-root test.
//!
//! Regression with a constant:
//!   dy[t] = c + g * y[t-1] + sum(a_i * dy[t-i], i = 1..p) + e[t]
//! The statistic is the t-value of `g`. The lag order `p` is chosen by minimum
//! AIC over 0..=maxlag with every candidate fitted on the same sample, then the
//! chosen order is re-fitted on the longest sample it allows.
//! p-values follow MacKinnon (1994), critical values MacKinnon (2010).

use crate::domain::error::EastwoodError;
use crate::domain::ols;
use statrs::distribution::{ContinuousCDF, Normal};

// Constant-only regression, one series.
const TAU_MAX: f64 = 2.74;
const TAU_MIN: f64 = -18.83;
const TAU_STAR: f64 = -1.61;
const TAU_SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
const TAU_LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];
const CRIT_COEFFS: [(&str, [f64; 4]); 3] = [
    ("1%", [-3.43035, -6.5393, -16.786, -79.433]),
    ("5%", [-2.86154, -2.8903, -4.234, -40.040]),
    ("10%", [-2.56677, -1.5384, -2.809, 0.0]),
];

#[derive(Debug, Clone, PartialEq)]
pub struct AdfResult {
    pub statistic: f64,
    pub p_value: f64,
    pub used_lag: usize,
    pub nobs: usize,
    pub critical_values: Vec<(&'static str, f64)>,
}

/// Default maximum lag: ceil(12 * (n/100)^(1/4)), capped at n/2 - 2.
pub fn default_max_lag(n: usize) -> Result<usize, EastwoodError> {
    let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as i64;
    let cap = (n / 2) as i64 - 2;
    let maxlag = schwert.min(cap);
    if maxlag < 0 {
        return Err(EastwoodError::insufficient(format!(
            "{} observations is too short for the ADF regression",
            n
        )));
    }
    Ok(maxlag as usize)
}

/// Run the test on `series` with AIC lag selection.
pub fn adf_test(series: &[f64]) -> Result<AdfResult, EastwoodError> {
    let maxlag = default_max_lag(series.len())?;
    if series.iter().any(|v| !v.is_finite()) {
        return Err(EastwoodError::insufficient("ADF input contains inf or NaN"));
    }
    let diffs: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();

    let mut best: Option<(f64, usize)> = None;
    for lag in 0..=maxlag {
        let (y, columns) = design(series, &diffs, lag, maxlag);
        let fit = match ols::fit(&y, &columns) {
            Ok(fit) => fit,
            Err(_) => continue,
        };
        let aic = fit.aic();
        if !aic.is_finite() {
            continue;
        }
        if best.is_none_or(|(best_aic, _)| aic < best_aic) {
            best = Some((aic, lag));
        }
    }
    let (_, used_lag) =
        best.ok_or_else(|| EastwoodError::insufficient("no ADF lag order could be estimated"))?;

    let (y, columns) = design(series, &diffs, used_lag, used_lag);
    let fit = ols::fit(&y, &columns)?;
    if fit.df_resid() == 0 {
        return Err(EastwoodError::insufficient(
            "no residual degrees of freedom in ADF regression",
        ));
    }
    let statistic = fit.t_values[1];
    if !statistic.is_finite() {
        return Err(EastwoodError::insufficient(
            "ADF statistic is undefined for a series without variation",
        ));
    }

    Ok(AdfResult {
        statistic,
        p_value: mackinnon_p_value(statistic)?,
        used_lag,
        nobs: fit.nobs,
        critical_values: critical_values(fit.nobs),
    })
}

/// Regression rows for lag order `lag`, trimmed as if `trim` lags were used
/// so that candidates share a sample. Columns: constant, level, lagged diffs.
fn design(series: &[f64], diffs: &[f64], lag: usize, trim: usize) -> (Vec<f64>, Vec<Vec<f64>>) {
    let rows = trim..diffs.len();
    let y: Vec<f64> = rows.clone().map(|t| diffs[t]).collect();

    let mut columns = Vec::with_capacity(lag + 2);
    columns.push(vec![1.0; y.len()]);
    columns.push(rows.clone().map(|t| series[t]).collect());
    for i in 1..=lag {
        columns.push(rows.clone().map(|t| diffs[t - i]).collect());
    }
    (y, columns)
}

/// Approximate p-value of an ADF statistic for a constant-only regression.
pub fn mackinnon_p_value(statistic: f64) -> Result<f64, EastwoodError> {
    if statistic > TAU_MAX {
        return Ok(1.0);
    }
    if statistic < TAU_MIN {
        return Ok(0.0);
    }
    let z = if statistic <= TAU_STAR {
        polyval(&TAU_SMALL_P, statistic)
    } else {
        polyval(&TAU_LARGE_P, statistic)
    };
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| EastwoodError::insufficient(format!("normal distribution: {}", e)))?;
    Ok(normal.cdf(z))
}

/// Finite-sample critical values at 1%, 5% and 10%.
pub fn critical_values(nobs: usize) -> Vec<(&'static str, f64)> {
    let inv = 1.0 / nobs as f64;
    CRIT_COEFFS
        .iter()
        .map(|(label, coeffs)| (*label, polyval(coeffs, inv)))
        .collect()
}

// Coefficients in ascending power order.
fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}
