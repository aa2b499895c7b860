//! Ordinary least squares.
//!
//! Regresses `y` on the supplied columns exactly as given: no intercept is
//! added, callers include a column of ones when they want one.
//! beta = (X'X)^-1 X'y, se_i = sqrt(s^2 * (X'X)^-1_ii), s^2 = SSR / (n - k).

use crate::domain::error::EastwoodError;
use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::f64::consts::PI;

#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    pub params: Vec<f64>,
    pub t_values: Vec<f64>,
    /// Two-sided p-values. NaN when there are no residual degrees of freedom.
    pub p_values: Vec<f64>,
    pub residuals: Vec<f64>,
    pub ssr: f64,
    pub nobs: usize,
}

impl OlsFit {
    pub fn df_resid(&self) -> usize {
        self.nobs.saturating_sub(self.params.len())
    }

    /// Gaussian log-likelihood at the ML variance estimate.
    pub fn log_likelihood(&self) -> f64 {
        let n = self.nobs as f64;
        -n / 2.0 * ((2.0 * PI).ln() + (self.ssr / n).ln() + 1.0)
    }

    /// Akaike information criterion, counting every regressor.
    pub fn aic(&self) -> f64 {
        -2.0 * self.log_likelihood() + 2.0 * self.params.len() as f64
    }
}

/// Fit `y` on `columns` (each column one regressor, all the same length as `y`).
pub fn fit(y: &[f64], columns: &[Vec<f64>]) -> Result<OlsFit, EastwoodError> {
    let n = y.len();
    let k = columns.len();

    if n == 0 || k == 0 {
        return Err(EastwoodError::insufficient("empty regression"));
    }
    if columns.iter().any(|c| c.len() != n) {
        return Err(EastwoodError::insufficient(format!(
            "regressor length mismatch: expected {} rows",
            n
        )));
    }
    if n < k {
        return Err(EastwoodError::insufficient(format!(
            "{} observations for {} regressors",
            n, k
        )));
    }
    if y.iter().chain(columns.iter().flatten()).any(|v| !v.is_finite()) {
        return Err(EastwoodError::insufficient("regression input contains inf or NaN"));
    }

    let x = DMatrix::from_fn(n, k, |i, j| columns[j][i]);
    let y_vec = DVector::from_column_slice(y);

    let xtx = x.transpose() * &x;
    let xty = x.transpose() * &y_vec;

    let xtx_inv = xtx
        .cholesky()
        .ok_or_else(|| EastwoodError::insufficient("singular design matrix"))?
        .inverse();
    let beta = &xtx_inv * xty;

    let residuals = &y_vec - &x * &beta;
    let ssr: f64 = residuals.iter().map(|r| r * r).sum();

    let df_resid = n - k;
    let sigma2 = if df_resid > 0 {
        ssr / df_resid as f64
    } else {
        f64::NAN
    };

    let params: Vec<f64> = beta.iter().copied().collect();
    let std_errors: Vec<f64> = (0..k).map(|i| (sigma2 * xtx_inv[(i, i)]).sqrt()).collect();
    let t_values: Vec<f64> = params
        .iter()
        .zip(&std_errors)
        .map(|(b, se)| b / se)
        .collect();
    let p_values = two_sided_p_values(&t_values, df_resid)?;

    Ok(OlsFit {
        params,
        t_values,
        p_values,
        residuals: residuals.iter().copied().collect(),
        ssr,
        nobs: n,
    })
}

fn two_sided_p_values(t_values: &[f64], df_resid: usize) -> Result<Vec<f64>, EastwoodError> {
    if df_resid == 0 {
        return Ok(vec![f64::NAN; t_values.len()]);
    }
    let dist = StudentsT::new(0.0, 1.0, df_resid as f64)
        .map_err(|e| EastwoodError::insufficient(format!("t distribution: {}", e)))?;
    Ok(t_values
        .iter()
        .map(|t| {
            if t.is_nan() {
                f64::NAN
            } else {
                2.0 * dist.sf(t.abs())
            }
        })
        .collect())
}
