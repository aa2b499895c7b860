//! Cointegration fitting.
//!
//! A pair is cointegrated when the residual of regressing one price series on
//! the other (no intercept) is stationary. The ADF p-value of that residual is
//! the diagnostic strength measure: lower means stronger evidence.

use crate::domain::adf::{adf_test, AdfResult};
use crate::domain::error::EastwoodError;
use crate::domain::ols;
use crate::domain::price_panel::PricePanel;
use statrs::statistics::Statistics;

/// `dependent ~ coefficient * independent`, with the in-sample residuals.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRelationship {
    coefficient: f64,
    residuals: Vec<f64>,
}

impl LinearRelationship {
    pub fn coefficient(&self) -> f64 {
        self.coefficient
    }

    pub fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    pub fn predict(&self, independent: f64) -> f64 {
        self.coefficient * independent
    }

    /// Population standard deviation of the residuals.
    pub fn residual_std(&self) -> f64 {
        self.residuals.iter().population_std_dev()
    }
}

/// Regress `dependent` on `independent` with no intercept.
pub fn fit_relationship(
    dependent: &[f64],
    independent: &[f64],
) -> Result<LinearRelationship, EastwoodError> {
    if dependent.is_empty() || dependent.len() != independent.len() {
        return Err(EastwoodError::insufficient(format!(
            "series lengths {} and {} cannot be aligned",
            dependent.len(),
            independent.len()
        )));
    }
    let fit = ols::fit(dependent, &[independent.to_vec()])?;
    Ok(LinearRelationship {
        coefficient: fit.params[0],
        residuals: fit.residuals,
    })
}

/// Fit `series_a` on `series_b` and test the residual for a unit root.
/// Returns the relationship and the ADF p-value.
pub fn fit(series_a: &[f64], series_b: &[f64]) -> Result<(LinearRelationship, f64), EastwoodError> {
    let relationship = fit_relationship(series_a, series_b)?;
    let adf = adf_test(relationship.residuals())?;
    Ok((relationship, adf.p_value))
}

/// ADF test on the residual of `ticker1` regressed on `ticker2` over the rows
/// where both have prices, optionally on log prices.
pub fn cointegration_test(
    ticker1: &str,
    ticker2: &str,
    panel: &PricePanel,
    use_logs: bool,
) -> Result<AdfResult, EastwoodError> {
    let complete = panel.complete_rows(&[ticker1, ticker2]);
    let levels = if use_logs { complete.ln()? } else { complete };
    let (a, b) = levels.aligned_pair(ticker1, ticker2)?;
    let relationship = fit_relationship(&a, &b)?;
    adf_test(relationship.residuals())
}

/// Diagnostic: ADF p-value of [`cointegration_test`].
pub fn are_cointegrated(
    ticker1: &str,
    ticker2: &str,
    panel: &PricePanel,
    use_logs: bool,
) -> Result<f64, EastwoodError> {
    let p_value = cointegration_test(ticker1, ticker2, panel, use_logs)?.p_value;
    log::debug!(
        "{} & {}: ADF p-value {:.4} (logs: {})",
        ticker1,
        ticker2,
        p_value,
        use_logs
    );
    Ok(p_value)
}
