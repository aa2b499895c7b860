//! Cointegrated pair selection and deviation scoring.
//!
//! Selection searches {raw, log} prices x {(a on b), (b on a)} and keeps the
//! configuration whose error-correction term is most significant. The ECM,
//! for one ordering, on ascending dates with d[t] = x[t] - x[t-1]:
//!
//!   d_dep[t+1] = b1 * d_dep[t] + b2 * d_indep[t] + b3 * resid[t] + e
//!
//! fitted over t = 1..n-2 with no intercept; the criterion is the p-value of b3.

use crate::domain::cointegration::{fit_relationship, LinearRelationship};
use crate::domain::error::EastwoodError;
use crate::domain::ols;
use crate::domain::price_panel::{log_price, PricePanel};
use crate::domain::strategy::HistoryWindow;
use crate::ports::price_history_port::PriceHistoryPort;
use std::collections::HashMap;
use std::fmt;

/// Residual standard deviations at or below this are treated as zero.
pub const MIN_RESIDUAL_STD: f64 = 1e-12;

/// Standardised distance of the dependent price from its fitted value, in
/// residual standard deviations. Positive: the dependent leg is rich.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct DeviationScore(f64);

impl DeviationScore {
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for DeviationScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CointegratedPair {
    dependent: String,
    independent: String,
    use_logs: bool,
    relationship: LinearRelationship,
    residual_std: f64,
    selection_pvalue: f64,
}

struct Candidate {
    dependent: String,
    independent: String,
    use_logs: bool,
    relationship: LinearRelationship,
    p_value: f64,
}

/// Order in which selection visits candidates: raw before log prices, and
/// (ticker1 on ticker2) before (ticker2 on ticker1).
pub fn search_order<'a>(ticker1: &'a str, ticker2: &'a str) -> [(bool, &'a str, &'a str); 4] {
    [
        (false, ticker1, ticker2),
        (false, ticker2, ticker1),
        (true, ticker1, ticker2),
        (true, ticker2, ticker1),
    ]
}

/// Index of the smallest p-value. A later candidate only replaces the current
/// best when strictly smaller, so ties go to the earliest.
pub fn best_index(p_values: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, p) in p_values.iter().enumerate() {
        if best.is_none_or(|b| *p < p_values[b]) {
            best = Some(i);
        }
    }
    best
}

impl CointegratedPair {
    pub fn new(
        dependent: impl Into<String>,
        independent: impl Into<String>,
        use_logs: bool,
        relationship: LinearRelationship,
        selection_pvalue: f64,
    ) -> Self {
        let residual_std = relationship.residual_std();
        Self {
            dependent: dependent.into(),
            independent: independent.into(),
            use_logs,
            relationship,
            residual_std,
            selection_pvalue,
        }
    }

    /// Run the selection search over the rows of `panel` where both tickers
    /// have prices.
    pub fn select(ticker1: &str, ticker2: &str, panel: &PricePanel) -> Result<Self, EastwoodError> {
        let (raw1, raw2) = panel.aligned_pair(ticker1, ticker2)?;
        let (log1, log2) = (log_series(ticker1, &raw1)?, log_series(ticker2, &raw2)?);

        let mut candidates: Vec<Candidate> = Vec::with_capacity(4);
        for (use_logs, dep, indep) in search_order(ticker1, ticker2) {
            let (levels1, levels2) = if use_logs { (&log1, &log2) } else { (&raw1, &raw2) };
            let (y, x) = if dep == ticker1 { (levels1, levels2) } else { (levels2, levels1) };

            let relationship = fit_relationship(y, x)?;
            let p_value = match ecm_p_value(y, x, relationship.residuals()) {
                Ok(p) if p.is_finite() => p,
                Ok(_) => {
                    log::debug!("{} on {} (logs: {}): ECM p-value undefined", dep, indep, use_logs);
                    continue;
                }
                Err(e) => {
                    log::debug!("{} on {} (logs: {}): {}", dep, indep, use_logs, e);
                    continue;
                }
            };
            log::debug!(
                "{} on {} (logs: {}): ECM p-value {:.6}",
                dep,
                indep,
                use_logs,
                p_value
            );
            candidates.push(Candidate {
                dependent: dep.to_string(),
                independent: indep.to_string(),
                use_logs,
                relationship,
                p_value,
            });
        }

        let p_values: Vec<f64> = candidates.iter().map(|c| c.p_value).collect();
        let best = best_index(&p_values).map(|i| candidates.swap_remove(i));
        let best = best.ok_or_else(|| {
            EastwoodError::insufficient(format!(
                "no error-correction model could be estimated for {}/{}",
                ticker1, ticker2
            ))
        })?;

        Ok(Self::new(
            best.dependent,
            best.independent,
            best.use_logs,
            best.relationship,
            best.p_value,
        ))
    }

    /// Fetch history for both tickers and run [`CointegratedPair::select`].
    pub fn from_source(
        ticker1: &str,
        ticker2: &str,
        source: &dyn PriceHistoryPort,
        window: &HistoryWindow,
    ) -> Result<Self, EastwoodError> {
        let tickers = [ticker1.to_string(), ticker2.to_string()];
        let panel = source.fetch_closes(&tickers, window.start, window.end)?;
        if panel.is_empty() {
            return Err(EastwoodError::unavailable(format!(
                "no price history for {}/{} between {} and {}",
                ticker1, ticker2, window.start, window.end
            )));
        }
        Self::select(ticker1, ticker2, &panel)
    }

    pub fn dependent(&self) -> &str {
        &self.dependent
    }

    pub fn independent(&self) -> &str {
        &self.independent
    }

    pub fn tickers(&self) -> (&str, &str) {
        (&self.dependent, &self.independent)
    }

    pub fn use_logs(&self) -> bool {
        self.use_logs
    }

    pub fn relationship(&self) -> &LinearRelationship {
        &self.relationship
    }

    pub fn residual_std(&self) -> f64 {
        self.residual_std
    }

    pub fn selection_pvalue(&self) -> f64 {
        self.selection_pvalue
    }

    /// Same two tickers, in either order.
    pub fn involves(&self, a: &str, b: &str) -> bool {
        (self.dependent == a && self.independent == b)
            || (self.dependent == b && self.independent == a)
    }

    /// Deviation of a live observation from the fitted relationship.
    pub fn score(&self, prices: &HashMap<String, f64>) -> Result<DeviationScore, EastwoodError> {
        let y = self.live_level(&self.dependent, prices)?;
        let x = self.live_level(&self.independent, prices)?;

        if !(self.residual_std > MIN_RESIDUAL_STD) {
            return Err(EastwoodError::DivisionByZeroResidual {
                dependent: self.dependent.clone(),
                independent: self.independent.clone(),
            });
        }
        Ok(DeviationScore(
            (y - self.relationship.predict(x)) / self.residual_std,
        ))
    }

    fn live_level(&self, ticker: &str, prices: &HashMap<String, f64>) -> Result<f64, EastwoodError> {
        let price = *prices
            .get(ticker)
            .ok_or_else(|| EastwoodError::MissingPrice {
                ticker: ticker.to_string(),
            })?;
        if self.use_logs {
            log_price(ticker, price)
        } else if price.is_finite() {
            Ok(price)
        } else {
            Err(EastwoodError::InvalidPrice {
                ticker: ticker.to_string(),
                price,
            })
        }
    }
}

impl fmt::Display for CointegratedPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CointegratedPair({}, {}, {})",
            self.dependent, self.independent, self.use_logs
        )
    }
}

fn log_series(ticker: &str, prices: &[f64]) -> Result<Vec<f64>, EastwoodError> {
    prices.iter().map(|&p| log_price(ticker, p)).collect()
}

/// p-value of the residual term in the error-correction regression.
pub fn ecm_p_value(dependent: &[f64], independent: &[f64], residuals: &[f64]) -> Result<f64, EastwoodError> {
    let n = dependent.len();
    if n < 3 || independent.len() != n || residuals.len() != n {
        return Err(EastwoodError::insufficient(format!(
            "{} aligned rows is too few for the error-correction model",
            n
        )));
    }
    let d_dep: Vec<f64> = dependent.windows(2).map(|w| w[1] - w[0]).collect();
    let d_indep: Vec<f64> = independent.windows(2).map(|w| w[1] - w[0]).collect();

    // d_*[i] is the change into t = i + 1; rows are t = 1..=n-2.
    let rows = n - 2;
    let lead = d_dep[1..].to_vec();
    let columns = vec![
        d_dep[..rows].to_vec(),
        d_indep[..rows].to_vec(),
        residuals[1..=rows].to_vec(),
    ];
    let fit = ols::fit(&lead, &columns)?;
    Ok(fit.p_values[2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn relationship(coefficient: f64, dep: &[f64], indep: &[f64]) -> LinearRelationship {
        let rel = fit_relationship(dep, indep).unwrap();
        assert_relative_eq!(rel.coefficient(), coefficient, epsilon = 1e-9);
        rel
    }

    fn prices(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(t, p)| (t.to_string(), *p)).collect()
    }

    #[test]
    fn search_visits_raw_before_logs() {
        assert_eq!(
            search_order("MCD", "WEN"),
            [
                (false, "MCD", "WEN"),
                (false, "WEN", "MCD"),
                (true, "MCD", "WEN"),
                (true, "WEN", "MCD"),
            ]
        );
    }

    #[test]
    fn equal_p_values_keep_earliest_candidate() {
        assert_eq!(best_index(&[0.03, 0.03, 0.03, 0.03]), Some(0));
        // raw (b on a) ties with both log candidates
        assert_eq!(best_index(&[0.2, 0.01, 0.01, 0.01]), Some(1));
        // log (a on b) ties with log (b on a)
        assert_eq!(best_index(&[0.2, 0.3, 0.05, 0.05]), Some(2));
        assert_eq!(best_index(&[0.2, 0.3, 0.05, 0.04]), Some(3));
        assert_eq!(best_index(&[]), None);
    }

    fn noisy_pair() -> CointegratedPair {
        let indep = [10.0, 11.0, 12.0, 13.0, 14.0, 15.0];
        let dep = [20.5, 21.5, 24.5, 25.5, 28.5, 29.5];
        let rel = fit_relationship(&dep, &indep).unwrap();
        CointegratedPair::new("A", "B", false, rel, 0.01)
    }

    #[test]
    fn on_relationship_scores_zero() {
        let pair = noisy_pair();
        let coef = pair.relationship().coefficient();
        let score = pair
            .score(&prices(&[("A", coef * 40.0), ("B", 40.0)]))
            .unwrap();
        assert_relative_eq!(score.value(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn rich_dependent_scores_positive() {
        let pair = noisy_pair();
        let coef = pair.relationship().coefficient();
        let std = pair.residual_std();
        let score = pair
            .score(&prices(&[("A", coef * 40.0 + 2.0 * std), ("B", 40.0)]))
            .unwrap();
        assert_relative_eq!(score.value(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn log_pair_scores_in_log_space() {
        let indep = [10.0f64, 12.0, 11.0, 15.0, 14.0, 18.0];
        let dep = [30.0f64, 37.0, 32.0, 46.0, 41.0, 55.0];
        let log_indep: Vec<f64> = indep.iter().map(|p| p.ln()).collect();
        let log_dep: Vec<f64> = dep.iter().map(|p| p.ln()).collect();
        let rel = fit_relationship(&log_dep, &log_indep).unwrap();
        let coef = rel.coefficient();
        let pair = CointegratedPair::new("A", "B", true, rel, 0.02);

        let on_fit = (coef * 20.0f64.ln()).exp();
        let score = pair.score(&prices(&[("A", on_fit), ("B", 20.0)])).unwrap();
        assert_relative_eq!(score.value(), 0.0, epsilon = 1e-9);

        let err = pair.score(&prices(&[("A", -1.0), ("B", 20.0)])).unwrap_err();
        assert!(matches!(err, EastwoodError::InvalidPrice { ticker, .. } if ticker == "A"));
    }

    #[test]
    fn missing_price_is_reported() {
        let pair = noisy_pair();
        let err = pair.score(&prices(&[("A", 20.0)])).unwrap_err();
        assert!(matches!(err, EastwoodError::MissingPrice { ticker } if ticker == "B"));
        let err = pair.score(&prices(&[("B", 20.0)])).unwrap_err();
        assert!(matches!(err, EastwoodError::MissingPrice { ticker } if ticker == "A"));
    }

    #[test]
    fn zero_residual_std_is_reported() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [2.0, 4.0, 6.0, 8.0, 10.0];
        let pair = CointegratedPair::new("A", "B", false, relationship(0.5, &a, &b), 0.5);
        assert_relative_eq!(pair.relationship().predict(12.0), 6.0, epsilon = 1e-12);

        let err = pair.score(&prices(&[("A", 6.0), ("B", 12.0)])).unwrap_err();
        assert!(matches!(
            err,
            EastwoodError::DivisionByZeroResidual { dependent, independent }
                if dependent == "A" && independent == "B"
        ));
    }

    #[test]
    fn display_names_orientation_and_transform() {
        let pair = noisy_pair();
        assert_eq!(pair.to_string(), "CointegratedPair(A, B, false)");
        assert!(pair.involves("B", "A"));
        assert!(!pair.involves("A", "C"));
    }

    #[test]
    fn ecm_needs_three_rows() {
        let err = ecm_p_value(&[1.0, 2.0], &[1.0, 2.0], &[0.0, 0.0]).unwrap_err();
        assert!(matches!(err, EastwoodError::InsufficientData { .. }));
    }

    #[test]
    fn ecm_with_no_degrees_of_freedom_is_undefined() {
        // five rows leave three ECM rows for three regressors
        let dep = [1.0, 3.0, 2.0, 5.0, 4.0];
        let indep = [2.0, 1.0, 4.0, 3.0, 6.0];
        let resid = [0.3, -0.2, 0.5, -0.4, 0.1];
        match ecm_p_value(&dep, &indep, &resid) {
            Ok(p) => assert!(p.is_nan()),
            Err(e) => assert!(matches!(e, EastwoodError::InsufficientData { .. })),
        }
    }

    #[test]
    fn select_on_too_little_data_fails() {
        let day = |d| chrono::NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
        let panel = PricePanel::from_series(vec![
            (
                "A".to_string(),
                (1..=5).map(|d| (day(d), d as f64)).collect(),
            ),
            (
                "B".to_string(),
                (1..=5).map(|d| (day(d), 2.0 * d as f64)).collect(),
            ),
        ]);
        let err = CointegratedPair::select("A", "B", &panel).unwrap_err();
        assert!(matches!(err, EastwoodError::InsufficientData { .. }));
    }
}
