//! Date-ordered closing-price panel and unified timeline.

use crate::domain::error::EastwoodError;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub struct PriceRow {
    pub date: NaiveDate,
    pub prices: HashMap<String, f64>,
}

impl PriceRow {
    pub fn get(&self, ticker: &str) -> Option<f64> {
        self.prices.get(ticker).copied()
    }
}

/// Closing prices for a fixed set of tickers, one row per date, ascending.
/// A row may lack some tickers; fitting code only ever sees complete rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PricePanel {
    tickers: Vec<String>,
    rows: Vec<PriceRow>,
}

impl PricePanel {
    /// Build a panel from per-ticker `(date, close)` series. The row set is the
    /// union of all dates across tickers.
    pub fn from_series(series: Vec<(String, Vec<(NaiveDate, f64)>)>) -> Self {
        let mut timeline: BTreeMap<NaiveDate, HashMap<String, f64>> = BTreeMap::new();
        let mut tickers = Vec::with_capacity(series.len());

        for (ticker, points) in series {
            for (date, price) in points {
                timeline
                    .entry(date)
                    .or_default()
                    .insert(ticker.clone(), price);
            }
            if !tickers.contains(&ticker) {
                tickers.push(ticker);
            }
        }

        let rows = timeline
            .into_iter()
            .map(|(date, prices)| PriceRow { date, prices })
            .collect();
        Self { tickers, rows }
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn rows(&self) -> &[PriceRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }

    pub fn has_ticker(&self, ticker: &str) -> bool {
        self.tickers.iter().any(|t| t == ticker)
    }

    /// Restrict to `tickers` and drop every row where any of them is missing
    /// or non-finite.
    pub fn complete_rows(&self, tickers: &[&str]) -> PricePanel {
        let rows = self
            .rows
            .iter()
            .filter_map(|row| {
                let mut prices = HashMap::with_capacity(tickers.len());
                for &ticker in tickers {
                    match row.get(ticker) {
                        Some(p) if p.is_finite() => {
                            prices.insert(ticker.to_string(), p);
                        }
                        _ => return None,
                    }
                }
                Some(PriceRow {
                    date: row.date,
                    prices,
                })
            })
            .collect();
        PricePanel {
            tickers: tickers.iter().map(|t| t.to_string()).collect(),
            rows,
        }
    }

    /// Values of one ticker across rows. `None` if any row lacks it.
    pub fn column(&self, ticker: &str) -> Option<Vec<f64>> {
        self.rows.iter().map(|row| row.get(ticker)).collect()
    }

    /// Equal-length, date-aligned series for two tickers with incomplete rows
    /// dropped.
    pub fn aligned_pair(&self, a: &str, b: &str) -> Result<(Vec<f64>, Vec<f64>), EastwoodError> {
        for ticker in [a, b] {
            if !self.has_ticker(ticker) {
                return Err(EastwoodError::unavailable(format!(
                    "no price history for {}",
                    ticker
                )));
            }
        }
        let complete = self.complete_rows(&[a, b]);
        if complete.is_empty() {
            return Err(EastwoodError::unavailable(format!(
                "no dates with prices for both {} and {}",
                a, b
            )));
        }
        let left = complete.column(a).unwrap_or_default();
        let right = complete.column(b).unwrap_or_default();
        Ok((left, right))
    }

    /// Natural log of every price. Non-positive prices cannot be logged.
    pub fn ln(&self) -> Result<PricePanel, EastwoodError> {
        let mut rows = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let mut prices = HashMap::with_capacity(row.prices.len());
            for (ticker, &price) in &row.prices {
                prices.insert(ticker.clone(), log_price(ticker, price)?);
            }
            rows.push(PriceRow {
                date: row.date,
                prices,
            });
        }
        Ok(PricePanel {
            tickers: self.tickers.clone(),
            rows,
        })
    }

    /// Split into rows strictly before `date` and rows on or after it.
    pub fn split_at(&self, date: NaiveDate) -> (PricePanel, PricePanel) {
        let idx = self.rows.partition_point(|r| r.date < date);
        let before = PricePanel {
            tickers: self.tickers.clone(),
            rows: self.rows[..idx].to_vec(),
        };
        let after = PricePanel {
            tickers: self.tickers.clone(),
            rows: self.rows[idx..].to_vec(),
        };
        (before, after)
    }

    /// Most recent observed price per ticker.
    pub fn latest_prices(&self) -> HashMap<String, f64> {
        let mut latest = HashMap::new();
        for row in &self.rows {
            for (ticker, &price) in &row.prices {
                if price.is_finite() {
                    latest.insert(ticker.clone(), price);
                }
            }
        }
        latest
    }
}

/// Natural log of a price, rejecting values the log is undefined for.
pub fn log_price(ticker: &str, price: f64) -> Result<f64, EastwoodError> {
    if price <= 0.0 || !price.is_finite() {
        return Err(EastwoodError::InvalidPrice {
            ticker: ticker.to_string(),
            price,
        });
    }
    Ok(price.ln())
}
