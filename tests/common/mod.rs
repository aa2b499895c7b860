#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use eastwood::domain::error::EastwoodError;
use eastwood::domain::price_panel::PricePanel;
use eastwood::ports::account_port::AccountPort;
use eastwood::ports::price_history_port::PriceHistoryPort;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

pub struct MockPriceHistory {
    pub data: HashMap<String, Vec<(NaiveDate, f64)>>,
    pub errors: HashMap<String, String>,
}

impl MockPriceHistory {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_closes(mut self, ticker: &str, closes: Vec<(NaiveDate, f64)>) -> Self {
        self.data.insert(ticker.to_string(), closes);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }
}

impl PriceHistoryPort for MockPriceHistory {
    fn fetch_closes(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PricePanel, EastwoodError> {
        let mut series = Vec::new();
        for ticker in tickers {
            if let Some(reason) = self.errors.get(ticker) {
                return Err(EastwoodError::DataUnavailable {
                    reason: reason.clone(),
                });
            }
            let closes: Vec<(NaiveDate, f64)> = self
                .data
                .get(ticker)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|(d, _)| *d >= start && *d <= end)
                .collect();
            if closes.is_empty() {
                return Err(EastwoodError::DataUnavailable {
                    reason: format!("no prices for {}", ticker),
                });
            }
            series.push((ticker.clone(), closes));
        }
        Ok(PricePanel::from_series(series))
    }

    fn list_tickers(&self) -> Result<Vec<String>, EastwoodError> {
        let mut tickers: Vec<String> = self.data.keys().cloned().collect();
        tickers.sort();
        Ok(tickers)
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, EastwoodError> {
        match self.data.get(ticker) {
            Some(closes) if !closes.is_empty() => {
                let min = closes.iter().map(|(d, _)| *d).min().unwrap();
                let max = closes.iter().map(|(d, _)| *d).max().unwrap();
                Ok(Some((min, max, closes.len())))
            }
            _ => Ok(None),
        }
    }
}

/// Account double that records every order and can be told to fail.
pub struct RecordingAccount {
    buying_power: Cell<f64>,
    positions: RefCell<HashMap<String, i64>>,
    quotes: RefCell<HashMap<String, f64>>,
    failing_quotes: RefCell<HashSet<String>>,
    market_open: Cell<bool>,
    fail_close_all: Cell<bool>,
    calls: RefCell<Vec<String>>,
}

impl RecordingAccount {
    pub fn new(buying_power: f64) -> Self {
        Self {
            buying_power: Cell::new(buying_power),
            positions: RefCell::new(HashMap::new()),
            quotes: RefCell::new(HashMap::new()),
            failing_quotes: RefCell::new(HashSet::new()),
            market_open: Cell::new(true),
            fail_close_all: Cell::new(false),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_quote(self, ticker: &str, price: f64) -> Self {
        self.set_quote(ticker, price);
        self
    }

    pub fn with_position(self, ticker: &str, quantity: i64) -> Self {
        self.positions
            .borrow_mut()
            .insert(ticker.to_string(), quantity);
        self
    }

    pub fn set_quote(&self, ticker: &str, price: f64) {
        self.quotes.borrow_mut().insert(ticker.to_string(), price);
    }

    pub fn fail_quote(&self, ticker: &str) {
        self.failing_quotes.borrow_mut().insert(ticker.to_string());
    }

    pub fn fail_close_all(&self) {
        self.fail_close_all.set(true);
    }

    pub fn set_market_open(&self, open: bool) {
        self.market_open.set(open);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, verb: &str, ticker: &str, quantity: i64, delta: i64) {
        self.calls
            .borrow_mut()
            .push(format!("{} {} {}", verb, ticker, quantity));
        *self
            .positions
            .borrow_mut()
            .entry(ticker.to_string())
            .or_insert(0) += delta;
    }
}

impl AccountPort for RecordingAccount {
    fn get_cash_balance(&self) -> Result<f64, EastwoodError> {
        Ok(self.buying_power.get())
    }

    fn get_buying_power(&self) -> Result<f64, EastwoodError> {
        Ok(self.buying_power.get())
    }

    fn get_account_value(&self) -> Result<f64, EastwoodError> {
        Ok(self.buying_power.get())
    }

    fn get_positions(&self) -> Result<HashMap<String, i64>, EastwoodError> {
        Ok(self
            .positions
            .borrow()
            .iter()
            .filter(|(_, q)| **q != 0)
            .map(|(t, q)| (t.clone(), *q))
            .collect())
    }

    fn get_latest_price(&self, ticker: &str) -> Result<f64, EastwoodError> {
        if self.failing_quotes.borrow().contains(ticker) {
            return Err(EastwoodError::Account {
                reason: format!("quote service down for {}", ticker),
            });
        }
        self.quotes
            .borrow()
            .get(ticker)
            .copied()
            .ok_or_else(|| EastwoodError::Account {
                reason: format!("no quote for {}", ticker),
            })
    }

    fn buy(&self, ticker: &str, quantity: i64) -> Result<(), EastwoodError> {
        self.record("buy", ticker, quantity, quantity);
        Ok(())
    }

    fn sell(&self, ticker: &str, quantity: i64) -> Result<(), EastwoodError> {
        self.record("sell", ticker, quantity, -quantity);
        Ok(())
    }

    fn short(&self, ticker: &str, quantity: i64) -> Result<(), EastwoodError> {
        self.record("short", ticker, quantity, -quantity);
        Ok(())
    }

    fn buy_to_cover(&self, ticker: &str, quantity: i64) -> Result<(), EastwoodError> {
        self.record("cover", ticker, quantity, quantity);
        Ok(())
    }

    fn is_market_open(&self) -> Result<bool, EastwoodError> {
        Ok(self.market_open.get())
    }

    fn close_all_positions(&self) -> Result<(), EastwoodError> {
        if self.fail_close_all.get() {
            return Err(EastwoodError::Account {
                reason: "broker rejected close-all".to_string(),
            });
        }
        let mut tickers: Vec<String> = self.get_positions()?.into_keys().collect();
        tickers.sort();
        for ticker in tickers {
            self.close_position(&ticker)?;
        }
        Ok(())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// `n` consecutive calendar days starting at `start`.
pub fn days_from(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    (0..n).map(|i| start + Duration::days(i as i64)).collect()
}

/// Deterministic uniform noise in [-1, 1).
pub fn lcg_noise(n: usize, mut seed: u64) -> Vec<f64> {
    (0..n)
        .map(|_| {
            seed = seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((seed >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
        })
        .collect()
}

/// `(dependent, independent)` where the independent is a random walk around
/// 50 and the dependent tracks `coefficient` times it with stationary error.
pub fn cointegrated_series(n: usize, coefficient: f64, seed: u64) -> (Vec<f64>, Vec<f64>) {
    let steps = lcg_noise(n, seed);
    let errors = lcg_noise(n, seed.wrapping_add(17));
    let mut level = 50.0;
    let mut dependent = Vec::with_capacity(n);
    let mut independent = Vec::with_capacity(n);
    for (step, error) in steps.iter().zip(&errors) {
        level += 0.5 * step;
        independent.push(level);
        dependent.push(coefficient * level + 0.5 * error);
    }
    (dependent, independent)
}

pub fn dated(dates: &[NaiveDate], values: &[f64]) -> Vec<(NaiveDate, f64)> {
    dates.iter().copied().zip(values.iter().copied()).collect()
}

/// A two-ticker panel of `n` days of cointegrated prices.
pub fn cointegrated_panel(dep: &str, indep: &str, n: usize, coefficient: f64, seed: u64) -> PricePanel {
    let dates = days_from(date(2023, 1, 2), n);
    let (a, b) = cointegrated_series(n, coefficient, seed);
    PricePanel::from_series(vec![
        (dep.to_string(), dated(&dates, &a)),
        (indep.to_string(), dated(&dates, &b)),
    ])
}

pub fn cointegrated_history(dep: &str, indep: &str, n: usize, coefficient: f64, seed: u64) -> MockPriceHistory {
    let dates = days_from(date(2023, 1, 2), n);
    let (a, b) = cointegrated_series(n, coefficient, seed);
    MockPriceHistory::new()
        .with_closes(dep, dated(&dates, &a))
        .with_closes(indep, dated(&dates, &b))
}

/// Write `<TICKER>.csv` in stooq layout.
pub fn write_csv(dir: &std::path::Path, ticker: &str, closes: &[(NaiveDate, f64)]) {
    let mut content = String::from("Date,Open,High,Low,Close,Volume\n");
    for (d, c) in closes {
        content.push_str(&format!("{},{c},{c},{c},{c},1000\n", d.format("%Y-%m-%d")));
    }
    std::fs::write(dir.join(format!("{}.csv", ticker)), content).unwrap();
}
