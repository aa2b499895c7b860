//! Brokerage account port trait.
//!
//! Quantities are whole shares. Positions are signed: negative is short.

use crate::domain::error::EastwoodError;
use std::collections::HashMap;

pub trait AccountPort {
    fn get_cash_balance(&self) -> Result<f64, EastwoodError>;
    fn get_buying_power(&self) -> Result<f64, EastwoodError>;
    fn get_account_value(&self) -> Result<f64, EastwoodError>;
    fn get_positions(&self) -> Result<HashMap<String, i64>, EastwoodError>;

    fn get_position(&self, ticker: &str) -> Result<i64, EastwoodError> {
        Ok(self.get_positions()?.get(ticker).copied().unwrap_or(0))
    }

    fn get_latest_price(&self, ticker: &str) -> Result<f64, EastwoodError>;

    fn buy(&self, ticker: &str, quantity: i64) -> Result<(), EastwoodError>;
    fn sell(&self, ticker: &str, quantity: i64) -> Result<(), EastwoodError>;

    /// Open or extend a short. Brokers that net positions treat this as a sell.
    fn short(&self, ticker: &str, quantity: i64) -> Result<(), EastwoodError> {
        self.sell(ticker, quantity)
    }

    fn buy_to_cover(&self, ticker: &str, quantity: i64) -> Result<(), EastwoodError> {
        self.buy(ticker, quantity)
    }

    fn is_market_open(&self) -> Result<bool, EastwoodError>;

    /// Flatten a single ticker.
    fn close_position(&self, ticker: &str) -> Result<(), EastwoodError> {
        let quantity = self.get_position(ticker)?;
        if quantity > 0 {
            self.sell(ticker, quantity)
        } else if quantity < 0 {
            self.buy_to_cover(ticker, -quantity)
        } else {
            Ok(())
        }
    }

    fn close_all_positions(&self) -> Result<(), EastwoodError> {
        let mut tickers: Vec<String> = self.get_positions()?.into_keys().collect();
        tickers.sort();
        for ticker in tickers {
            self.close_position(&ticker)?;
        }
        Ok(())
    }
}
