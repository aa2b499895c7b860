//! In-memory paper brokerage.
//!
//! Orders fill immediately and in full at the last quote set for the ticker.
//! Selling more than is held goes short. Buying power is the account value.

use crate::domain::error::EastwoodError;
use crate::ports::account_port::AccountPort;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
    Short,
    BuyToCover,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub side: OrderSide,
    pub ticker: String,
    pub quantity: i64,
    pub price: f64,
}

#[derive(Debug)]
struct PaperState {
    cash: f64,
    positions: BTreeMap<String, i64>,
    quotes: HashMap<String, f64>,
    market_open: bool,
    fills: Vec<Fill>,
}

#[derive(Debug)]
pub struct PaperAccount {
    state: RefCell<PaperState>,
}

impl PaperAccount {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            state: RefCell::new(PaperState {
                cash: initial_cash,
                positions: BTreeMap::new(),
                quotes: HashMap::new(),
                market_open: true,
                fills: Vec::new(),
            }),
        }
    }

    pub fn with_quotes(self, quotes: HashMap<String, f64>) -> Self {
        self.set_quotes(quotes);
        self
    }

    pub fn set_quote(&self, ticker: &str, price: f64) {
        self.state
            .borrow_mut()
            .quotes
            .insert(ticker.to_string(), price);
    }

    /// Merge `quotes` into the current quote book.
    pub fn set_quotes(&self, quotes: HashMap<String, f64>) {
        self.state.borrow_mut().quotes.extend(quotes);
    }

    pub fn set_market_open(&self, open: bool) {
        self.state.borrow_mut().market_open = open;
    }

    pub fn fills(&self) -> Vec<Fill> {
        self.state.borrow().fills.clone()
    }

    fn quote(&self, ticker: &str) -> Result<f64, EastwoodError> {
        match self.state.borrow().quotes.get(ticker) {
            Some(&price) if price.is_finite() && price > 0.0 => Ok(price),
            Some(&price) => Err(EastwoodError::Account {
                reason: format!("unusable quote for {}: {}", ticker, price),
            }),
            None => Err(EastwoodError::Account {
                reason: format!("no quote for {}", ticker),
            }),
        }
    }

    /// Fill `quantity` shares on `side` at the current quote.
    fn execute(&self, side: OrderSide, ticker: &str, quantity: i64) -> Result<(), EastwoodError> {
        if quantity <= 0 {
            return Err(EastwoodError::Account {
                reason: format!("order quantity for {} must be positive, got {}", ticker, quantity),
            });
        }
        let price = self.quote(ticker)?;
        let signed_qty = match side {
            OrderSide::Buy | OrderSide::BuyToCover => quantity,
            OrderSide::Sell | OrderSide::Short => -quantity,
        };

        let mut state = self.state.borrow_mut();
        state.cash -= signed_qty as f64 * price;
        let position = state.positions.entry(ticker.to_string()).or_insert(0);
        *position += signed_qty;
        if *position == 0 {
            state.positions.remove(ticker);
        }
        state.fills.push(Fill {
            side,
            ticker: ticker.to_string(),
            quantity,
            price,
        });
        log::debug!("paper fill: {:?} {} {} @ {:.4}", side, quantity, ticker, price);
        Ok(())
    }
}

impl AccountPort for PaperAccount {
    fn get_cash_balance(&self) -> Result<f64, EastwoodError> {
        Ok(self.state.borrow().cash)
    }

    fn get_buying_power(&self) -> Result<f64, EastwoodError> {
        self.get_account_value()
    }

    fn get_account_value(&self) -> Result<f64, EastwoodError> {
        let (cash, positions) = {
            let state = self.state.borrow();
            (state.cash, state.positions.clone())
        };
        let mut value = cash;
        for (ticker, quantity) in positions {
            value += quantity as f64 * self.quote(&ticker)?;
        }
        Ok(value)
    }

    fn get_positions(&self) -> Result<HashMap<String, i64>, EastwoodError> {
        Ok(self
            .state
            .borrow()
            .positions
            .iter()
            .map(|(t, q)| (t.clone(), *q))
            .collect())
    }

    fn get_latest_price(&self, ticker: &str) -> Result<f64, EastwoodError> {
        self.quote(ticker)
    }

    fn buy(&self, ticker: &str, quantity: i64) -> Result<(), EastwoodError> {
        self.execute(OrderSide::Buy, ticker, quantity)
    }

    fn sell(&self, ticker: &str, quantity: i64) -> Result<(), EastwoodError> {
        self.execute(OrderSide::Sell, ticker, quantity)
    }

    fn short(&self, ticker: &str, quantity: i64) -> Result<(), EastwoodError> {
        self.execute(OrderSide::Short, ticker, quantity)
    }

    fn buy_to_cover(&self, ticker: &str, quantity: i64) -> Result<(), EastwoodError> {
        self.execute(OrderSide::BuyToCover, ticker, quantity)
    }

    fn is_market_open(&self) -> Result<bool, EastwoodError> {
        Ok(self.state.borrow().market_open)
    }
}
