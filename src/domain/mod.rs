//! Core domain types and logic.

pub mod error;
pub mod universe;
pub mod price_panel;
pub mod ols;
pub mod adf;
pub mod cointegration;
pub mod pair;
pub mod position;
pub mod strategy;
pub mod config_validation;
pub mod cancellation;
pub mod trader;
