//! Price history port trait.

use crate::domain::error::EastwoodError;
use crate::domain::price_panel::PricePanel;
use chrono::NaiveDate;

/// Source of daily closing prices.
pub trait PriceHistoryPort {
    /// Closing prices for `tickers` over `[start, end]` inclusive, on the
    /// union of their dates. Fails with `DataUnavailable` when a ticker has
    /// no history at all.
    fn fetch_closes(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PricePanel, EastwoodError>;

    fn list_tickers(&self) -> Result<Vec<String>, EastwoodError>;

    /// First date, last date and row count for one ticker, if it has any data.
    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, EastwoodError>;
}
