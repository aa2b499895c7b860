//! Strategy configuration for the pairs loop.

use crate::domain::universe::TickerPair;
use chrono::{NaiveDate, NaiveTime};
use std::time::Duration;

pub const DEFAULT_TOLERANCE: f64 = 0.25;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3600);

pub fn default_trade_time() -> NaiveTime {
    NaiveTime::from_hms_opt(19, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// Everything the loop needs besides the account and fitted pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct PairsStrategy {
    pub pairs: Vec<TickerPair>,
    /// Local time of day at or after which the daily tick runs.
    pub trade_time: NaiveTime,
    /// Open threshold in residual standard deviations.
    pub tolerance: f64,
    pub poll_interval: Duration,
}

impl PairsStrategy {
    pub fn new(pairs: Vec<TickerPair>) -> Self {
        Self {
            pairs,
            trade_time: default_trade_time(),
            tolerance: DEFAULT_TOLERANCE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Inclusive date range of history used to fit pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}
