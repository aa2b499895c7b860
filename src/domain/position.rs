//! Pair position direction and sizing.

use std::collections::HashMap;
use std::fmt;

/// Which way a pair position leans relative to the fitted relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionDirection {
    /// Dependent rich: short the dependent, buy the independent.
    ShortSpread,
    /// Dependent cheap: buy the dependent, short the independent.
    LongSpread,
}

impl PositionDirection {
    /// Direction to open for a deviation beyond `tolerance`, if any.
    pub fn for_entry(deviation: f64, tolerance: f64) -> Option<Self> {
        if deviation > tolerance {
            Some(PositionDirection::ShortSpread)
        } else if deviation < -tolerance {
            Some(PositionDirection::LongSpread)
        } else {
            None
        }
    }

    /// Direction of an open pair, read from the sign of the dependent leg.
    pub fn from_dependent_quantity(quantity: i64) -> Self {
        if quantity < 0 {
            PositionDirection::ShortSpread
        } else {
            PositionDirection::LongSpread
        }
    }

    /// Whether an open position in this direction should close: once the
    /// deviation has crossed back through zero.
    pub fn should_close(self, deviation: f64) -> bool {
        match self {
            PositionDirection::ShortSpread => deviation <= 0.0,
            PositionDirection::LongSpread => deviation >= 0.0,
        }
    }

    /// `(long ticker, short ticker)` for this direction.
    pub fn legs<'a>(self, dependent: &'a str, independent: &'a str) -> (&'a str, &'a str) {
        match self {
            PositionDirection::ShortSpread => (independent, dependent),
            PositionDirection::LongSpread => (dependent, independent),
        }
    }
}

impl fmt::Display for PositionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionDirection::ShortSpread => write!(f, "short spread"),
            PositionDirection::LongSpread => write!(f, "long spread"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegQuantities {
    pub long_qty: i64,
    pub short_qty: i64,
}

/// Split buying power evenly over the pairs without a position, then half of
/// that portion to each leg, in whole shares. `None` when there is nothing
/// to allocate to or either leg rounds down to zero shares.
pub fn size_legs(
    buying_power: f64,
    pair_count: usize,
    open_count: usize,
    long_price: f64,
    short_price: f64,
) -> Option<LegQuantities> {
    let remaining = pair_count.checked_sub(open_count).filter(|n| *n > 0)?;
    if !(long_price > 0.0 && short_price > 0.0) || !buying_power.is_finite() {
        return None;
    }
    let portion = buying_power / remaining as f64;
    let long_qty = (portion / 2.0 / long_price).floor() as i64;
    let short_qty = (portion / 2.0 / short_price).floor() as i64;
    if long_qty <= 0 || short_qty <= 0 {
        return None;
    }
    Some(LegQuantities {
        long_qty,
        short_qty,
    })
}

/// A pair is open when either leg holds a non-zero position.
pub fn is_pair_open(positions: &HashMap<String, i64>, first: &str, second: &str) -> bool {
    [first, second]
        .iter()
        .any(|t| positions.get(*t).copied().unwrap_or(0) != 0)
}
