//! Pair universe parsing.
//!
//! Parses pair lists such as `MCD/WEN, APA/COP` from configuration and
//! collects the distinct tickers that need price history.

use std::collections::HashSet;
use std::fmt;

/// Two tickers in the order the operator listed them. The selection search
/// may later reorder them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TickerPair {
    pub first: String,
    pub second: String,
}

impl TickerPair {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
        }
    }

    /// Same two tickers, in either order.
    pub fn matches(&self, a: &str, b: &str) -> bool {
        (self.first == a && self.second == b) || (self.first == b && self.second == a)
    }
}

impl fmt::Display for TickerPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.first, self.second)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in pair list")]
    EmptyToken,

    #[error("malformed pair '{0}', expected TICKER/TICKER")]
    MalformedPair(String),

    #[error("pair '{0}' uses the same ticker twice")]
    SameTicker(String),

    #[error("duplicate pair: {0}")]
    DuplicatePair(String),
}

/// Parse a single `A/B` token.
pub fn parse_pair(token: &str) -> Result<TickerPair, UniverseError> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return Err(UniverseError::EmptyToken);
    }
    let mut legs = trimmed.split('/');
    let (first, second) = match (legs.next(), legs.next(), legs.next()) {
        (Some(a), Some(b), None) if !a.trim().is_empty() && !b.trim().is_empty() => {
            (a.trim().to_uppercase(), b.trim().to_uppercase())
        }
        _ => return Err(UniverseError::MalformedPair(trimmed.to_string())),
    };
    if first == second {
        return Err(UniverseError::SameTicker(trimmed.to_string()));
    }
    Ok(TickerPair::new(first, second))
}

/// Parse a comma-separated pair list. A pair listed twice (in either order)
/// is rejected.
pub fn parse_pairs(input: &str) -> Result<Vec<TickerPair>, UniverseError> {
    let mut pairs: Vec<TickerPair> = Vec::new();

    for token in input.split(',') {
        let pair = parse_pair(token)?;
        if pairs.iter().any(|p| p.matches(&pair.first, &pair.second)) {
            return Err(UniverseError::DuplicatePair(pair.to_string()));
        }
        pairs.push(pair);
    }

    Ok(pairs)
}

/// Distinct tickers across all pairs, in first-seen order.
pub fn distinct_tickers(pairs: &[TickerPair]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tickers = Vec::new();
    for pair in pairs {
        for ticker in [&pair.first, &pair.second] {
            if seen.insert(ticker.clone()) {
                tickers.push(ticker.clone());
            }
        }
    }
    tickers
}
