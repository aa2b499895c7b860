//! Configuration validation.
//!
//! Validates every config field before any price data is read.

use crate::domain::error::EastwoodError;
use crate::domain::universe::parse_pairs;
use crate::ports::config_port::ConfigPort;
use chrono::{NaiveDate, NaiveTime};

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), EastwoodError> {
    validate_data_config(config)?;
    validate_strategy_config(config)?;
    validate_account_config(config)?;
    Ok(())
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), EastwoodError> {
    validate_data_path(config)?;
    validate_dates(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), EastwoodError> {
    validate_pairs(config)?;
    validate_trade_time(config)?;
    validate_tolerance(config)?;
    validate_poll_interval(config)?;
    Ok(())
}

pub fn validate_account_config(config: &dyn ConfigPort) -> Result<(), EastwoodError> {
    let value = config.get_double("account", "initial_cash", 100_000.0);
    if !(value > 0.0) {
        return Err(EastwoodError::ConfigInvalid {
            section: "account".to_string(),
            key: "initial_cash".to_string(),
            reason: "initial_cash must be positive".to_string(),
        });
    }
    Ok(())
}

fn validate_data_path(config: &dyn ConfigPort) -> Result<(), EastwoodError> {
    match config.get_string("data", "path") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(EastwoodError::ConfigMissing {
            section: "data".to_string(),
            key: "path".to_string(),
        }),
    }
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), EastwoodError> {
    let start_str = config.get_string("data", "start_date");
    let start_date = match start_str.as_deref() {
        Some(s) => parse_date(s, "start_date")?,
        None => {
            return Err(EastwoodError::ConfigMissing {
                section: "data".to_string(),
                key: "start_date".to_string(),
            })
        }
    };

    if let Some(end_str) = config.get_string("data", "end_date") {
        let end_date = parse_date(&end_str, "end_date")?;
        if start_date >= end_date {
            return Err(EastwoodError::ConfigInvalid {
                section: "data".to_string(),
                key: "start_date".to_string(),
                reason: "start_date must be before end_date".to_string(),
            });
        }
    }
    Ok(())
}

/// Parse a `YYYY-MM-DD` value from the `[data]` section.
pub fn parse_date(value: &str, field: &str) -> Result<NaiveDate, EastwoodError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| EastwoodError::ConfigInvalid {
        section: "data".to_string(),
        key: field.to_string(),
        reason: format!("invalid {} format, expected YYYY-MM-DD", field),
    })
}

/// Parse an `HH:MM` (or `HH:MM:SS`) trade time.
pub fn parse_trade_time(value: &str) -> Result<NaiveTime, EastwoodError> {
    let trimmed = value.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| EastwoodError::ConfigInvalid {
            section: "strategy".to_string(),
            key: "trade_time".to_string(),
            reason: format!("invalid trade_time '{}', expected HH:MM", trimmed),
        })
}

fn validate_pairs(config: &dyn ConfigPort) -> Result<(), EastwoodError> {
    match config.get_string("strategy", "pairs") {
        Some(s) if !s.trim().is_empty() => {
            parse_pairs(&s)?;
            Ok(())
        }
        _ => Err(EastwoodError::ConfigMissing {
            section: "strategy".to_string(),
            key: "pairs".to_string(),
        }),
    }
}

fn validate_trade_time(config: &dyn ConfigPort) -> Result<(), EastwoodError> {
    if let Some(s) = config.get_string("strategy", "trade_time") {
        parse_trade_time(&s)?;
    }
    Ok(())
}

fn validate_tolerance(config: &dyn ConfigPort) -> Result<(), EastwoodError> {
    let value = config.get_double("strategy", "tolerance", 0.25);
    if !(value > 0.0) || !value.is_finite() {
        return Err(EastwoodError::ConfigInvalid {
            section: "strategy".to_string(),
            key: "tolerance".to_string(),
            reason: "tolerance must be positive".to_string(),
        });
    }
    Ok(())
}

fn validate_poll_interval(config: &dyn ConfigPort) -> Result<(), EastwoodError> {
    let value = config.get_int("strategy", "poll_interval_secs", 3600);
    if value < 1 {
        return Err(EastwoodError::ConfigInvalid {
            section: "strategy".to_string(),
            key: "poll_interval_secs".to_string(),
            reason: "poll_interval_secs must be at least 1".to_string(),
        });
    }
    Ok(())
}
