//! Domain error types.

use crate::domain::universe::UniverseError;

/// Top-level error type for eastwood.
#[derive(Debug, thiserror::Error)]
pub enum EastwoodError {
    #[error("price data unavailable: {reason}")]
    DataUnavailable { reason: String },

    #[error("insufficient data for fit: {reason}")]
    InsufficientData { reason: String },

    #[error("no live price supplied for {ticker}")]
    MissingPrice { ticker: String },

    #[error("invalid price for {ticker}: {price}")]
    InvalidPrice { ticker: String, price: f64 },

    #[error("residual standard deviation is zero for {dependent}/{independent}")]
    DivisionByZeroResidual {
        dependent: String,
        independent: String,
    },

    #[error("failed to close all positions: {reason}")]
    CloseAllFailed { reason: String },

    #[error("account error: {reason}")]
    Account { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Universe(#[from] UniverseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EastwoodError {
    pub(crate) fn insufficient(reason: impl Into<String>) -> Self {
        EastwoodError::InsufficientData {
            reason: reason.into(),
        }
    }

    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        EastwoodError::DataUnavailable {
            reason: reason.into(),
        }
    }
}

impl From<&EastwoodError> for std::process::ExitCode {
    fn from(err: &EastwoodError) -> Self {
        let code: u8 = match err {
            EastwoodError::Io(_) => 1,
            EastwoodError::ConfigParse { .. }
            | EastwoodError::ConfigMissing { .. }
            | EastwoodError::ConfigInvalid { .. } => 2,
            EastwoodError::Account { .. } | EastwoodError::CloseAllFailed { .. } => 3,
            EastwoodError::Universe(_) => 4,
            EastwoodError::DataUnavailable { .. }
            | EastwoodError::InsufficientData { .. }
            | EastwoodError::MissingPrice { .. }
            | EastwoodError::InvalidPrice { .. }
            | EastwoodError::DivisionByZeroResidual { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
