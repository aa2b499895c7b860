//! CSV file price history adapter.
//!
//! One file per ticker, `<TICKER>.csv` (or lower-case), with a header row.
//! The `Date` and `Close` columns are located by name, case-insensitively,
//! so stooq-style `Date,Open,High,Low,Close,Volume` exports load as-is.

use crate::domain::error::EastwoodError;
use crate::domain::price_panel::PricePanel;
use crate::ports::price_history_port::PriceHistoryPort;
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, ticker: &str) -> Option<PathBuf> {
        [ticker.to_string(), ticker.to_lowercase()]
            .into_iter()
            .map(|stem| self.base_path.join(format!("{}.csv", stem)))
            .find(|p| p.is_file())
    }

    /// Every `(date, close)` in the ticker's file, ascending by date.
    pub fn read_closes(&self, ticker: &str) -> Result<Vec<(NaiveDate, f64)>, EastwoodError> {
        let path = self.csv_path(ticker).ok_or_else(|| EastwoodError::DataUnavailable {
            reason: format!(
                "no CSV file for {} in {}",
                ticker,
                self.base_path.display()
            ),
        })?;
        let content = fs::read_to_string(&path).map_err(|e| EastwoodError::DataUnavailable {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr.headers().map_err(|e| EastwoodError::DataUnavailable {
            reason: format!("CSV header error in {}: {}", path.display(), e),
        })?;
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| EastwoodError::DataUnavailable {
                    reason: format!("missing {} column in {}", name, path.display()),
                })
        };
        let date_idx = column("date")?;
        let close_idx = column("close")?;

        let mut closes = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| EastwoodError::DataUnavailable {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?;

            let date_str = record.get(date_idx).unwrap_or_default().trim();
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| {
                EastwoodError::DataUnavailable {
                    reason: format!("invalid date '{}' for {}: {}", date_str, ticker, e),
                }
            })?;

            // Blank closes are holidays or gaps in the export.
            let close_str = record.get(close_idx).unwrap_or_default().trim();
            if close_str.is_empty() {
                continue;
            }
            let close: f64 = close_str.parse().map_err(|e| EastwoodError::DataUnavailable {
                reason: format!("invalid close '{}' for {} on {}: {}", close_str, ticker, date, e),
            })?;
            closes.push((date, close));
        }

        closes.sort_by_key(|(date, _)| *date);
        Ok(closes)
    }
}

impl PriceHistoryPort for CsvAdapter {
    fn fetch_closes(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PricePanel, EastwoodError> {
        let mut series = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            let closes: Vec<(NaiveDate, f64)> = self
                .read_closes(ticker)?
                .into_iter()
                .filter(|(date, _)| *date >= start && *date <= end)
                .collect();
            if closes.is_empty() {
                return Err(EastwoodError::DataUnavailable {
                    reason: format!("no prices for {} between {} and {}", ticker, start, end),
                });
            }
            log::debug!("{}: {} closes from {}", ticker, closes.len(), self.base_path.display());
            series.push((ticker.clone(), closes));
        }
        Ok(PricePanel::from_series(series))
    }

    fn list_tickers(&self) -> Result<Vec<String>, EastwoodError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| EastwoodError::DataUnavailable {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut tickers = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| EastwoodError::DataUnavailable {
                reason: format!("directory entry error: {}", e),
            })?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(stem) = name_str.strip_suffix(".csv") {
                tickers.push(stem.to_uppercase());
            }
        }

        tickers.sort();
        tickers.dedup();
        Ok(tickers)
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, EastwoodError> {
        if self.csv_path(ticker).is_none() {
            return Ok(None);
        }
        let closes = self.read_closes(ticker)?;
        Ok(match (closes.first(), closes.last()) {
            (Some((first, _)), Some((last, _))) => Some((*first, *last, closes.len())),
            _ => None,
        })
    }
}
