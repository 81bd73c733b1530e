pub mod calendar;
pub mod earnings_calendar;
pub mod history;
pub mod ipo;
pub mod networth;
pub mod scores;
pub mod setup;
pub mod tax;
pub mod ui;

use anyhow::{Context, Result, anyhow};
use chrono::{Duration, NaiveDate};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Where a score command reads its data from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataInput {
    /// Fetched from SEC EDGAR for a ticker or CIK.
    Ticker(String),
    /// Read from a JSON file.
    File(PathBuf),
}

impl DataInput {
    pub fn from_args(ticker: Option<String>, file: Option<PathBuf>) -> Result<Self> {
        match (ticker, file) {
            (_, Some(path)) => Ok(DataInput::File(path)),
            (Some(ticker), None) => Ok(DataInput::Ticker(ticker)),
            (None, None) => Err(anyhow!("Provide a ticker or --file")),
        }
    }
}

/// Reads a JSON input file such as insider trades or earnings history.
pub fn read_json_file<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse input file: {}", path.display()))
}

/// Display name for a data file: its stem, e.g. `AAPL` for `data/AAPL.json`.
pub fn subject_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// The date `days` after `anchor`, or before it when `days` is negative.
pub fn offset_date(anchor: NaiveDate, days: i64) -> Result<NaiveDate> {
    Duration::try_days(days)
        .and_then(|d| anchor.checked_add_signed(d))
        .ok_or_else(|| anyhow!("{days} days from {anchor} is outside the supported date range"))
}
