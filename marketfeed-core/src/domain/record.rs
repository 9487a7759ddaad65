//! HistoricalRecord: one canonical row of a price series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Date formats accepted from providers and from files written by older tools.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y%m%d", "%Y/%m/%d"];

/// One trading period of a symbol in the canonical schema.
///
/// Every provider adapter must produce all fields. Derived fields a provider
/// cannot report (`amount`, `change_percent`, `turnover`) are filled in by
/// [`crate::data::normalize`] before rows leave the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub amount: f64,
    pub change_percent: f64,
    pub turnover: f64,
}

impl HistoricalRecord {
    /// The date in its on-disk form (`YYYY-MM-DD`), which sorts lexicographically.
    pub fn date_key(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

/// Parse a provider or file date into a `NaiveDate`.
///
/// Accepts `YYYY-MM-DD`, `YYYYMMDD` and `YYYY/MM/DD`, each optionally followed
/// by a time part (`2024-01-02 00:00:00`, `2024-01-02T15:00:00`).
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let day_part = trimmed
        .split(|c: char| c == ' ' || c == 'T')
        .next()
        .unwrap_or(trimmed);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(day_part, fmt).ok())
}
