//! Quote: one row of the realtime market snapshot.

use serde::{Deserialize, Serialize};

/// Realtime snapshot of a single A-share.
///
/// `code` is always the bare six-digit code; exchange prefixes reported by
/// some providers (`sh600000`) are stripped during normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub code: String,
    pub name: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub prev_close: f64,
    pub volume: u64,
    pub amount: f64,
    pub turnover: f64,
    pub pe_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
}
