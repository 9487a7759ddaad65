//! Schema normalization glue shared by the provider adapters.
//!
//! Upstreams report different subsets of the canonical columns and encode
//! numbers inconsistently (numbers, numeric strings, `"-"` for suspended
//! stocks). Adapters parse into [`PartialRecord`] and call
//! [`into_canonical`], which fills derived columns and enforces the
//! sorted/unique-date invariant.

use crate::domain::HistoricalRecord;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::BTreeMap;

/// A row as reported by a provider, before derived columns are filled.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialRecord {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub amount: Option<f64>,
    pub change_percent: Option<f64>,
    pub turnover: Option<f64>,
}

/// Sort by date, keep the last row per date, and fill missing columns:
/// `amount = volume * close`, `change_percent` from the previous close
/// (0.0 for the first row), `turnover = 0.0`.
pub fn into_canonical(rows: Vec<PartialRecord>) -> Vec<HistoricalRecord> {
    let by_date: BTreeMap<NaiveDate, PartialRecord> =
        rows.into_iter().map(|r| (r.date, r)).collect();

    let mut prev_close: Option<f64> = None;
    let mut out = Vec::with_capacity(by_date.len());
    for (date, row) in by_date {
        let change_percent = row.change_percent.unwrap_or_else(|| match prev_close {
            Some(prev) if prev != 0.0 => (row.close - prev) / prev * 100.0,
            _ => 0.0,
        });
        out.push(HistoricalRecord {
            date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            amount: row.amount.unwrap_or(row.volume as f64 * row.close),
            change_percent,
            turnover: row.turnover.unwrap_or(0.0),
        });
        prev_close = Some(row.close);
    }
    out
}

/// Parse a loosely typed JSON number. `"-"`, `""`, `null` and NaN are `None`.
pub fn value_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Parse a volume that may arrive as a float string (`"1234.000"`).
pub fn value_u64(value: &Value) -> Option<u64> {
    value_f64(value).filter(|v| *v >= 0.0).map(|v| v.round() as u64)
}

/// Same as [`value_f64`] for a raw string field.
pub fn str_f64(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn partial(d: u32, close: f64) -> PartialRecord {
        PartialRecord {
            date: day(d),
            open: close,
            high: close,
            low: close,
            close,
            volume: 100,
            amount: None,
            change_percent: None,
            turnover: None,
        }
    }

    #[test]
    fn fills_derived_columns() {
        let rows = into_canonical(vec![partial(2, 10.0), partial(3, 11.0)]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].amount, 1000.0);
        assert_eq!(rows[0].change_percent, 0.0);
        assert!((rows[1].change_percent - 10.0).abs() < 1e-9);
        assert_eq!(rows[1].turnover, 0.0);
    }

    #[test]
    fn keeps_reported_columns() {
        let mut row = partial(2, 10.0);
        row.amount = Some(5.0);
        row.change_percent = Some(1.5);
        row.turnover = Some(0.3);
        let rows = into_canonical(vec![row]);
        assert_eq!(rows[0].amount, 5.0);
        assert_eq!(rows[0].change_percent, 1.5);
        assert_eq!(rows[0].turnover, 0.3);
    }

    #[test]
    fn sorts_and_dedupes_keeping_last() {
        let rows = into_canonical(vec![partial(4, 1.0), partial(2, 2.0), partial(4, 3.0)]);
        let dates: Vec<_> = rows.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![day(2), day(4)]);
        assert_eq!(rows[1].close, 3.0);
    }

    #[test]
    fn loose_numbers() {
        assert_eq!(value_f64(&json!(1.5)), Some(1.5));
        assert_eq!(value_f64(&json!("2.25")), Some(2.25));
        assert_eq!(value_f64(&json!("-")), None);
        assert_eq!(value_f64(&Value::Null), None);
        assert_eq!(value_u64(&json!("1234.000")), Some(1234));
        assert_eq!(value_u64(&json!(-1)), None);
    }
}
