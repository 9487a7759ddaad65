//! China Securities Index performance endpoint. Daily bars only.
//!
//! CSIndex reports volume in 10k lots and turnover value in 100M yuan; both
//! are scaled to lots and yuan to line up with Eastmoney index klines.

use super::http::get_json;
use super::normalize::{into_canonical, value_f64, PartialRecord};
use super::provider::{DataError, HistoryProvider, HistoryRequest, Source};
use crate::domain::{normalize_date, HistoricalRecord, Period};
use reqwest::blocking::Client;
use serde_json::Value;

const PERF_URL: &str = "https://www.csindex.com.cn/csindex-home/perf/index-perf";

const LOTS_PER_VOLUME_UNIT: f64 = 10_000.0;
const YUAN_PER_VALUE_UNIT: f64 = 100_000_000.0;
const SHARES_PER_LOT: f64 = 100.0;

pub struct CsindexHistory {
    client: Client,
}

impl CsindexHistory {
    pub const NAME: &'static str = "csindex";

    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Source for CsindexHistory {
    fn name(&self) -> &str {
        Self::NAME
    }
}

impl HistoryProvider for CsindexHistory {
    fn fetch_history(&self, req: &HistoryRequest) -> Result<Vec<HistoricalRecord>, DataError> {
        if req.period != Period::Daily {
            return Err(DataError::Source {
                source_name: Self::NAME.to_string(),
                message: format!("{} bars are not served", req.period),
            });
        }
        let query = [
            ("indexCode", req.symbol.clone()),
            ("startDate", req.start.format("%Y%m%d").to_string()),
            ("endDate", req.end.format("%Y%m%d").to_string()),
        ];
        let body = get_json(&self.client, Self::NAME, PERF_URL, &query)?;
        let mut rows = parse_perf(&body)?;
        rows.retain(|r| r.date >= req.start && r.date <= req.end);
        Ok(into_canonical(rows))
    }
}

fn parse_perf(body: &Value) -> Result<Vec<PartialRecord>, DataError> {
    let rows = match body.get("data") {
        Some(Value::Array(rows)) => rows,
        Some(Value::Null) | None => return Ok(Vec::new()),
        Some(_) => {
            return Err(DataError::ResponseFormatChanged(
                "csindex: 'data' is not an array".into(),
            ))
        }
    };

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let date = row
            .get("tradeDate")
            .and_then(Value::as_str)
            .and_then(normalize_date)
            .ok_or_else(|| DataError::ResponseFormatChanged("csindex: missing tradeDate".into()))?;
        let num = |key: &str| row.get(key).and_then(value_f64);
        let close = num("close").unwrap_or(f64::NAN);
        let volume = num("tradingVol")
            .map(|v| (v * LOTS_PER_VOLUME_UNIT).max(0.0).round() as u64)
            .unwrap_or(0);
        let amount = num("tradingValue")
            .map(|v| v * YUAN_PER_VALUE_UNIT)
            .unwrap_or(volume as f64 * SHARES_PER_LOT * close);
        out.push(PartialRecord {
            date,
            open: num("open").unwrap_or(f64::NAN),
            high: num("high").unwrap_or(f64::NAN),
            low: num("low").unwrap_or(f64::NAN),
            close,
            volume,
            amount: Some(amount),
            change_percent: num("changePct"),
            turnover: None,
        });
    }
    Ok(out)
}
