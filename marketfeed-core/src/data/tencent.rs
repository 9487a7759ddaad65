//! Tencent fqkline history for stocks.
//!
//! Tencent reports only date/open/close/high/low/volume, so `amount`,
//! `change_percent` and `turnover` are derived. Volume stays in lots, like
//! Eastmoney klines; `amount` is converted to yuan.

use super::http::get_json;
use super::normalize::{into_canonical, value_f64, value_u64, PartialRecord};
use super::provider::{DataError, HistoryProvider, HistoryRequest, Source};
use crate::domain::{normalize_date, Exchange, HistoricalRecord, Period};
use chrono::{Datelike, NaiveDate};
use reqwest::blocking::Client;
use serde_json::Value;
use tracing::debug;

const FQKLINE_URL: &str = "https://web.ifzq.gtimg.cn/appstock/app/fqkline/get";

/// Upper bound on rows per request; one calendar year of daily bars fits.
const MAX_ROWS: u32 = 640;

const SHARES_PER_LOT: f64 = 100.0;

pub struct TencentHistory {
    client: Client,
}

impl TencentHistory {
    pub const NAME: &'static str = "tencent";

    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn fetch_segment(
        &self,
        ticker: &str,
        period: &str,
        adjust: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PartialRecord>, DataError> {
        let param = format!(
            "{ticker},{period},{},{},{MAX_ROWS},{adjust}",
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d"),
        );
        let body = get_json(&self.client, Self::NAME, FQKLINE_URL, &[("param", param)])?;
        parse_segment(&body, ticker, period, adjust)
    }
}

impl Source for TencentHistory {
    fn name(&self) -> &str {
        Self::NAME
    }
}

impl HistoryProvider for TencentHistory {
    /// Requests one calendar year at a time to stay under the row cap.
    fn fetch_history(&self, req: &HistoryRequest) -> Result<Vec<HistoricalRecord>, DataError> {
        let ticker = format!("{}{}", Exchange::for_stock(&req.symbol).prefix(), req.symbol);
        let period = match req.period {
            Period::Daily => "day",
            Period::Weekly => "week",
            Period::Monthly => "month",
        };
        let adjust = req.adjust.as_str();

        let mut rows = Vec::new();
        for year in req.start.year()..=req.end.year() {
            let seg_start = NaiveDate::from_ymd_opt(year, 1, 1)
                .map_or(req.start, |d| d.max(req.start));
            let seg_end = NaiveDate::from_ymd_opt(year, 12, 31)
                .map_or(req.end, |d| d.min(req.end));
            let segment = self.fetch_segment(&ticker, period, adjust, seg_start, seg_end)?;
            debug!(%ticker, year, rows = segment.len(), "tencent segment");
            rows.extend(segment);
        }

        rows.retain(|r| r.date >= req.start && r.date <= req.end);
        Ok(into_canonical(rows))
    }
}

/// Rows live under `data.<ticker>.<adjust><period>` (`qfqday`), falling back
/// to the unadjusted `<period>` key, which Tencent uses for unadjusted series
/// and for some adjusted ones.
fn parse_segment(
    body: &Value,
    ticker: &str,
    period: &str,
    adjust: &str,
) -> Result<Vec<PartialRecord>, DataError> {
    let series = body
        .get("data")
        .and_then(|d| d.get(ticker))
        .ok_or_else(|| DataError::ResponseFormatChanged(format!("tencent: no data for {ticker}")))?;

    let adjusted_key = format!("{adjust}{period}");
    let rows = match series.get(&adjusted_key).or_else(|| series.get(period)) {
        Some(Value::Array(rows)) => rows,
        _ => return Ok(Vec::new()),
    };

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(fields) = row.as_array() else {
            continue;
        };
        if fields.len() < 6 {
            return Err(DataError::ResponseFormatChanged(format!(
                "tencent: short row {row}"
            )));
        }
        let date = fields[0]
            .as_str()
            .and_then(normalize_date)
            .ok_or_else(|| {
                DataError::ResponseFormatChanged(format!("tencent: bad date {}", fields[0]))
            })?;
        let num = |i: usize| value_f64(&fields[i]).unwrap_or(f64::NAN);
        let close = num(2);
        let volume = value_u64(&fields[5]).unwrap_or(0);
        out.push(PartialRecord {
            date,
            open: num(1),
            close,
            high: num(3),
            low: num(4),
            volume,
            amount: Some(volume as f64 * SHARES_PER_LOT * close),
            change_percent: None,
            turnover: None,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_adjusted_series_and_derives_columns() {
        let body = json!({
            "code": 0,
            "data": {
                "sh600000": {
                    "qfqday": [
                        ["2024-01-02", "7.05", "7.10", "7.15", "7.01", "1000.000"],
                        ["2024-01-03", "7.10", "7.81", "7.90", "7.05", "2000.000", {"nd": "2023"}]
                    ]
                }
            }
        });
        let partial = parse_segment(&body, "sh600000", "day", "qfq").unwrap();
        let rows = into_canonical(partial);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].close, 7.10);
        assert_eq!(rows[0].volume, 1000);
        assert!((rows[0].amount - 710_000.0).abs() < 1e-6);
        assert_eq!(rows[0].change_percent, 0.0);
        assert!((rows[1].change_percent - 10.0).abs() < 1e-6);
        assert_eq!(rows[1].turnover, 0.0);
    }

    #[test]
    fn amount_matches_eastmoney_units() {
        let tencent = json!({
            "data": {"sh600000": {"qfqday": [
                ["2024-01-02", "7.05", "7.10", "7.15", "7.01", "323456.000"]
            ]}}
        });
        let eastmoney = json!({
            "data": {"klines": [
                "2024-01-02,7.05,7.10,7.15,7.01,323456,229653760.00,1.98,0.71,0.05,0.04"
            ]}
        });
        let ours = into_canonical(parse_segment(&tencent, "sh600000", "day", "qfq").unwrap());
        let theirs = crate::data::eastmoney::parse_klines("600000", &eastmoney).unwrap();

        assert_eq!(ours[0].volume, theirs[0].volume);
        let relative = (ours[0].amount - theirs[0].amount).abs() / theirs[0].amount;
        assert!(relative < 1e-9, "{} vs {}", ours[0].amount, theirs[0].amount);
    }

    #[test]
    fn falls_back_to_plain_period_key() {
        let body = json!({
            "data": {"sz000001": {"day": [["2024-01-02", 9.0, 9.1, 9.2, 8.9, 500]]}}
        });
        let rows = parse_segment(&body, "sz000001", "day", "").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].high, 9.2);
    }

    #[test]
    fn missing_ticker_is_format_change() {
        let err = parse_segment(&json!({"data": {}}), "sh600000", "day", "qfq").unwrap_err();
        assert!(matches!(err, DataError::ResponseFormatChanged(_)));
    }
}
