//! Sina market-center snapshot, paged over the `hs_a` node.

use super::http::get_json;
use super::normalize::{value_f64, value_u64};
use super::provider::{DataError, QuoteProvider, Source};
use crate::domain::{normalize_symbol, Quote};
use reqwest::blocking::Client;
use serde_json::Value;
use tracing::debug;

const NODE_URL: &str =
    "https://vip.stock.finance.sina.com.cn/quotes_service/api/json_v2.php/Market_Center.getHQNodeData";
const PAGE_SIZE: usize = 80;
const MAX_PAGES: usize = 100;

pub struct SinaQuotes {
    client: Client,
}

impl SinaQuotes {
    pub const NAME: &'static str = "sina";

    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Source for SinaQuotes {
    fn name(&self) -> &str {
        Self::NAME
    }
}

impl QuoteProvider for SinaQuotes {
    fn fetch_quotes(&self) -> Result<Vec<Quote>, DataError> {
        let mut quotes = Vec::new();
        for page in 1..=MAX_PAGES {
            let query = [
                ("page", page.to_string()),
                ("num", PAGE_SIZE.to_string()),
                ("sort", "symbol".to_string()),
                ("asc", "1".to_string()),
                ("node", "hs_a".to_string()),
                ("symbol", String::new()),
                ("_s_r_a", "page".to_string()),
            ];
            let body = get_json(&self.client, Self::NAME, NODE_URL, &query)?;
            let rows = parse_page(&body)?;
            let last_page = rows.len() < PAGE_SIZE;
            quotes.extend(rows);
            debug!(page, collected = quotes.len(), "sina page");
            if last_page {
                break;
            }
        }
        Ok(quotes)
    }
}

fn parse_page(body: &Value) -> Result<Vec<Quote>, DataError> {
    match body {
        Value::Array(rows) => Ok(rows.iter().filter_map(parse_row).collect()),
        Value::Null => Ok(Vec::new()),
        _ => Err(DataError::ResponseFormatChanged(
            "sina: expected a JSON array".into(),
        )),
    }
}

fn parse_row(row: &Value) -> Option<Quote> {
    let code = row
        .get("code")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| row.get("symbol").and_then(Value::as_str).map(normalize_symbol))?;
    let num = |key: &str| row.get(key).and_then(value_f64);
    Some(Quote {
        code,
        name: row
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        price: num("trade").unwrap_or(f64::NAN),
        change: num("pricechange").unwrap_or(f64::NAN),
        change_percent: num("changepercent").unwrap_or(f64::NAN),
        open: num("open").unwrap_or(f64::NAN),
        high: num("high").unwrap_or(f64::NAN),
        low: num("low").unwrap_or(f64::NAN),
        prev_close: num("settlement").unwrap_or(f64::NAN),
        volume: row.get("volume").and_then(value_u64).unwrap_or(0),
        amount: num("amount").unwrap_or(0.0),
        turnover: num("turnoverratio").unwrap_or(0.0),
        pe_ratio: num("per"),
        pb_ratio: num("pb"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_node_rows() {
        let body = json!([
            {"symbol": "sh600000", "code": "600000", "name": "浦发银行", "trade": "10.500",
             "pricechange": 0.26, "changepercent": 2.539, "settlement": "10.240",
             "open": "10.300", "high": "10.600", "low": "10.200", "volume": 12000000,
             "amount": 126000000, "turnoverratio": 0.08, "per": 5.1, "pb": 0.45},
            {"symbol": "sz000001", "name": "平安银行", "trade": "11.000", "volume": "0"}
        ]);
        let quotes = parse_page(&body).unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].code, "600000");
        assert_eq!(quotes[0].price, 10.5);
        assert_eq!(quotes[0].prev_close, 10.24);
        assert_eq!(quotes[0].pb_ratio, Some(0.45));
        assert_eq!(quotes[1].code, "000001");
        assert!(quotes[1].change_percent.is_nan());
    }

    #[test]
    fn rejects_non_array_body() {
        let err = parse_page(&json!({"error": "busy"})).unwrap_err();
        assert!(matches!(err, DataError::ResponseFormatChanged(_)));
    }
}
