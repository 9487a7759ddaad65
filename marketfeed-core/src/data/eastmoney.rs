//! Eastmoney adapters: realtime snapshot (whole market or board by board),
//! kline history for stocks and indices, and capital-flow data.

use super::http::get_json;
use super::normalize::{into_canonical, str_f64, value_f64, value_u64, PartialRecord};
use super::provider::{
    DataError, FundFlowProvider, HistoryProvider, HistoryRequest, QuoteProvider, Source,
};
use crate::domain::{
    normalize_date, Adjust, DataKind, Exchange, HistoricalRecord, NorthFlow, Period, Quote,
    SectorFlow,
};
use reqwest::blocking::Client;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

const CLIST_URL: &str = "https://82.push2.eastmoney.com/api/qt/clist/get";
const KLINE_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";
const SECTOR_FLOW_URL: &str = "https://push2.eastmoney.com/api/qt/clist/get";
const DATACENTER_URL: &str = "https://datacenter-web.eastmoney.com/api/data/v1/get";
const UT: &str = "bd1d9ddb04089700cf9c27f6f7426281";
const KLINE_UT: &str = "7eea3edcaed734bea9cbfc24409ed989";

const PAGE_SIZE: usize = 100;
const MAX_PAGES: usize = 100;
const QUOTE_FIELDS: &str = "f2,f3,f4,f5,f6,f8,f9,f12,f14,f15,f16,f17,f18,f23";

/// Industry boards, ranked by today's main-force net inflow (`f62`).
const INDUSTRY_BOARDS: &str = "m:90 t:2";
const SECTOR_FLOW_FIELDS: &str = "f12,f14,f3,f62,f184";
/// Northbound = Shanghai + Shenzhen Connect, southbound excluded.
const NORTHBOUND_FILTER: &str = "(MUTUAL_TYPE=\"005\")";
const NORTH_FLOW_DAYS: usize = 10;

/// Filter selecting every A-share board at once.
const ALL_A_SHARES: &str = "m:0 t:6,m:0 t:80,m:1 t:2,m:1 t:23,m:0 t:81 s:2048";

/// STAR market, ChiNext, Shanghai main, Shenzhen main.
const BOARDS: [(&str, &str); 4] = [
    ("star", "m:1 t:23"),
    ("chinext", "m:0 t:80"),
    ("shanghai", "m:1 t:2,m:1 t:23"),
    ("shenzhen", "m:0 t:6,m:0 t:80"),
];

/// Whole-market snapshot from the clist endpoint.
pub struct EastmoneyQuotes {
    client: Client,
}

impl EastmoneyQuotes {
    pub const NAME: &'static str = "eastmoney";

    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Source for EastmoneyQuotes {
    fn name(&self) -> &str {
        Self::NAME
    }
}

impl QuoteProvider for EastmoneyQuotes {
    fn fetch_quotes(&self) -> Result<Vec<Quote>, DataError> {
        fetch_clist(&self.client, Self::NAME, ALL_A_SHARES)
    }
}

/// The same snapshot assembled board by board. Boards that fail are skipped;
/// a code listed on two boards keeps its first occurrence.
pub struct EastmoneyBoardQuotes {
    client: Client,
}

impl EastmoneyBoardQuotes {
    pub const NAME: &'static str = "eastmoney_boards";

    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Source for EastmoneyBoardQuotes {
    fn name(&self) -> &str {
        Self::NAME
    }
}

impl QuoteProvider for EastmoneyBoardQuotes {
    fn fetch_quotes(&self) -> Result<Vec<Quote>, DataError> {
        let mut seen = HashSet::new();
        let mut combined = Vec::new();
        for (board, filter) in BOARDS {
            match fetch_clist(&self.client, Self::NAME, filter) {
                Ok(quotes) => combined.extend(
                    quotes
                        .into_iter()
                        .filter(|q| seen.insert(q.code.clone())),
                ),
                Err(e) => warn!(board, error = %e, "board snapshot failed"),
            }
        }
        Ok(combined)
    }
}

/// Page through clist until `total` rows are collected.
fn fetch_clist(client: &Client, source_name: &str, filter: &str) -> Result<Vec<Quote>, DataError> {
    let mut quotes = Vec::new();
    for page in 1..=MAX_PAGES {
        let query = [
            ("pn", page.to_string()),
            ("pz", PAGE_SIZE.to_string()),
            ("po", "1".to_string()),
            ("np", "1".to_string()),
            ("ut", UT.to_string()),
            ("fltt", "2".to_string()),
            ("invt", "2".to_string()),
            ("fid", "f3".to_string()),
            ("fs", filter.to_string()),
            ("fields", QUOTE_FIELDS.to_string()),
        ];
        let body = get_json(client, source_name, CLIST_URL, &query)?;
        let (total, rows) = parse_clist_page(&body)?;
        if rows.is_empty() {
            break;
        }
        quotes.extend(rows);
        debug!(page, collected = quotes.len(), total, "clist page");
        if quotes.len() >= total {
            break;
        }
    }
    Ok(quotes)
}

/// `(total, quotes)` of one clist page. A null `data` is an empty page.
fn parse_clist_page(body: &Value) -> Result<(usize, Vec<Quote>), DataError> {
    let data = match body.get("data") {
        Some(Value::Null) | None => return Ok((0, Vec::new())),
        Some(data) => data,
    };
    let total = data.get("total").and_then(Value::as_u64).unwrap_or(0) as usize;
    let rows = match data.get("diff") {
        Some(Value::Array(rows)) => rows.iter().collect::<Vec<_>>(),
        Some(Value::Object(map)) => map.values().collect(),
        _ => {
            return Err(DataError::ResponseFormatChanged(
                "eastmoney clist: missing 'diff'".into(),
            ))
        }
    };
    Ok((total, rows.into_iter().filter_map(parse_quote_row).collect()))
}

fn parse_quote_row(row: &Value) -> Option<Quote> {
    let code = match row.get("f12")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => format!("{:06}", n.as_u64()?),
        _ => return None,
    };
    let num = |key: &str| row.get(key).and_then(value_f64);
    Some(Quote {
        code,
        name: row
            .get("f14")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        price: num("f2").unwrap_or(f64::NAN),
        change: num("f4").unwrap_or(f64::NAN),
        change_percent: num("f3").unwrap_or(f64::NAN),
        open: num("f17").unwrap_or(f64::NAN),
        high: num("f15").unwrap_or(f64::NAN),
        low: num("f16").unwrap_or(f64::NAN),
        prev_close: num("f18").unwrap_or(f64::NAN),
        volume: row.get("f5").and_then(value_u64).unwrap_or(0),
        amount: num("f6").unwrap_or(0.0),
        turnover: num("f8").unwrap_or(0.0),
        pe_ratio: num("f9"),
        pb_ratio: num("f23"),
    })
}

/// Daily/weekly/monthly klines for stocks or indices.
pub struct EastmoneyHistory {
    client: Client,
    kind: DataKind,
}

impl EastmoneyHistory {
    pub const NAME: &'static str = "eastmoney";

    pub fn stocks(client: Client) -> Self {
        Self {
            client,
            kind: DataKind::Stock,
        }
    }

    pub fn indices(client: Client) -> Self {
        Self {
            client,
            kind: DataKind::Index,
        }
    }

    /// `1.` for Shanghai listings, `0.` for Shenzhen and Beijing.
    fn secid(&self, code: &str) -> String {
        let exchange = match self.kind {
            DataKind::Stock => Exchange::for_stock(code),
            DataKind::Index => Exchange::for_index(code),
        };
        match exchange {
            Exchange::Shanghai => format!("1.{code}"),
            Exchange::Shenzhen | Exchange::Beijing => format!("0.{code}"),
        }
    }
}

impl Source for EastmoneyHistory {
    fn name(&self) -> &str {
        Self::NAME
    }
}

impl HistoryProvider for EastmoneyHistory {
    fn fetch_history(&self, req: &HistoryRequest) -> Result<Vec<HistoricalRecord>, DataError> {
        let klt = match req.period {
            Period::Daily => "101",
            Period::Weekly => "102",
            Period::Monthly => "103",
        };
        let fqt = match (self.kind, req.adjust) {
            (DataKind::Index, _) | (_, Adjust::None) => "0",
            (DataKind::Stock, Adjust::Qfq) => "1",
            (DataKind::Stock, Adjust::Hfq) => "2",
        };
        let query = [
            ("fields1", "f1,f2,f3,f4,f5,f6".to_string()),
            ("fields2", "f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61".to_string()),
            ("ut", KLINE_UT.to_string()),
            ("klt", klt.to_string()),
            ("fqt", fqt.to_string()),
            ("secid", self.secid(&req.symbol)),
            ("beg", req.start.format("%Y%m%d").to_string()),
            ("end", req.end.format("%Y%m%d").to_string()),
        ];
        let body = get_json(&self.client, Self::NAME, KLINE_URL, &query)?;
        parse_klines(&req.symbol, &body)
    }
}

/// Kline rows are CSV strings:
/// `date,open,close,high,low,volume,amount,amplitude,change_pct,change,turnover`.
pub(super) fn parse_klines(symbol: &str, body: &Value) -> Result<Vec<HistoricalRecord>, DataError> {
    let klines = match body.get("data") {
        Some(Value::Null) | None => {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
        }
        Some(data) => data
            .get("klines")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                DataError::ResponseFormatChanged("eastmoney kline: missing 'klines'".into())
            })?,
    };

    let mut rows = Vec::with_capacity(klines.len());
    for line in klines {
        let Some(line) = line.as_str() else {
            continue;
        };
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 7 {
            return Err(DataError::ResponseFormatChanged(format!(
                "eastmoney kline: short row '{line}'"
            )));
        }
        let date = normalize_date(fields[0]).ok_or_else(|| {
            DataError::ResponseFormatChanged(format!("eastmoney kline: bad date '{}'", fields[0]))
        })?;
        let optional = |i: usize| fields.get(i).and_then(|f| str_f64(f));
        rows.push(PartialRecord {
            date,
            open: str_f64(fields[1]).unwrap_or(f64::NAN),
            close: str_f64(fields[2]).unwrap_or(f64::NAN),
            high: str_f64(fields[3]).unwrap_or(f64::NAN),
            low: str_f64(fields[4]).unwrap_or(f64::NAN),
            volume: str_f64(fields[5]).map(|v| v.max(0.0).round() as u64).unwrap_or(0),
            amount: optional(6),
            change_percent: optional(8),
            turnover: optional(10),
        });
    }
    Ok(into_canonical(rows))
}

/// Sector money-flow ranking and northbound trading history.
pub struct EastmoneyFundFlow {
    client: Client,
}

impl EastmoneyFundFlow {
    pub const NAME: &'static str = "eastmoney";

    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Source for EastmoneyFundFlow {
    fn name(&self) -> &str {
        Self::NAME
    }
}

impl FundFlowProvider for EastmoneyFundFlow {
    fn fetch_sector_flow(&self) -> Result<Vec<SectorFlow>, DataError> {
        let query = [
            ("pn", "1".to_string()),
            ("pz", "500".to_string()),
            ("po", "1".to_string()),
            ("np", "1".to_string()),
            ("ut", UT.to_string()),
            ("fltt", "2".to_string()),
            ("invt", "2".to_string()),
            ("fid", "f62".to_string()),
            ("fs", INDUSTRY_BOARDS.to_string()),
            ("fields", SECTOR_FLOW_FIELDS.to_string()),
        ];
        let body = get_json(&self.client, Self::NAME, SECTOR_FLOW_URL, &query)?;
        parse_sector_flow(&body)
    }

    fn fetch_north_flow(&self) -> Result<Vec<NorthFlow>, DataError> {
        let query = [
            ("reportName", "RPT_MUTUAL_DEAL_HISTORY".to_string()),
            ("columns", "ALL".to_string()),
            ("source", "WEB".to_string()),
            ("client", "WEB".to_string()),
            ("sortColumns", "TRADE_DATE".to_string()),
            ("sortTypes", "-1".to_string()),
            ("pageSize", NORTH_FLOW_DAYS.to_string()),
            ("pageNumber", "1".to_string()),
            ("filter", NORTHBOUND_FILTER.to_string()),
        ];
        let body = get_json(&self.client, Self::NAME, DATACENTER_URL, &query)?;
        parse_north_flow(&body)
    }
}

/// Rows without a name are dropped; missing figures become 0.0.
fn parse_sector_flow(body: &Value) -> Result<Vec<SectorFlow>, DataError> {
    let rows = match body.get("data") {
        Some(Value::Null) | None => return Ok(Vec::new()),
        Some(data) => match data.get("diff") {
            Some(Value::Array(rows)) => rows,
            _ => {
                return Err(DataError::ResponseFormatChanged(
                    "eastmoney sector flow: missing 'diff'".into(),
                ))
            }
        },
    };

    let mut sectors: Vec<SectorFlow> = rows
        .iter()
        .filter_map(|row| {
            let num = |key: &str| row.get(key).and_then(value_f64).unwrap_or(0.0);
            Some(SectorFlow {
                name: row.get("f14")?.as_str()?.to_string(),
                change_percent: num("f3"),
                main_net_inflow: num("f62"),
                main_net_inflow_percent: num("f184"),
            })
        })
        .collect();
    sectors.sort_by(|a, b| b.main_net_inflow.total_cmp(&a.main_net_inflow));
    Ok(sectors)
}

/// Datacenter rows arrive newest first; returned oldest first.
fn parse_north_flow(body: &Value) -> Result<Vec<NorthFlow>, DataError> {
    let rows = match body.get("result") {
        Some(Value::Null) | None => return Ok(Vec::new()),
        Some(result) => result
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                DataError::ResponseFormatChanged("eastmoney north flow: missing 'data'".into())
            })?,
    };

    let mut days = Vec::with_capacity(rows.len());
    for row in rows {
        let date = row
            .get("TRADE_DATE")
            .and_then(Value::as_str)
            .and_then(normalize_date)
            .ok_or_else(|| {
                DataError::ResponseFormatChanged("eastmoney north flow: bad TRADE_DATE".into())
            })?;
        let num = |key: &str| row.get(key).and_then(value_f64).unwrap_or(0.0);
        days.push(NorthFlow {
            date,
            net_inflow: num("NET_DEAL_AMT"),
            buy_amount: num("BUY_AMT"),
            sell_amount: num("SELL_AMT"),
            accumulated: num("ACCUM_DEAL_AMT"),
        });
    }
    days.sort_by_key(|d| d.date);
    days.dedup_by_key(|d| d.date);
    Ok(days)
}
