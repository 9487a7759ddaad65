//! Provider capability traits and structured error types.
//!
//! Every upstream is wrapped in an adapter implementing [`QuoteProvider`] or
//! [`HistoryProvider`]. Adapters own their schema mapping: whatever leaves
//! `fetch_*` is already in the canonical schema. The cache layer and the
//! source manager sit above these traits; providers know about neither.

use crate::domain::{Adjust, HistoricalRecord, NorthFlow, Period, Quote, SectorFlow};
use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

/// Structured error types for data operations.
///
/// Only `InvalidInput` and `AllSourcesFailed` are meant to reach callers of
/// [`crate::market::MarketData`]; the rest are recovered from internally.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("source '{source_name}' failed: {message}")]
    Source {
        source_name: String,
        message: String,
    },

    #[error("source '{source_name}' returned no rows")]
    EmptyResult { source_name: String },

    #[error("all sources failed for {kind}: {last_error}")]
    AllSourcesFailed { kind: RequestKind, last_error: String },

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("no cached data for '{partition}'")]
    NoCachedData { partition: String },

    #[error("cached '{partition}' ends {cached_end}, too stale for {requested_end}")]
    Stale {
        partition: String,
        cached_end: NaiveDate,
        requested_end: NaiveDate,
    },

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("config error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for DataError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            DataError::ResponseFormatChanged(e.to_string())
        } else {
            DataError::NetworkUnreachable(e.to_string())
        }
    }
}

/// The three request families the source manager resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    RealtimeQuotes,
    StockHistory,
    IndexHistory,
    SectorFlow,
    NorthFlow,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestKind::RealtimeQuotes => "realtime quotes",
            RequestKind::StockHistory => "stock history",
            RequestKind::IndexHistory => "index history",
            RequestKind::SectorFlow => "sector flow",
            RequestKind::NorthFlow => "north flow",
        })
    }
}

/// Canonical arguments for a historical fetch. `start` and `end` are inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub symbol: String,
    pub period: Period,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub adjust: Adjust,
}

impl HistoryRequest {
    pub fn new(
        symbol: impl Into<String>,
        period: Period,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            period,
            start,
            end,
            adjust: Adjust::default(),
        }
    }

    pub fn with_adjust(mut self, adjust: Adjust) -> Self {
        self.adjust = adjust;
        self
    }
}

/// Anything the source manager can rank and health-track.
///
/// The name doubles as the health key, so adapters hitting the same
/// upstream may share a name and a failure counter.
pub trait Source: Send + Sync {
    fn name(&self) -> &str;
}

/// Providers of the full-market realtime snapshot.
pub trait QuoteProvider: Source {
    fn fetch_quotes(&self) -> Result<Vec<Quote>, DataError>;
}

/// Providers of daily/weekly/monthly bars for stocks or indices.
pub trait HistoryProvider: Source {
    fn fetch_history(&self, req: &HistoryRequest) -> Result<Vec<HistoricalRecord>, DataError>;
}

/// Providers of capital-flow rankings and northbound trading.
pub trait FundFlowProvider: Source {
    /// Industry sectors ranked by today's main-force net inflow, largest first.
    fn fetch_sector_flow(&self) -> Result<Vec<SectorFlow>, DataError>;

    /// Recent northbound trading days, oldest first.
    fn fetch_north_flow(&self) -> Result<Vec<NorthFlow>, DataError>;
}
