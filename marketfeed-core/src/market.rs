//! Read-through orchestration over the memory tier, the Parquet store and
//! the source manager.
//!
//! `MarketData` is the single owner of all mutable state (memory entries,
//! rate-limit stamp, health counters). Callers share it behind their own
//! synchronization if they need to.

use crate::config::MarketFeedConfig;
use crate::data::memory::MemoryCache;
use crate::data::provider::{DataError, HistoryRequest};
use crate::data::sources::SourceManager;
use crate::data::store::{FileStat, HistoricalStore, PartitionKey};
use crate::domain::{
    normalize_symbol, validate_symbol, Adjust, DataKind, HistoricalRecord, NorthFlow, Quote,
    SectorFlow,
};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Memory key of the full-market snapshot.
pub const REALTIME_QUOTES_KEY: &str = "realtime_quotes";
pub const DEFAULT_QUOTE_TTL: Duration = Duration::from_secs(30);
/// Maximum rows returned by [`MarketData::search`].
pub const SEARCH_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Gainers,
    Losers,
}

/// Which cache tiers [`MarketData::clear_cache`] touches. Persisted
/// partitions are only removed when asked for explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClearScope {
    #[default]
    Memory,
    Local,
    All,
}

impl ClearScope {
    fn clears_memory(self) -> bool {
        matches!(self, ClearScope::Memory | ClearScope::All)
    }

    fn clears_local(self) -> bool {
        matches!(self, ClearScope::Local | ClearScope::All)
    }
}

impl FromStr for ClearScope {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(ClearScope::Memory),
            "local" => Ok(ClearScope::Local),
            "all" => Ok(ClearScope::All),
            other => Err(DataError::InvalidInput(format!(
                "unknown clear scope '{other}' (expected memory, local or all)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub memory_key_count: usize,
    pub cache_directory: String,
    pub files: Vec<FileStat>,
    pub total_files: usize,
    pub total_size_kb: f64,
}

/// What a clear actually did. Untouched tiers are omitted from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClearReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_cleared: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_files_deleted: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

pub struct MarketData {
    memory: MemoryCache<Arc<Vec<Quote>>>,
    store: HistoricalStore,
    sources: SourceManager,
    quote_ttl: Duration,
}

impl MarketData {
    pub fn new(store: HistoricalStore, sources: SourceManager) -> Self {
        Self {
            memory: MemoryCache::new(),
            store,
            sources,
            quote_ttl: DEFAULT_QUOTE_TTL,
        }
    }

    pub fn with_quote_ttl(mut self, ttl: Duration) -> Self {
        self.quote_ttl = ttl;
        self
    }

    /// Wire the store and the HTTP adapters described by `config`.
    pub fn from_config(config: &MarketFeedConfig) -> Result<Self, DataError> {
        let store = config.historical_store()?;
        let sources = config.source_manager()?;
        Ok(Self::new(store, sources).with_quote_ttl(config.quote_ttl()))
    }

    pub fn sources(&self) -> &SourceManager {
        &self.sources
    }

    pub fn store(&self) -> &HistoricalStore {
        &self.store
    }

    // ── Realtime ─────────────────────────────────────────────────────

    /// Full-market snapshot, served from memory for `quote_ttl`.
    pub fn realtime_quotes(&mut self) -> Result<Arc<Vec<Quote>>, DataError> {
        if let Some(quotes) = self.memory.get(REALTIME_QUOTES_KEY, self.quote_ttl) {
            debug!(rows = quotes.len(), "realtime quotes from memory");
            return Ok(quotes);
        }
        let quotes = Arc::new(self.sources.realtime_quotes()?);
        self.memory.set(REALTIME_QUOTES_KEY, Arc::clone(&quotes));
        Ok(quotes)
    }

    /// Snapshot row of one stock. Accepts decorated codes (`sh600000`,
    /// `600000.SH`).
    pub fn stock_quote(&mut self, symbol: &str) -> Result<Quote, DataError> {
        let code = normalize_symbol(symbol);
        validate_symbol(&code)?;
        self.realtime_quotes()?
            .iter()
            .find(|q| q.code == code)
            .cloned()
            .ok_or(DataError::SymbolNotFound { symbol: code })
    }

    /// Top `limit` quotes by change percent. Rows without a change percent
    /// (suspended stocks) are left out.
    pub fn top_movers(
        &mut self,
        limit: usize,
        direction: Direction,
    ) -> Result<Vec<Quote>, DataError> {
        let quotes = self.realtime_quotes()?;
        let mut ranked: Vec<Quote> = quotes
            .iter()
            .filter(|q| q.change_percent.is_finite())
            .cloned()
            .collect();
        match direction {
            Direction::Gainers => {
                ranked.sort_by(|a, b| b.change_percent.total_cmp(&a.change_percent))
            }
            Direction::Losers => {
                ranked.sort_by(|a, b| a.change_percent.total_cmp(&b.change_percent))
            }
        }
        ranked.truncate(limit);
        Ok(ranked)
    }

    /// Quotes whose name or code contains `keyword`, at most [`SEARCH_LIMIT`].
    pub fn search(&mut self, keyword: &str) -> Result<Vec<Quote>, DataError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(DataError::InvalidInput("search keyword is empty".into()));
        }
        let quotes = self.realtime_quotes()?;
        Ok(quotes
            .iter()
            .filter(|q| q.name.contains(keyword) || q.code.contains(keyword))
            .take(SEARCH_LIMIT)
            .cloned()
            .collect())
    }

    // ── History ──────────────────────────────────────────────────────

    pub fn stock_history(
        &mut self,
        req: &HistoryRequest,
    ) -> Result<Vec<HistoricalRecord>, DataError> {
        self.history(DataKind::Stock, req)
    }

    /// Index bars are always unadjusted; `req.adjust` is ignored.
    pub fn index_history(
        &mut self,
        req: &HistoryRequest,
    ) -> Result<Vec<HistoricalRecord>, DataError> {
        self.history(DataKind::Index, req)
    }

    fn history(
        &mut self,
        kind: DataKind,
        req: &HistoryRequest,
    ) -> Result<Vec<HistoricalRecord>, DataError> {
        validate_symbol(&req.symbol)?;
        if req.start > req.end {
            return Err(DataError::InvalidInput(format!(
                "start {} is after end {}",
                req.start, req.end
            )));
        }

        // Partitions hold the default (forward-adjusted) stock series only.
        let cacheable = kind == DataKind::Index || req.adjust == Adjust::Qfq;
        let key = PartitionKey::new(kind, req.symbol.as_str(), req.period);

        if cacheable {
            if let Some(rows) = self.store.load(&key, req.start, req.end) {
                if !rows.is_empty() {
                    return Ok(rows);
                }
            }
        }

        let rows = match kind {
            DataKind::Stock => self.sources.stock_history(req)?,
            DataKind::Index => self.sources.index_history(req)?,
        };
        info!(partition = %key, rows = rows.len(), "fetched history");

        if cacheable {
            if let Err(e) = self.store.save(&rows, &key) {
                warn!(partition = %key, error = %e, "failed to persist history");
            }
        }
        Ok(rows)
    }

    // ── Capital flow ─────────────────────────────────────────────────

    /// Industry boards with the largest main-force net inflow today.
    /// Always fetched live.
    pub fn sector_flow(&mut self, limit: usize) -> Result<Vec<SectorFlow>, DataError> {
        let mut sectors = self.sources.sector_flow()?;
        sectors.truncate(limit);
        Ok(sectors)
    }

    /// Northbound (Stock Connect) trading on the most recent session.
    pub fn north_flow(&mut self) -> Result<NorthFlow, DataError> {
        self.sources
            .north_flow()?
            .pop()
            .ok_or_else(|| DataError::ResponseFormatChanged("north flow: no trading days".into()))
    }

    // ── Cache management ─────────────────────────────────────────────

    pub fn cache_stats(&self) -> CacheStats {
        let stats = self.store.stats();
        CacheStats {
            memory_key_count: self.memory.len(),
            cache_directory: self.store.cache_dir().display().to_string(),
            total_files: stats.file_count,
            total_size_kb: (stats.total_bytes as f64 / 1024.0 * 100.0).round() / 100.0,
            files: stats.files,
        }
    }

    /// Clear the tiers selected by `scope`. A symbol narrows the local clear
    /// to that symbol's partitions; the memory tier is always cleared whole.
    pub fn clear_cache(
        &mut self,
        scope: ClearScope,
        symbol: Option<&str>,
    ) -> Result<ClearReport, DataError> {
        let symbol = match symbol {
            Some(raw) => {
                let code = normalize_symbol(raw);
                validate_symbol(&code)?;
                Some(code)
            }
            None => None,
        };

        let mut report = ClearReport {
            symbol: symbol.clone(),
            ..ClearReport::default()
        };
        if scope.clears_memory() {
            self.memory.clear();
            report.memory_cleared = Some(true);
        }
        if scope.clears_local() {
            report.local_files_deleted = Some(self.store.clear(symbol.as_deref())?);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::health::HealthTracker;
    use crate::data::provider::{FundFlowProvider, QuoteProvider, Source};
    use chrono::NaiveDate;
    use crate::data::rate_limit::RateLimiter;
    use std::env;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_cache_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir =
            env::temp_dir().join(format!("marketfeed_market_test_{}_{id}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn quote(code: &str, name: &str, change_percent: f64) -> Quote {
        Quote {
            code: code.into(),
            name: name.into(),
            price: 10.0,
            change: 0.0,
            change_percent,
            open: 10.0,
            high: 10.0,
            low: 10.0,
            prev_close: 10.0,
            volume: 100,
            amount: 1000.0,
            turnover: 0.1,
            pe_ratio: None,
            pb_ratio: None,
        }
    }

    struct FixedQuotes {
        quotes: Vec<Quote>,
        calls: Arc<AtomicUsize>,
    }

    impl Source for FixedQuotes {
        fn name(&self) -> &str {
            "fixed"
        }
    }

    impl QuoteProvider for FixedQuotes {
        fn fetch_quotes(&self) -> Result<Vec<Quote>, DataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.quotes.clone())
        }
    }

    fn market(dir: &Path) -> (MarketData, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut sources =
            SourceManager::new(RateLimiter::new(Duration::ZERO), HealthTracker::default());
        sources.add_quote_source(Box::new(FixedQuotes {
            quotes: vec![
                quote("600000", "浦发银行", 2.5),
                quote("000001", "平安银行", -1.0),
                quote("300750", "宁德时代", 9.9),
                quote("600519", "贵州茅台", f64::NAN),
            ],
            calls: Arc::clone(&calls),
        }));
        let store = HistoricalStore::new(dir.to_path_buf()).unwrap();
        (MarketData::new(store, sources), calls)
    }

    #[test]
    fn quotes_are_served_from_memory_within_ttl() {
        let dir = temp_cache_dir();
        let (mut md, calls) = market(&dir);
        md.realtime_quotes().unwrap();
        md.realtime_quotes().unwrap();
        md.stock_quote("sh600000").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn zero_ttl_refetches() {
        let dir = temp_cache_dir();
        let (md, calls) = market(&dir);
        let mut md = md.with_quote_ttl(Duration::ZERO);
        md.realtime_quotes().unwrap();
        std::thread::sleep(Duration::from_millis(2));
        md.realtime_quotes().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn stock_quote_normalizes_and_reports_missing() {
        let dir = temp_cache_dir();
        let (mut md, _) = market(&dir);
        assert_eq!(md.stock_quote("000001.SZ").unwrap().name, "平安银行");
        assert!(matches!(
            md.stock_quote("688981"),
            Err(DataError::SymbolNotFound { .. })
        ));
        assert!(matches!(md.stock_quote("abc"), Err(DataError::InvalidInput(_))));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn top_movers_rank_and_skip_suspended() {
        let dir = temp_cache_dir();
        let (mut md, _) = market(&dir);
        let gainers: Vec<_> = md
            .top_movers(2, Direction::Gainers)
            .unwrap()
            .into_iter()
            .map(|q| q.code)
            .collect();
        assert_eq!(gainers, vec!["300750", "600000"]);

        let losers = md.top_movers(10, Direction::Losers).unwrap();
        assert_eq!(losers.len(), 3);
        assert_eq!(losers[0].code, "000001");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn search_matches_name_or_code() {
        let dir = temp_cache_dir();
        let (mut md, _) = market(&dir);
        assert_eq!(md.search("银行").unwrap().len(), 2);
        assert_eq!(md.search("3007").unwrap()[0].name, "宁德时代");
        assert!(md.search("  ").is_err());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn clear_cache_reports_per_scope() {
        let dir = temp_cache_dir();
        let (mut md, _) = market(&dir);
        md.realtime_quotes().unwrap();
        assert_eq!(md.cache_stats().memory_key_count, 1);

        let report = md.clear_cache(ClearScope::Memory, None).unwrap();
        assert_eq!(report.memory_cleared, Some(true));
        assert_eq!(report.local_files_deleted, None);
        assert_eq!(md.cache_stats().memory_key_count, 0);

        let report = md.clear_cache(ClearScope::Local, Some("sz000001")).unwrap();
        assert_eq!(report.memory_cleared, None);
        assert_eq!(report.local_files_deleted, Some(0));
        assert_eq!(report.symbol.as_deref(), Some("000001"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn clear_scope_parses() {
        assert_eq!("memory".parse::<ClearScope>().unwrap(), ClearScope::Memory);
        assert_eq!("ALL".parse::<ClearScope>().unwrap(), ClearScope::All);
        assert!("disk".parse::<ClearScope>().is_err());
        assert_eq!(ClearScope::default(), ClearScope::Memory);
    }

    struct FixedFlow;

    impl Source for FixedFlow {
        fn name(&self) -> &str {
            "fixed"
        }
    }

    impl FundFlowProvider for FixedFlow {
        fn fetch_sector_flow(&self) -> Result<Vec<SectorFlow>, DataError> {
            Ok(["半导体", "证券", "煤炭行业"]
                .iter()
                .zip([3.0e9, 1.0e9, -2.0e8])
                .map(|(name, inflow)| SectorFlow {
                    name: name.to_string(),
                    change_percent: 1.0,
                    main_net_inflow: inflow,
                    main_net_inflow_percent: 2.0,
                })
                .collect())
        }

        fn fetch_north_flow(&self) -> Result<Vec<NorthFlow>, DataError> {
            Ok((15..=16)
                .map(|day| NorthFlow {
                    date: NaiveDate::from_ymd_opt(2024, 8, day).unwrap(),
                    net_inflow: day as f64,
                    buy_amount: 0.0,
                    sell_amount: 0.0,
                    accumulated: 0.0,
                })
                .collect())
        }
    }

    #[test]
    fn flows_come_from_flow_sources() {
        let dir = temp_cache_dir();
        let (mut md, _) = market(&dir);
        assert!(matches!(
            md.sector_flow(5),
            Err(DataError::AllSourcesFailed { .. })
        ));

        md.sources.add_flow_source(Box::new(FixedFlow));
        let sectors = md.sector_flow(2).unwrap();
        assert_eq!(sectors.len(), 2);
        assert_eq!(sectors[0].name, "半导体");

        let latest = md.north_flow().unwrap();
        assert_eq!(latest.date, NaiveDate::from_ymd_opt(2024, 8, 16).unwrap());
        assert_eq!(md.cache_stats().memory_key_count, 0);
        let _ = fs::remove_dir_all(&dir);
    }
}
