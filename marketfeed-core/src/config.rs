//! Runtime configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) yields a working
//! setup. Source lists name adapters in priority order.

use crate::data::csindex::CsindexHistory;
use crate::data::eastmoney::{
    EastmoneyBoardQuotes, EastmoneyFundFlow, EastmoneyHistory, EastmoneyQuotes,
};
use crate::data::health::{HealthTracker, DEFAULT_MAX_FAILURES};
use crate::data::http::build_client;
use crate::data::provider::{DataError, FundFlowProvider, HistoryProvider, QuoteProvider};
use crate::data::rate_limit::RateLimiter;
use crate::data::sina::SinaQuotes;
use crate::data::sources::SourceManager;
use crate::data::store::{HistoricalStore, DEFAULT_STALENESS_DAYS};
use crate::data::tencent::TencentHistory;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CACHE_DIR_NAME: &str = ".marketfeed_cache";

pub const QUOTE_SOURCES: [&str; 3] = [
    EastmoneyQuotes::NAME,
    SinaQuotes::NAME,
    EastmoneyBoardQuotes::NAME,
];
pub const STOCK_HISTORY_SOURCES: [&str; 2] = [EastmoneyHistory::NAME, TencentHistory::NAME];
pub const INDEX_HISTORY_SOURCES: [&str; 2] = [EastmoneyHistory::NAME, CsindexHistory::NAME];
pub const FUND_FLOW_SOURCES: [&str; 1] = [EastmoneyFundFlow::NAME];

/// `~/.marketfeed_cache`, or `./.marketfeed_cache` without a home directory.
pub fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CACHE_DIR_NAME)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketFeedConfig {
    pub cache_dir: PathBuf,
    /// TTL of the realtime snapshot in the memory tier.
    pub quote_ttl_secs: u64,
    pub min_request_interval_ms: u64,
    /// Consecutive failures after which a source is skipped.
    pub max_failures: u32,
    /// How far the newest cached date may trail the requested end date.
    pub staleness_days: i64,
    pub http_timeout_secs: u64,
    pub sources: SourcesConfig,
}

/// Candidate adapters per request kind, highest priority first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub quotes: Vec<String>,
    pub stock_history: Vec<String>,
    pub index_history: Vec<String>,
    pub fund_flow: Vec<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        let owned = |names: &[&str]| names.iter().map(|s| s.to_string()).collect();
        Self {
            quotes: owned(&QUOTE_SOURCES),
            stock_history: owned(&STOCK_HISTORY_SOURCES),
            index_history: owned(&INDEX_HISTORY_SOURCES),
            fund_flow: owned(&FUND_FLOW_SOURCES),
        }
    }
}

impl Default for MarketFeedConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            quote_ttl_secs: 30,
            min_request_interval_ms: 1000,
            max_failures: DEFAULT_MAX_FAILURES,
            staleness_days: DEFAULT_STALENESS_DAYS,
            http_timeout_secs: 30,
            sources: SourcesConfig::default(),
        }
    }
}

impl MarketFeedConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, DataError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DataError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, DataError> {
        let config: Self =
            toml::from_str(content).map_err(|e| DataError::Config(format!("parse TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, DataError> {
        toml::to_string_pretty(self).map_err(|e| DataError::Config(format!("serialize: {e}")))
    }

    pub fn validate(&self) -> Result<(), DataError> {
        if self.max_failures == 0 {
            return Err(DataError::Config("max_failures must be at least 1".into()));
        }
        if self.staleness_days < 0 {
            return Err(DataError::Config("staleness_days must not be negative".into()));
        }
        check_names("quotes", &self.sources.quotes, &QUOTE_SOURCES)?;
        check_names("stock_history", &self.sources.stock_history, &STOCK_HISTORY_SOURCES)?;
        check_names("index_history", &self.sources.index_history, &INDEX_HISTORY_SOURCES)?;
        check_names("fund_flow", &self.sources.fund_flow, &FUND_FLOW_SOURCES)?;
        Ok(())
    }

    pub fn quote_ttl(&self) -> Duration {
        Duration::from_secs(self.quote_ttl_secs)
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(Duration::from_millis(self.min_request_interval_ms))
    }

    pub fn health_tracker(&self) -> HealthTracker {
        HealthTracker::new(self.max_failures)
    }

    pub fn historical_store(&self) -> Result<HistoricalStore, DataError> {
        Ok(HistoricalStore::new(self.cache_dir.clone())?.with_staleness_days(self.staleness_days))
    }

    /// Build the HTTP adapters named in `[sources]`, in order.
    pub fn source_manager(&self) -> Result<SourceManager, DataError> {
        self.validate()?;
        let client = build_client(Duration::from_secs(self.http_timeout_secs))?;
        let mut manager = SourceManager::new(self.rate_limiter(), self.health_tracker());
        for name in &self.sources.quotes {
            manager.add_quote_source(quote_source(name, &client)?);
        }
        for name in &self.sources.stock_history {
            manager.add_stock_source(stock_source(name, &client)?);
        }
        for name in &self.sources.index_history {
            manager.add_index_source(index_source(name, &client)?);
        }
        for name in &self.sources.fund_flow {
            manager.add_flow_source(flow_source(name, &client)?);
        }
        Ok(manager)
    }
}

fn check_names(list: &str, names: &[String], known: &[&str]) -> Result<(), DataError> {
    for name in names {
        if !known.contains(&name.as_str()) {
            return Err(DataError::Config(format!(
                "unknown source '{name}' in sources.{list} (known: {})",
                known.join(", ")
            )));
        }
    }
    Ok(())
}

fn unknown(name: &str) -> DataError {
    DataError::Config(format!("unknown source '{name}'"))
}

fn quote_source(name: &str, client: &Client) -> Result<Box<dyn QuoteProvider>, DataError> {
    Ok(match name {
        EastmoneyQuotes::NAME => Box::new(EastmoneyQuotes::new(client.clone())),
        SinaQuotes::NAME => Box::new(SinaQuotes::new(client.clone())),
        EastmoneyBoardQuotes::NAME => Box::new(EastmoneyBoardQuotes::new(client.clone())),
        other => return Err(unknown(other)),
    })
}

fn stock_source(name: &str, client: &Client) -> Result<Box<dyn HistoryProvider>, DataError> {
    Ok(match name {
        EastmoneyHistory::NAME => Box::new(EastmoneyHistory::stocks(client.clone())),
        TencentHistory::NAME => Box::new(TencentHistory::new(client.clone())),
        other => return Err(unknown(other)),
    })
}

fn index_source(name: &str, client: &Client) -> Result<Box<dyn HistoryProvider>, DataError> {
    Ok(match name {
        EastmoneyHistory::NAME => Box::new(EastmoneyHistory::indices(client.clone())),
        CsindexHistory::NAME => Box::new(CsindexHistory::new(client.clone())),
        other => return Err(unknown(other)),
    })
}

fn flow_source(name: &str, client: &Client) -> Result<Box<dyn FundFlowProvider>, DataError> {
    Ok(match name {
        EastmoneyFundFlow::NAME => Box::new(EastmoneyFundFlow::new(client.clone())),
        other => return Err(unknown(other)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::RequestKind;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = MarketFeedConfig::from_toml("").unwrap();
        assert_eq!(config, MarketFeedConfig::default());
        assert_eq!(config.quote_ttl(), Duration::from_secs(30));
        assert_eq!(config.max_failures, 3);
        assert_eq!(config.staleness_days, 2);
        assert!(config.cache_dir.ends_with(CACHE_DIR_NAME));
    }

    #[test]
    fn partial_override() {
        let config = MarketFeedConfig::from_toml(
            r#"
            cache_dir = "/tmp/mf"
            min_request_interval_ms = 250

            [sources]
            stock_history = ["tencent"]
            "#,
        )
        .unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/mf"));
        assert_eq!(config.min_request_interval_ms, 250);
        assert_eq!(config.sources.stock_history, vec!["tencent"]);
        assert_eq!(config.sources.quotes.len(), 3);
    }

    #[test]
    fn rejects_unknown_source() {
        let err =
            MarketFeedConfig::from_toml("[sources]\nindex_history = [\"tencent\"]").unwrap_err();
        assert!(matches!(err, DataError::Config(_)));
        assert!(err.to_string().contains("sources.index_history"));
    }

    #[test]
    fn quote_ttl_drives_the_memory_tier() {
        let config =
            MarketFeedConfig::from_toml("quote_ttl_secs = 5\nmemory_ttl_secs = 600").unwrap();
        assert_eq!(config.quote_ttl(), Duration::from_secs(5));
        assert!(!config.to_toml().unwrap().contains("memory_ttl"));
    }

    #[test]
    fn rejects_zero_max_failures() {
        let err = MarketFeedConfig::from_toml("max_failures = 0").unwrap_err();
        assert!(matches!(err, DataError::Config(_)));
    }

    #[test]
    fn toml_roundtrip() {
        let config = MarketFeedConfig::default();
        let parsed = MarketFeedConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn source_manager_follows_configured_order() {
        let mut config = MarketFeedConfig::default();
        config.sources.quotes = vec!["sina".into(), "eastmoney".into()];
        let manager = config.source_manager().unwrap();
        assert_eq!(
            manager.source_names(RequestKind::RealtimeQuotes),
            vec!["sina", "eastmoney"]
        );
        assert_eq!(
            manager.source_names(RequestKind::IndexHistory),
            vec!["eastmoney", "csindex"]
        );
        assert_eq!(manager.source_names(RequestKind::NorthFlow), vec!["eastmoney"]);
    }

    #[test]
    fn fund_flow_can_be_disabled() {
        let config = MarketFeedConfig::from_toml("[sources]\nfund_flow = []").unwrap();
        let manager = config.source_manager().unwrap();
        assert!(manager.source_names(RequestKind::SectorFlow).is_empty());

        let err = MarketFeedConfig::from_toml("[sources]\nfund_flow = [\"sina\"]").unwrap_err();
        assert!(err.to_string().contains("sources.fund_flow"));
    }
}
