//! Data acquisition: provider adapters, failover, and the two cache tiers.

pub mod csindex;
pub mod eastmoney;
pub mod health;
pub mod http;
pub mod memory;
pub mod normalize;
pub mod provider;
pub mod rate_limit;
pub mod sina;
pub mod sources;
pub mod store;
pub mod tencent;

pub use health::HealthTracker;
pub use memory::MemoryCache;
pub use provider::{
    DataError, FundFlowProvider, HistoryProvider, HistoryRequest, QuoteProvider, RequestKind,
    Source,
};
pub use rate_limit::RateLimiter;
pub use sources::SourceManager;
pub use store::{FileStat, HistoricalStore, PartitionKey, StoreStats};
