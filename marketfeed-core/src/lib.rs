//! marketfeed core: A-share market data acquisition.
//!
//! - Domain types (canonical history rows, realtime quotes, symbols)
//! - Provider adapters for Eastmoney, Sina, Tencent and CSIndex
//! - Sector and northbound capital flow
//! - Ranked failover with a shared rate limiter and per-source health
//! - Memory TTL cache for quotes and a Parquet store for history
//! - `MarketData`, the read-through entry point over all of the above

pub mod config;
pub mod data;
pub mod domain;
pub mod market;

pub use config::MarketFeedConfig;
pub use data::DataError;
pub use market::{ClearScope, Direction, MarketData};
