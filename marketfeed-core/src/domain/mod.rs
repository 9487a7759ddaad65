//! Domain types for MarketFeed

pub mod flow;
pub mod quote;
pub mod record;
pub mod symbol;

pub use flow::{NorthFlow, SectorFlow};
pub use quote::Quote;
pub use record::{normalize_date, HistoricalRecord};
pub use symbol::{normalize_symbol, validate_symbol, Adjust, DataKind, Exchange, Period};
