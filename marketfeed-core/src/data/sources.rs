//! Ranked, health-tracked, rate-limited failover across providers.
//!
//! For each request kind the manager holds an ordered candidate list. A
//! resolution walks the list, skipping unhealthy sources and waiting on the
//! shared rate limiter before every upstream call. The first non-empty
//! result wins. If every candidate fails, all health counters are reset so
//! that one bad stretch does not lock sources out of later requests.

use super::health::HealthTracker;
use super::provider::{
    DataError, FundFlowProvider, HistoryProvider, HistoryRequest, QuoteProvider, RequestKind,
    Source,
};
use super::rate_limit::RateLimiter;
use crate::domain::{HistoricalRecord, NorthFlow, Quote, SectorFlow};
use tracing::{debug, info, warn};

/// Owns the providers plus the rate-limit and health state they share.
pub struct SourceManager {
    quote_sources: Vec<Box<dyn QuoteProvider>>,
    stock_sources: Vec<Box<dyn HistoryProvider>>,
    index_sources: Vec<Box<dyn HistoryProvider>>,
    flow_sources: Vec<Box<dyn FundFlowProvider>>,
    limiter: RateLimiter,
    health: HealthTracker,
}

impl SourceManager {
    pub fn new(limiter: RateLimiter, health: HealthTracker) -> Self {
        Self {
            quote_sources: Vec::new(),
            stock_sources: Vec::new(),
            index_sources: Vec::new(),
            flow_sources: Vec::new(),
            limiter,
            health,
        }
    }

    /// Append a realtime-quote candidate (lowest priority so far).
    pub fn add_quote_source(&mut self, source: Box<dyn QuoteProvider>) -> &mut Self {
        self.quote_sources.push(source);
        self
    }

    pub fn add_stock_source(&mut self, source: Box<dyn HistoryProvider>) -> &mut Self {
        self.stock_sources.push(source);
        self
    }

    pub fn add_index_source(&mut self, source: Box<dyn HistoryProvider>) -> &mut Self {
        self.index_sources.push(source);
        self
    }

    /// Sector and northbound flow share one candidate list.
    pub fn add_flow_source(&mut self, source: Box<dyn FundFlowProvider>) -> &mut Self {
        self.flow_sources.push(source);
        self
    }

    /// Candidate names for `kind`, in priority order.
    pub fn source_names(&self, kind: RequestKind) -> Vec<&str> {
        match kind {
            RequestKind::RealtimeQuotes => self.quote_sources.iter().map(|s| s.name()).collect(),
            RequestKind::StockHistory => self.stock_sources.iter().map(|s| s.name()).collect(),
            RequestKind::IndexHistory => self.index_sources.iter().map(|s| s.name()).collect(),
            RequestKind::SectorFlow | RequestKind::NorthFlow => {
                self.flow_sources.iter().map(|s| s.name()).collect()
            }
        }
    }

    pub fn failure_count(&self, source: &str) -> u32 {
        self.health.failure_count(source)
    }

    pub fn is_healthy(&self, source: &str) -> bool {
        self.health.is_healthy(source)
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub fn realtime_quotes(&mut self) -> Result<Vec<Quote>, DataError> {
        resolve(
            RequestKind::RealtimeQuotes,
            self.quote_sources.as_slice(),
            &mut self.limiter,
            &mut self.health,
            |source| source.fetch_quotes(),
        )
    }

    pub fn stock_history(
        &mut self,
        req: &HistoryRequest,
    ) -> Result<Vec<HistoricalRecord>, DataError> {
        resolve(
            RequestKind::StockHistory,
            self.stock_sources.as_slice(),
            &mut self.limiter,
            &mut self.health,
            |source| source.fetch_history(req),
        )
    }

    pub fn index_history(
        &mut self,
        req: &HistoryRequest,
    ) -> Result<Vec<HistoricalRecord>, DataError> {
        resolve(
            RequestKind::IndexHistory,
            self.index_sources.as_slice(),
            &mut self.limiter,
            &mut self.health,
            |source| source.fetch_history(req),
        )
    }

    pub fn sector_flow(&mut self) -> Result<Vec<SectorFlow>, DataError> {
        resolve(
            RequestKind::SectorFlow,
            self.flow_sources.as_slice(),
            &mut self.limiter,
            &mut self.health,
            |source| source.fetch_sector_flow(),
        )
    }

    pub fn north_flow(&mut self) -> Result<Vec<NorthFlow>, DataError> {
        resolve(
            RequestKind::NorthFlow,
            self.flow_sources.as_slice(),
            &mut self.limiter,
            &mut self.health,
            |source| source.fetch_north_flow(),
        )
    }
}

/// Walk `sources` in order until one returns a non-empty result.
fn resolve<P, T, F>(
    kind: RequestKind,
    sources: &[Box<P>],
    limiter: &mut RateLimiter,
    health: &mut HealthTracker,
    mut fetch: F,
) -> Result<Vec<T>, DataError>
where
    P: Source + ?Sized,
    F: FnMut(&P) -> Result<Vec<T>, DataError>,
{
    let mut last_error: Option<DataError> = None;

    for source in sources {
        let name = source.name();
        if !health.is_healthy(name) {
            debug!(%kind, source = name, "skipping unhealthy source");
            continue;
        }

        limiter.wait();
        let outcome = fetch(source.as_ref()).and_then(|rows| {
            if rows.is_empty() {
                Err(DataError::EmptyResult {
                    source_name: name.to_string(),
                })
            } else {
                Ok(rows)
            }
        });

        match outcome {
            Ok(rows) => {
                health.record_success(name);
                info!(%kind, source = name, rows = rows.len(), "source succeeded");
                return Ok(rows);
            }
            Err(e) => {
                let failures = health.record_failure(name);
                warn!(%kind, source = name, failures, error = %e, "source failed");
                last_error = Some(e);
            }
        }
    }

    health.reset_all();
    let last_error = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no healthy source available".to_string());
    warn!(%kind, %last_error, "all sources exhausted; health counters reset");
    Err(DataError::AllSourcesFailed { kind, last_error })
}
