//! Per-source health tracking.
//!
//! Each source carries a consecutive-failure counter. Once it reaches the
//! threshold (default 3) the source is skipped. There is no cooldown timer:
//! counters only come back down on a success or on [`HealthTracker::reset_all`],
//! which the source manager calls after a resolution exhausts every source.

use std::collections::HashMap;

/// Default number of consecutive failures before a source is skipped.
pub const DEFAULT_MAX_FAILURES: u32 = 3;

/// Consecutive-failure counters keyed by source name.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    failures: HashMap<String, u32>,
    max_failures: u32,
}

impl HealthTracker {
    pub fn new(max_failures: u32) -> Self {
        Self {
            failures: HashMap::new(),
            max_failures,
        }
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    /// Whether the source may be tried. Unknown sources are healthy.
    pub fn is_healthy(&self, source: &str) -> bool {
        self.failure_count(source) < self.max_failures
    }

    /// Current consecutive-failure count (0 for unknown sources).
    pub fn failure_count(&self, source: &str) -> u32 {
        self.failures.get(source).copied().unwrap_or(0)
    }

    /// Record a successful request: resets the source's counter.
    pub fn record_success(&mut self, source: &str) {
        self.failures.insert(source.to_string(), 0);
    }

    /// Record a failure and return the new count.
    pub fn record_failure(&mut self, source: &str) -> u32 {
        let count = self.failures.entry(source.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Forget every counter.
    pub fn reset_all(&mut self) {
        self.failures.clear();
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FAILURES)
    }
}
