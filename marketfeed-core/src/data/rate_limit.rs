//! Minimum-spacing rate limiter shared by every upstream call.
//!
//! One `last_request` instant per limiter; the source manager owns a single
//! limiter, so the interval applies across all sources, not per source.

use std::time::{Duration, Instant};
use tracing::debug;

/// Default spacing between consecutive upstream requests.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// How long a request issued at `now` would have to wait.
    pub fn time_until_ready(&self, now: Instant) -> Duration {
        match self.last_request {
            None => Duration::ZERO,
            Some(last) => self
                .min_interval
                .saturating_sub(now.saturating_duration_since(last)),
        }
    }

    /// Block until the interval since the previous request has elapsed, then
    /// stamp the current instant as the new last request.
    pub fn wait(&mut self) {
        let delay = self.time_until_ready(Instant::now());
        if !delay.is_zero() {
            debug!(?delay, "rate limiter sleeping");
            std::thread::sleep(delay);
        }
        self.last_request = Some(Instant::now());
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}
