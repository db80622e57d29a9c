//! Rate limiting for flood protection.
//!
//! Uses the `governor` crate's token bucket algorithm. Each connection gets
//! its own bucket for inbound events, created lazily on first use and
//! dropped on disconnect.

use crate::config::RateLimitConfig;
use dashmap::DashMap;
use governor::{Quota, RateLimiter as GovRateLimiter};
use parley_proto::ConnectionId;
use std::num::NonZeroU32;
use tracing::debug;

type DirectRateLimiter = governor::DefaultDirectRateLimiter;

/// Thread-safe rate limit manager using governor.
#[derive(Debug)]
pub struct RateLimitManager {
    event_limiters: DashMap<ConnectionId, DirectRateLimiter>,
    quota: Quota,
}

impl RateLimitManager {
    /// Create a new rate limit manager with the given configuration.
    pub fn new(config: &RateLimitConfig) -> Self {
        let rate = NonZeroU32::new(config.events_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.event_burst).unwrap_or(rate);
        Self {
            event_limiters: DashMap::new(),
            quota: Quota::per_second(rate).allow_burst(burst),
        }
    }

    /// Check if a connection may submit another event.
    ///
    /// Returns `true` if allowed, `false` if rate limited.
    pub fn check_event_rate(&self, conn: ConnectionId) -> bool {
        let limiter = self
            .event_limiters
            .entry(conn)
            .or_insert_with(|| GovRateLimiter::direct(self.quota));

        let allowed = limiter.check().is_ok();
        if !allowed {
            debug!(conn = %conn, "event rate limit exceeded");
        }
        allowed
    }

    /// Forget a connection (on disconnect).
    pub fn remove_connection(&self, conn: ConnectionId) {
        self.event_limiters.remove(&conn);
    }

    pub fn tracked(&self) -> usize {
        self.event_limiters.len()
    }
}

impl Default for RateLimitManager {
    fn default() -> Self {
        Self::new(&RateLimitConfig::default())
    }
}
