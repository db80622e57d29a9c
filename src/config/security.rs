//! Token verification and inbound rate limit configuration.

use serde::Deserialize;

/// Token verification configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// HMAC-SHA256 key shared with the token issuer. Must be non-empty.
    #[serde(default)]
    pub secret: String,
    /// Seconds of grace applied to token expiry (default: 30).
    #[serde(default = "default_max_clock_skew_secs")]
    pub max_clock_skew_secs: u64,
}

fn default_max_clock_skew_secs() -> u64 {
    30
}

/// Per-connection rate limiting on inbound events.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained events per second per connection (default: 20).
    #[serde(default = "default_events_per_second")]
    pub events_per_second: u32,
    /// Burst allowance per connection (default: 40).
    #[serde(default = "default_event_burst")]
    pub event_burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            events_per_second: default_events_per_second(),
            event_burst: default_event_burst(),
        }
    }
}

fn default_events_per_second() -> u32 {
    20
}

fn default_event_burst() -> u32 {
    40
}
