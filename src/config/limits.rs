//! Queue, payload and ephemeral-state limits.

use serde::Deserialize;

/// Limits configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Outbound frame queue per connection handle (default: 256).
    /// A full queue drops frames for that handle only.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
    /// Live handles allowed per identity (default: 8).
    #[serde(default = "default_max_connections_per_identity")]
    pub max_connections_per_identity: usize,
    /// Maximum message text length in characters (default: 4000).
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
    /// Seconds before a typing indicator expires (default: 8).
    #[serde(default = "default_typing_timeout_secs")]
    pub typing_timeout_secs: u64,
    /// Seconds before an unanswered call invitation resets to idle (default: 60).
    #[serde(default = "default_call_invite_ttl_secs")]
    pub call_invite_ttl_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            outbound_queue: default_outbound_queue(),
            max_connections_per_identity: default_max_connections_per_identity(),
            max_message_len: default_max_message_len(),
            typing_timeout_secs: default_typing_timeout_secs(),
            call_invite_ttl_secs: default_call_invite_ttl_secs(),
        }
    }
}

fn default_outbound_queue() -> usize {
    256
}

fn default_max_connections_per_identity() -> usize {
    8
}

fn default_max_message_len() -> usize {
    4000
}

fn default_typing_timeout_secs() -> u64 {
    8
}

fn default_call_invite_ttl_secs() -> u64 {
    60
}
