//! Per-conversation call state.
//!
//! The relay never consults this state before forwarding a signal; it is
//! bookkeeping for expiry and diagnostics. Idle conversations have no entry.

use dashmap::DashMap;
use parley_proto::{ConversationId, Identity};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Invited { caller: Identity, since: Instant },
}

pub struct CallTracker {
    calls: DashMap<ConversationId, CallState>,
    invite_ttl: Duration,
}

impl CallTracker {
    pub fn new(invite_ttl: Duration) -> Self {
        Self {
            calls: DashMap::new(),
            invite_ttl,
        }
    }

    pub fn state(&self, room: ConversationId) -> CallState {
        self.calls
            .get(&room)
            .map(|s| s.value().clone())
            .unwrap_or(CallState::Idle)
    }

    /// Enter `invited`. Returns the previous state.
    pub fn invite(&self, room: ConversationId, caller: &str, now: Instant) -> CallState {
        self.calls
            .insert(
                room,
                CallState::Invited {
                    caller: caller.to_string(),
                    since: now,
                },
            )
            .unwrap_or(CallState::Idle)
    }

    /// Terminal transition (accept, reject, cancel). Returns the previous
    /// state; the conversation is idle afterwards.
    pub fn resolve(&self, room: ConversationId) -> CallState {
        self.calls
            .remove(&room)
            .map(|(_, state)| state)
            .unwrap_or(CallState::Idle)
    }

    /// Reset invitations older than the TTL. Returns the affected rooms.
    pub fn expire(&self, now: Instant) -> Vec<ConversationId> {
        let mut expired = Vec::new();
        self.calls.retain(|room, state| match state {
            CallState::Invited { since, .. }
                if now.saturating_duration_since(*since) >= self.invite_ttl =>
            {
                expired.push(*room);
                false
            }
            _ => true,
        });
        expired
    }

    pub fn clear(&self) {
        self.calls.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_then_resolve_returns_to_idle() {
        let tracker = CallTracker::new(Duration::from_secs(60));
        let room = ConversationId::new();
        let now = Instant::now();

        assert_eq!(tracker.invite(room, "alice", now), CallState::Idle);
        assert!(matches!(tracker.state(room), CallState::Invited { ref caller, .. } if caller == "alice"));
        assert!(matches!(tracker.resolve(room), CallState::Invited { .. }));
        assert_eq!(tracker.state(room), CallState::Idle);
        assert_eq!(tracker.resolve(room), CallState::Idle);
    }

    #[test]
    fn stale_invites_expire() {
        let tracker = CallTracker::new(Duration::from_secs(60));
        let old = ConversationId::new();
        let fresh = ConversationId::new();
        let t0 = Instant::now();
        tracker.invite(old, "alice", t0);
        tracker.invite(fresh, "bob", t0 + Duration::from_secs(30));

        assert_eq!(tracker.expire(t0 + Duration::from_secs(61)), vec![old]);
        assert_eq!(tracker.state(old), CallState::Idle);
        assert!(matches!(tracker.state(fresh), CallState::Invited { .. }));
    }
}
