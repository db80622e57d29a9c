//! Ephemeral typing indicators.
//!
//! Entries are never persisted. They expire after a timeout, and are
//! cleared when the typist sends a message or disconnects.

use dashmap::DashMap;
use parley_proto::{ConversationId, Identity};
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub struct TypingTracker {
    rooms: DashMap<ConversationId, HashMap<Identity, Instant>>,
    timeout: Duration,
}

impl TypingTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            rooms: DashMap::new(),
            timeout,
        }
    }

    /// Mark `identity` as typing. Returns true if it was not typing before.
    /// A repeated start refreshes the expiry.
    pub fn start(&self, room: ConversationId, identity: &str, now: Instant) -> bool {
        self.rooms
            .entry(room)
            .or_default()
            .insert(identity.to_string(), now)
            .is_none()
    }

    /// Clear `identity`. Returns true if it was typing.
    pub fn stop(&self, room: ConversationId, identity: &str) -> bool {
        let removed = self
            .rooms
            .get_mut(&room)
            .is_some_and(|mut typists| typists.remove(identity).is_some());
        self.rooms.remove_if(&room, |_, typists| typists.is_empty());
        removed
    }

    /// Clear `identity` everywhere. Returns the rooms it was typing in.
    pub fn clear_identity(&self, identity: &str) -> Vec<ConversationId> {
        let mut cleared = Vec::new();
        for mut entry in self.rooms.iter_mut() {
            if entry.value_mut().remove(identity).is_some() {
                cleared.push(*entry.key());
            }
        }
        self.rooms.retain(|_, typists| !typists.is_empty());
        cleared
    }

    /// Remove entries older than the timeout.
    pub fn expire(&self, now: Instant) -> Vec<(ConversationId, Identity)> {
        let mut expired = Vec::new();
        for mut entry in self.rooms.iter_mut() {
            let room = *entry.key();
            entry.value_mut().retain(|identity, since| {
                let alive = now.saturating_duration_since(*since) < self.timeout;
                if !alive {
                    expired.push((room, identity.clone()));
                }
                alive
            });
        }
        self.rooms.retain(|_, typists| !typists.is_empty());
        expired
    }

    pub fn typing_in(&self, room: ConversationId) -> Vec<Identity> {
        let mut typists: Vec<Identity> = self
            .rooms
            .get(&room)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        typists.sort();
        typists
    }

    pub fn clear(&self) {
        self.rooms.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_stop() {
        let tracker = TypingTracker::new(Duration::from_secs(8));
        let room = ConversationId::new();
        let now = Instant::now();

        assert!(tracker.start(room, "alice", now));
        assert!(!tracker.start(room, "alice", now));
        assert_eq!(tracker.typing_in(room), vec!["alice"]);
        assert!(tracker.stop(room, "alice"));
        assert!(!tracker.stop(room, "alice"));
        assert!(tracker.typing_in(room).is_empty());
    }

    #[test]
    fn expiry_respects_refresh() {
        let tracker = TypingTracker::new(Duration::from_secs(8));
        let room = ConversationId::new();
        let t0 = Instant::now();

        tracker.start(room, "alice", t0);
        tracker.start(room, "bob", t0);
        tracker.start(room, "bob", t0 + Duration::from_secs(5));

        let expired = tracker.expire(t0 + Duration::from_secs(9));
        assert_eq!(expired, vec![(room, "alice".to_string())]);
        assert_eq!(tracker.typing_in(room), vec!["bob"]);
    }

    #[test]
    fn disconnect_clears_every_room() {
        let tracker = TypingTracker::new(Duration::from_secs(8));
        let r1 = ConversationId::new();
        let r2 = ConversationId::new();
        let now = Instant::now();
        tracker.start(r1, "alice", now);
        tracker.start(r2, "alice", now);
        tracker.start(r2, "bob", now);

        let mut cleared = tracker.clear_identity("alice");
        cleared.sort();
        let mut expected = vec![r1, r2];
        expected.sort();
        assert_eq!(cleared, expected);
        assert_eq!(tracker.typing_in(r2), vec!["bob"]);
        assert!(tracker.typing_in(r1).is_empty());
    }
}
