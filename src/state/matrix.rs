//! The Matrix - central shared state for parley.
//!
//! One Matrix is constructed per process and handed to every component as
//! an `Arc<Matrix>`. It owns the live-connection state and a handle to the
//! persistent store; nothing in here is reachable through a global.

use super::{CallTracker, ConnectionRegistry, Outbound, RoomBroadcaster, TypingTracker};
use crate::config::{Config, LimitsConfig};
use crate::db::Store;
use crate::security::RateLimitManager;
use dashmap::DashMap;
use parley_proto::{ConnectionId, ConversationId, Identity, ServerEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};

/// The Matrix - central shared state container.
pub struct Matrix {
    /// This server's name, reported in logs.
    pub server_name: String,

    /// Authoritative conversation, message and presence records.
    pub store: Arc<dyn Store>,

    /// Identity to live handles.
    pub connections: ConnectionRegistry,

    /// Conversation to subscribed handles.
    pub rooms: RoomBroadcaster,

    /// Who is typing where.
    pub typing: TypingTracker,

    /// Call state per conversation.
    pub calls: CallTracker,

    /// Per-connection inbound event limiter.
    pub rate_limiter: RateLimitManager,

    pub limits: LimitsConfig,

    /// Serializes presence writes per identity.
    pub(super) presence_gates: DashMap<Identity, Arc<Mutex<()>>>,

    shutdown: watch::Sender<bool>,
}

impl Matrix {
    pub fn new(config: &Config, store: Arc<dyn Store>) -> Self {
        let limits = config.limits.clone();
        let (shutdown, _) = watch::channel(false);
        Self {
            server_name: config.server.name.clone(),
            store,
            connections: ConnectionRegistry::new(limits.max_connections_per_identity),
            rooms: RoomBroadcaster::new(),
            typing: TypingTracker::new(Duration::from_secs(limits.typing_timeout_secs)),
            calls: CallTracker::new(Duration::from_secs(limits.call_invite_ttl_secs)),
            rate_limiter: RateLimitManager::new(&config.rate_limits),
            limits,
            presence_gates: DashMap::new(),
            shutdown,
        }
    }

    /// Deliver `event` to a conversation's room.
    pub fn broadcast(
        &self,
        room: ConversationId,
        event: ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> usize {
        self.rooms.broadcast(room, event, exclude)
    }

    /// Queue a private frame for one handle.
    pub fn send_to(&self, conn: ConnectionId, event: ServerEvent) -> bool {
        self.connections.send_to(conn, event)
    }

    /// Join one handle to a room. Returns false if the handle is gone.
    pub fn join_room(&self, room: ConversationId, conn: ConnectionId) -> bool {
        match self.connections.get(conn) {
            Some(handle) => {
                self.rooms.join(room, conn, handle.tx);
                true
            }
            None => false,
        }
    }

    /// Join every live handle of `identity` to a room.
    pub fn join_identity(&self, room: ConversationId, identity: &str) -> usize {
        self.connections
            .handles_of(identity)
            .into_iter()
            .filter(|handle| self.rooms.join(room, handle.id, handle.tx.clone()))
            .count()
    }

    /// Remove every live handle of `identity` from a room.
    pub fn leave_identity(&self, room: ConversationId, identity: &str) -> Vec<ConnectionId> {
        self.connections
            .handles_of(identity)
            .into_iter()
            .filter(|handle| self.rooms.leave(room, handle.id))
            .map(|handle| handle.id)
            .collect()
    }

    /// Receiver that flips to `true` when the server shuts down.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub(super) fn signal_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// A bounded outbound queue for a new handle.
    pub fn outbound_channel(&self) -> (Outbound, tokio::sync::mpsc::Receiver<super::Frame>) {
        tokio::sync::mpsc::channel(self.limits.outbound_queue)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::matrix;
    use parley_proto::ServerEvent;

    #[test]
    fn join_and_leave_identity_cover_every_handle() {
        let (matrix, _) = matrix();
        let (tx1, mut rx1) = matrix.outbound_channel();
        let (tx2, mut rx2) = matrix.outbound_channel();
        let a = matrix.connections.next_id();
        let b = matrix.connections.next_id();
        matrix.connections.admit(a, "alice", tx1).unwrap();
        matrix.connections.admit(b, "alice", tx2).unwrap();

        let room = parley_proto::ConversationId::new();
        assert_eq!(matrix.join_identity(room, "alice"), 2);
        assert_eq!(matrix.broadcast(room, ServerEvent::Pong, Some(a)), 1);
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());

        let mut left = matrix.leave_identity(room, "alice");
        left.sort();
        assert_eq!(left, vec![a, b]);
        assert_eq!(matrix.broadcast(room, ServerEvent::Pong, None), 0);
    }

    #[test]
    fn join_room_requires_live_handle() {
        let (matrix, _) = matrix();
        let room = parley_proto::ConversationId::new();
        assert!(!matrix.join_room(room, parley_proto::ConnectionId(99)));
    }

    #[test]
    fn shutdown_signal_flips_once() {
        let (matrix, _) = matrix();
        let rx = matrix.shutdown_signal();
        assert!(!*rx.borrow());
        matrix.signal_shutdown();
        assert!(*rx.borrow());
        assert!(matrix.is_shutting_down());
    }
}
