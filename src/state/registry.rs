//! Connection registry: identity to live handles.
//!
//! An identity may hold several handles at once (one per device or tab).
//! The registry only tracks who is connected; room membership lives in
//! [`RoomBroadcaster`](super::RoomBroadcaster).

use crate::metrics;
use dashmap::DashMap;
use parley_proto::{ConnectionId, Identity, ServerEvent};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// A frame queued for one handle.
pub type Frame = Arc<ServerEvent>;

/// Outbound queue of one handle.
pub type Outbound = mpsc::Sender<Frame>;

/// One live connection.
#[derive(Debug, Clone)]
pub struct Handle {
    pub id: ConnectionId,
    pub identity: Identity,
    pub tx: Outbound,
}

/// Outcome of [`ConnectionRegistry::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Whether this is the identity's only live handle.
    pub first: bool,
}

/// Outcome of [`ConnectionRegistry::remove`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub identity: Identity,
    /// Whether the identity has no live handles left.
    pub last: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmitError {
    #[error("too many connections for {identity} (limit {limit})")]
    TooManyConnections { identity: Identity, limit: usize },
    #[error("connection {0} already admitted")]
    Duplicate(ConnectionId),
}

/// Registry of live handles, safe under concurrent admit/remove.
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    handles: DashMap<ConnectionId, Handle>,
    by_identity: DashMap<Identity, HashSet<ConnectionId>>,
    max_per_identity: usize,
}

impl ConnectionRegistry {
    pub fn new(max_per_identity: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            handles: DashMap::new(),
            by_identity: DashMap::new(),
            max_per_identity,
        }
    }

    /// Allocate a fresh connection id.
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register `id` under `identity`.
    pub fn admit(
        &self,
        id: ConnectionId,
        identity: &str,
        tx: Outbound,
    ) -> Result<Admission, AdmitError> {
        if self.handles.contains_key(&id) {
            return Err(AdmitError::Duplicate(id));
        }

        let first = {
            let mut set = self.by_identity.entry(identity.to_string()).or_default();
            if set.len() >= self.max_per_identity {
                return Err(AdmitError::TooManyConnections {
                    identity: identity.to_string(),
                    limit: self.max_per_identity,
                });
            }
            set.insert(id);
            set.len() == 1
        };

        self.handles.insert(
            id,
            Handle {
                id,
                identity: identity.to_string(),
                tx,
            },
        );
        self.update_gauges();
        Ok(Admission { first })
    }

    /// Unregister one handle. Returns `None` if it was not registered.
    pub fn remove(&self, id: ConnectionId) -> Option<Removal> {
        let (_, handle) = self.handles.remove(&id)?;

        if let Some(mut set) = self.by_identity.get_mut(&handle.identity) {
            set.remove(&id);
        }
        let last = self
            .by_identity
            .remove_if(&handle.identity, |_, set| set.is_empty())
            .is_some()
            || !self.by_identity.contains_key(&handle.identity);

        self.update_gauges();
        Some(Removal {
            identity: handle.identity,
            last,
        })
    }

    pub fn get(&self, id: ConnectionId) -> Option<Handle> {
        self.handles.get(&id).map(|h| h.value().clone())
    }

    /// Live handles of `identity`.
    pub fn handles_of(&self, identity: &str) -> Vec<Handle> {
        let ids: Vec<ConnectionId> = self
            .by_identity
            .get(identity)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        ids.into_iter().filter_map(|id| self.get(id)).collect()
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.by_identity
            .get(identity)
            .is_some_and(|set| !set.is_empty())
    }

    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    pub fn online_count(&self) -> usize {
        self.by_identity.len()
    }

    /// Queue a frame for one handle. Returns whether it was queued.
    pub fn send_to(&self, id: ConnectionId, event: impl Into<Frame>) -> bool {
        match self.handles.get(&id).map(|h| h.tx.clone()) {
            Some(tx) => try_deliver(&tx, id, event.into()),
            None => false,
        }
    }

    /// Queue a frame for every handle of `identity`. Returns the number queued.
    pub fn send_to_identity(&self, identity: &str, event: ServerEvent) -> usize {
        let frame: Frame = Arc::new(event);
        self.handles_of(identity)
            .iter()
            .filter(|h| try_deliver(&h.tx, h.id, frame.clone()))
            .count()
    }

    /// Remove every handle, returning what was removed.
    pub fn drain(&self) -> Vec<Handle> {
        let ids: Vec<ConnectionId> = self.handles.iter().map(|h| *h.key()).collect();
        let drained = ids
            .into_iter()
            .filter_map(|id| self.handles.remove(&id).map(|(_, h)| h))
            .collect();
        self.by_identity.clear();
        self.update_gauges();
        drained
    }

    fn update_gauges(&self) {
        metrics::set_gauge(&metrics::CONNECTED_HANDLES, self.handles.len());
        metrics::set_gauge(&metrics::ONLINE_IDENTITIES, self.by_identity.len());
    }
}

/// Non-blocking send. A full or closed queue drops the frame for that
/// handle only.
pub(crate) fn try_deliver(tx: &Outbound, id: ConnectionId, frame: Frame) -> bool {
    match tx.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(frame)) => {
            metrics::inc(&metrics::FRAMES_DROPPED);
            warn!(conn = %id, event = frame.name(), "Outbound queue full, frame dropped");
            false
        }
        Err(TrySendError::Closed(frame)) => {
            metrics::inc(&metrics::FRAMES_DROPPED);
            debug!(conn = %id, event = frame.name(), "Outbound queue closed, frame dropped");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (Outbound, mpsc::Receiver<Frame>) {
        mpsc::channel(4)
    }

    #[test]
    fn multi_device_admit_and_remove() {
        let registry = ConnectionRegistry::new(8);
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();
        let a = registry.next_id();
        let b = registry.next_id();

        assert_eq!(registry.admit(a, "alice", tx1), Ok(Admission { first: true }));
        assert_eq!(registry.admit(b, "alice", tx2), Ok(Admission { first: false }));
        assert_eq!(registry.handles_of("alice").len(), 2);
        assert_eq!(registry.online_count(), 1);

        let removal = registry.remove(a).unwrap();
        assert!(!removal.last);
        assert!(registry.is_online("alice"));

        let removal = registry.remove(b).unwrap();
        assert!(removal.last);
        assert!(!registry.is_online("alice"));
        assert!(registry.remove(b).is_none());
    }

    #[test]
    fn per_identity_cap() {
        let registry = ConnectionRegistry::new(1);
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();
        let a = registry.next_id();
        registry.admit(a, "alice", tx1).unwrap();

        let err = registry.admit(registry.next_id(), "alice", tx2).unwrap_err();
        assert!(matches!(err, AdmitError::TooManyConnections { limit: 1, .. }));
        assert_eq!(registry.handle_count(), 1);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let registry = ConnectionRegistry::new(4);
        let (tx, _rx) = channel();
        let id = registry.next_id();
        registry.admit(id, "alice", tx.clone()).unwrap();
        assert_eq!(registry.admit(id, "bob", tx), Err(AdmitError::Duplicate(id)));
    }

    #[tokio::test]
    async fn send_to_identity_reaches_every_handle() {
        let registry = ConnectionRegistry::new(8);
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        registry.admit(registry.next_id(), "alice", tx1).unwrap();
        registry.admit(registry.next_id(), "alice", tx2).unwrap();

        assert_eq!(registry.send_to_identity("alice", ServerEvent::Pong), 2);
        assert_eq!(*rx1.recv().await.unwrap(), ServerEvent::Pong);
        assert_eq!(*rx2.recv().await.unwrap(), ServerEvent::Pong);
        assert_eq!(registry.send_to_identity("nobody", ServerEvent::Pong), 0);
    }

    #[test]
    fn full_queue_drops_without_error() {
        let registry = ConnectionRegistry::new(8);
        let (tx, _rx) = mpsc::channel(1);
        let id = registry.next_id();
        registry.admit(id, "alice", tx).unwrap();

        assert!(registry.send_to(id, ServerEvent::Pong));
        assert!(!registry.send_to(id, ServerEvent::Pong));
    }

    #[test]
    fn drain_empties_everything() {
        let registry = ConnectionRegistry::new(8);
        let (tx, _rx) = channel();
        registry.admit(registry.next_id(), "alice", tx.clone()).unwrap();
        registry.admit(registry.next_id(), "bob", tx).unwrap();

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(registry.handle_count(), 0);
        assert!(!registry.is_online("alice"));
    }
}
