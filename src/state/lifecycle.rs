//! Connection lifecycle: admission, disconnect, shutdown.
//!
//! Presence is debounced by handle count. Every admission announces the
//! identity online; only the removal of the identity's last handle
//! announces it offline.

use super::{AdmitError, Matrix, Outbound};
use crate::db::{DbError, PresencePatch, now_millis};
use parley_proto::{ConnectionId, ConversationId, Identity, ServerEvent};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error(transparent)]
    Registry(#[from] AdmitError),
    #[error("could not load conversations: {0}")]
    Store(#[from] DbError),
}

impl Matrix {
    /// Admit a verified identity with its outbound queue.
    ///
    /// Joins the handle to every conversation the store lists the identity
    /// in, marks the identity online, announces it to those rooms and sends
    /// `ready` to the new handle.
    pub async fn admit(
        &self,
        identity: &str,
        tx: Outbound,
    ) -> Result<ConnectionId, AdmissionError> {
        let id = self.connections.next_id();
        let admission = self.connections.admit(id, identity, tx.clone())?;

        let conversations = match self.store.list_conversations_for(identity).await {
            Ok(conversations) => conversations,
            Err(e) => {
                self.connections.remove(id);
                return Err(e.into());
            }
        };

        let rooms: Vec<ConversationId> = conversations.iter().map(|c| c.id).collect();
        for room in &rooms {
            self.rooms.join(*room, id, tx.clone());
        }

        let gate = self.presence_gate(identity);
        let _presence = gate.lock().await;
        let last_seen = now_millis();
        if let Err(e) = self
            .store
            .upsert_presence(
                identity,
                PresencePatch {
                    online: true,
                    last_seen,
                    connection: Some(id),
                },
            )
            .await
        {
            warn!(conn = %id, identity = %identity, error = %e, "Failed to record presence");
        }

        for room in &rooms {
            self.broadcast(
                *room,
                ServerEvent::UserPresence {
                    user_id: identity.to_string(),
                    online: true,
                    last_seen,
                },
                Some(id),
            );
        }

        self.send_to(
            id,
            ServerEvent::Ready {
                identity: identity.to_string(),
                connection: id,
                conversations: rooms.clone(),
            },
        );

        info!(
            conn = %id,
            identity = %identity,
            first = admission.first,
            rooms = rooms.len(),
            "Connection admitted"
        );
        Ok(id)
    }

    /// Tear down one handle.
    ///
    /// Returns the identity it belonged to, or `None` if it was already gone.
    pub async fn disconnect(&self, id: ConnectionId) -> Option<Identity> {
        let removal = self.connections.remove(id)?;
        let joined = self.rooms.leave_all(id);
        self.rate_limiter.remove_connection(id);

        for room in self.typing.clear_identity(&removal.identity) {
            self.broadcast(
                room,
                ServerEvent::TypingStop {
                    conversation_id: room,
                    user_id: removal.identity.clone(),
                },
                None,
            );
        }

        if removal.last {
            let gate = self.presence_gate(&removal.identity);
            {
                let _presence = gate.lock().await;
                // A new handle may have been admitted since the removal. Its
                // online write waits for this gate, so it always lands last.
                if !self.connections.is_online(&removal.identity) {
                    self.announce_offline(&removal.identity, joined).await;
                }
            }
            drop(gate);
            self.presence_gates
                .remove_if(&removal.identity, |_, gate| Arc::strong_count(gate) == 1);
        }

        debug!(conn = %id, identity = %removal.identity, last = removal.last, "Connection removed");
        Some(removal.identity)
    }

    fn presence_gate(&self, identity: &str) -> Arc<Mutex<()>> {
        self.presence_gates
            .entry(identity.to_string())
            .or_default()
            .clone()
    }

    async fn announce_offline(&self, identity: &str, fallback_rooms: Vec<ConversationId>) {
        let last_seen = now_millis();
        if let Err(e) = self
            .store
            .upsert_presence(
                identity,
                PresencePatch {
                    online: false,
                    last_seen,
                    connection: None,
                },
            )
            .await
        {
            warn!(identity = %identity, error = %e, "Failed to record presence");
        }

        let rooms = match self.store.list_conversations_for(identity).await {
            Ok(conversations) => conversations.into_iter().map(|c| c.id).collect(),
            Err(e) => {
                warn!(identity = %identity, error = %e, "Presence fan-out falling back to joined rooms");
                fallback_rooms
            }
        };

        for room in rooms {
            self.broadcast(
                room,
                ServerEvent::UserPresence {
                    user_id: identity.to_string(),
                    online: false,
                    last_seen,
                },
                None,
            );
        }
    }

    /// Evict every handle and mark their identities offline.
    ///
    /// Connection tasks observe the shutdown signal and close their sockets;
    /// dropping the registry's senders closes their outbound queues.
    pub async fn shutdown(&self) {
        self.signal_shutdown();

        let drained = self.connections.drain();
        self.rooms.clear();
        self.typing.clear();
        self.calls.clear();
        for handle in &drained {
            self.rate_limiter.remove_connection(handle.id);
        }

        let identities: HashSet<Identity> = drained.into_iter().map(|h| h.identity).collect();
        let last_seen = now_millis();
        for identity in &identities {
            if let Err(e) = self
                .store
                .upsert_presence(
                    identity,
                    PresencePatch {
                        online: false,
                        last_seen,
                        connection: None,
                    },
                )
                .await
            {
                warn!(identity = %identity, error = %e, "Failed to record presence on shutdown");
            }
        }
        info!(server = %self.server_name, identities = identities.len(), "Matrix shut down");
    }

    /// Expire stale typing entries and unanswered call invites.
    ///
    /// Expired typists are announced with `typing_stop`. Returns the number
    /// of typing entries removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let stale = self.typing.expire(now);
        for (room, identity) in &stale {
            self.broadcast(
                *room,
                ServerEvent::TypingStop {
                    conversation_id: *room,
                    user_id: identity.clone(),
                },
                None,
            );
        }
        for room in self.calls.expire(now) {
            debug!(conversation = %room, "Call invite expired");
        }
        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::super::matrix::test_support::matrix;
    use super::*;
    use crate::db::{NewConversation, Store};
    use crate::state::Frame;
    use parley_proto::ConversationKind;
    use tokio::sync::mpsc;

    async fn direct(store: &dyn Store, a: &str, b: &str) -> ConversationId {
        store
            .create_conversation(NewConversation {
                kind: ConversationKind::Direct,
                name: None,
                participants: vec![a.into(), b.into()],
                admins: vec![],
                created_by: a.into(),
            })
            .await
            .unwrap()
            .id
    }

    fn drain(rx: &mut mpsc::Receiver<Frame>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            events.push((*frame).clone());
        }
        events
    }

    fn presence_events(events: &[ServerEvent]) -> Vec<(String, bool)> {
        events
            .iter()
            .filter_map(|e| match e {
                ServerEvent::UserPresence { user_id, online, .. } => {
                    Some((user_id.clone(), *online))
                }
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn admit_joins_rooms_and_sends_ready() {
        let (matrix, store) = matrix();
        let room = direct(store.as_ref(), "alice", "bob").await;

        let (tx, mut rx) = matrix.outbound_channel();
        let id = matrix.admit("alice", tx).await.unwrap();

        assert!(matrix.rooms.is_member(room, id));
        let events = drain(&mut rx);
        assert!(matches!(
            events.as_slice(),
            [ServerEvent::Ready { identity, conversations, .. }]
                if identity == "alice" && conversations == &vec![room]
        ));
        let presence = store.find_presence("alice").await.unwrap().unwrap();
        assert!(presence.online);
        assert_eq!(presence.connection, Some(id));
    }

    #[tokio::test]
    async fn admission_fails_cleanly_when_store_is_down() {
        let (matrix, store) = matrix();
        store.set_available(false);

        let (tx, _rx) = matrix.outbound_channel();
        let err = matrix.admit("alice", tx).await.unwrap_err();
        assert!(matches!(err, AdmissionError::Store(DbError::Unavailable)));
        assert!(!matrix.connections.is_online("alice"));
    }

    /// Memory store whose offline presence writes take a while to land.
    struct SlowOffline(crate::db::MemoryStore);

    #[async_trait::async_trait]
    impl Store for SlowOffline {
        async fn create_conversation(
            &self,
            new: NewConversation,
        ) -> Result<parley_proto::Conversation, DbError> {
            self.0.create_conversation(new).await
        }

        async fn find_conversation(
            &self,
            id: ConversationId,
        ) -> Result<Option<parley_proto::Conversation>, DbError> {
            self.0.find_conversation(id).await
        }

        async fn open_direct_conversation(
            &self,
            new: NewConversation,
        ) -> Result<(parley_proto::Conversation, bool), DbError> {
            self.0.open_direct_conversation(new).await
        }

        async fn update_conversation(
            &self,
            id: ConversationId,
            patch: crate::db::ConversationPatch,
        ) -> Result<Option<parley_proto::Conversation>, DbError> {
            self.0.update_conversation(id, patch).await
        }

        async fn increment_unread(
            &self,
            id: ConversationId,
            identities: &[Identity],
        ) -> Result<parley_proto::UnreadCounts, DbError> {
            self.0.increment_unread(id, identities).await
        }

        async fn list_conversations_for(
            &self,
            identity: &str,
        ) -> Result<Vec<parley_proto::Conversation>, DbError> {
            self.0.list_conversations_for(identity).await
        }

        async fn create_message(
            &self,
            new: crate::db::NewMessage,
        ) -> Result<parley_proto::Message, DbError> {
            self.0.create_message(new).await
        }

        async fn find_message(
            &self,
            id: parley_proto::MessageId,
        ) -> Result<Option<parley_proto::Message>, DbError> {
            self.0.find_message(id).await
        }

        async fn update_message(
            &self,
            id: parley_proto::MessageId,
            patch: crate::db::MessagePatch,
        ) -> Result<Option<parley_proto::Message>, DbError> {
            self.0.update_message(id, patch).await
        }

        async fn latest_message(
            &self,
            id: ConversationId,
        ) -> Result<Option<parley_proto::Message>, DbError> {
            self.0.latest_message(id).await
        }

        async fn mark_conversation_read(
            &self,
            id: ConversationId,
            reader: &str,
        ) -> Result<Vec<parley_proto::MessageId>, DbError> {
            self.0.mark_conversation_read(id, reader).await
        }

        async fn upsert_presence(
            &self,
            identity: &str,
            patch: PresencePatch,
        ) -> Result<parley_proto::UserPresence, DbError> {
            if !patch.online {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
            self.0.upsert_presence(identity, patch).await
        }

        async fn find_presence(
            &self,
            identity: &str,
        ) -> Result<Option<parley_proto::UserPresence>, DbError> {
            self.0.find_presence(identity).await
        }
    }

    #[tokio::test]
    async fn reconnect_during_offline_write_ends_online() {
        let store = Arc::new(SlowOffline(crate::db::MemoryStore::new()));
        let matrix = crate::state::test_support::matrix_over(store.clone());
        direct(store.as_ref(), "alice", "bob").await;

        let (bob_tx, mut bob_rx) = matrix.outbound_channel();
        matrix.admit("bob", bob_tx).await.unwrap();
        let (tx1, _rx1) = matrix.outbound_channel();
        let first = matrix.admit("alice", tx1).await.unwrap();
        drain(&mut bob_rx);

        // The tab refresh: the old handle goes away while a new one arrives.
        let leaving = {
            let matrix = matrix.clone();
            tokio::spawn(async move { matrix.disconnect(first).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let (tx2, _rx2) = matrix.outbound_channel();
        matrix.admit("alice", tx2).await.unwrap();
        leaving.await.unwrap();

        assert!(matrix.connections.is_online("alice"));
        assert!(store.find_presence("alice").await.unwrap().unwrap().online);
        assert_eq!(
            presence_events(&drain(&mut bob_rx)).last(),
            Some(&("alice".to_string(), true))
        );
    }

    #[tokio::test]
    async fn presence_survives_losing_one_of_two_handles() {
        let (matrix, store) = matrix();
        direct(store.as_ref(), "alice", "bob").await;

        let (bob_tx, mut bob_rx) = matrix.outbound_channel();
        matrix.admit("bob", bob_tx).await.unwrap();

        let (tx1, _rx1) = matrix.outbound_channel();
        let (tx2, _rx2) = matrix.outbound_channel();
        let first = matrix.admit("alice", tx1).await.unwrap();
        let second = matrix.admit("alice", tx2).await.unwrap();
        drain(&mut bob_rx);

        matrix.disconnect(first).await;
        assert!(presence_events(&drain(&mut bob_rx)).is_empty());
        assert!(store.find_presence("alice").await.unwrap().unwrap().online);

        matrix.disconnect(second).await;
        assert_eq!(
            presence_events(&drain(&mut bob_rx)),
            vec![("alice".to_string(), false)]
        );
        assert!(!store.find_presence("alice").await.unwrap().unwrap().online);
    }

    #[tokio::test]
    async fn disconnect_clears_typing_everywhere() {
        let (matrix, store) = matrix();
        let room = direct(store.as_ref(), "alice", "bob").await;
        let (bob_tx, mut bob_rx) = matrix.outbound_channel();
        matrix.admit("bob", bob_tx).await.unwrap();
        let (tx, _rx) = matrix.outbound_channel();
        let alice = matrix.admit("alice", tx).await.unwrap();
        matrix.typing.start(room, "alice", std::time::Instant::now());
        drain(&mut bob_rx);

        matrix.disconnect(alice).await;
        let events = drain(&mut bob_rx);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::TypingStop { user_id, .. } if user_id == "alice"
        )));
        assert!(matrix.typing.typing_in(room).is_empty());
        assert!(matrix.disconnect(alice).await.is_none());
    }

    #[tokio::test]
    async fn shutdown_evicts_everyone() {
        let (matrix, store) = matrix();
        direct(store.as_ref(), "alice", "bob").await;
        let (tx, mut rx) = matrix.outbound_channel();
        matrix.admit("alice", tx).await.unwrap();
        drain(&mut rx);

        matrix.shutdown().await;
        assert_eq!(matrix.connections.handle_count(), 0);
        assert_eq!(matrix.rooms.room_count(), 0);
        assert!(matrix.is_shutting_down());
        assert!(!store.find_presence("alice").await.unwrap().unwrap().online);
        // Registry and room senders are gone; the queue reports closed.
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn sweep_expires_typing_and_invites() {
        let (matrix, store) = matrix();
        let room = direct(store.as_ref(), "alice", "bob").await;
        let (bob_tx, mut bob_rx) = matrix.outbound_channel();
        matrix.admit("bob", bob_tx).await.unwrap();
        drain(&mut bob_rx);

        let now = Instant::now();
        matrix.typing.start(room, "alice", now);
        matrix.calls.invite(room, "alice", now);

        assert_eq!(matrix.sweep(now), 0);
        assert!(drain(&mut bob_rx).is_empty());

        let later = now + std::time::Duration::from_secs(3600);
        assert_eq!(matrix.sweep(later), 1);
        assert!(matches!(
            drain(&mut bob_rx).as_slice(),
            [ServerEvent::TypingStop { user_id, .. }] if user_id == "alice"
        ));
        assert_eq!(matrix.calls.state(room), crate::state::CallState::Idle);
    }
}
