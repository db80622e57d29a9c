//! Room broadcaster: conversation to subscribed handles.
//!
//! Broadcasting copies the member list out of the map before sending, so
//! joins and leaves during a broadcast never block or reorder it.

use super::registry::{Frame, Outbound, try_deliver};
use crate::metrics;
use dashmap::DashMap;
use parley_proto::{ConnectionId, ConversationId, ServerEvent};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Default)]
pub struct RoomBroadcaster {
    rooms: DashMap<ConversationId, HashMap<ConnectionId, Outbound>>,
    memberships: DashMap<ConnectionId, HashSet<ConversationId>>,
}

impl RoomBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a handle. Returns false if it was already a member.
    pub fn join(&self, room: ConversationId, id: ConnectionId, tx: Outbound) -> bool {
        let added = self.rooms.entry(room).or_default().insert(id, tx).is_none();
        self.memberships.entry(id).or_default().insert(room);
        added
    }

    /// Unsubscribe a handle. Returns false if it was not a member.
    pub fn leave(&self, room: ConversationId, id: ConnectionId) -> bool {
        let removed = self
            .rooms
            .get_mut(&room)
            .is_some_and(|mut members| members.remove(&id).is_some());
        self.rooms.remove_if(&room, |_, members| members.is_empty());

        if let Some(mut rooms) = self.memberships.get_mut(&id) {
            rooms.remove(&room);
        }
        self.memberships.remove_if(&id, |_, rooms| rooms.is_empty());
        removed
    }

    /// Unsubscribe a handle from every room. Returns the rooms it left.
    pub fn leave_all(&self, id: ConnectionId) -> Vec<ConversationId> {
        let Some((_, rooms)) = self.memberships.remove(&id) else {
            return Vec::new();
        };
        for room in &rooms {
            if let Some(mut members) = self.rooms.get_mut(room) {
                members.remove(&id);
            }
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }
        rooms.into_iter().collect()
    }

    pub fn is_member(&self, room: ConversationId, id: ConnectionId) -> bool {
        self.rooms
            .get(&room)
            .is_some_and(|members| members.contains_key(&id))
    }

    pub fn members(&self, room: ConversationId) -> Vec<ConnectionId> {
        self.rooms
            .get(&room)
            .map(|members| members.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn rooms_of(&self, id: ConnectionId) -> Vec<ConversationId> {
        self.memberships
            .get(&id)
            .map(|rooms| rooms.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Deliver `event` to every member except `exclude`.
    ///
    /// An empty room is a no-op. A failed send to one handle does not stop
    /// delivery to the rest. Returns how many handles the frame was queued for.
    pub fn broadcast(
        &self,
        room: ConversationId,
        event: ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let snapshot: Vec<(ConnectionId, Outbound)> = match self.rooms.get(&room) {
            Some(members) => members
                .iter()
                .filter(|(id, _)| Some(**id) != exclude)
                .map(|(id, tx)| (*id, tx.clone()))
                .collect(),
            None => return 0,
        };

        let frame: Frame = Arc::new(event);
        let delivered = snapshot
            .iter()
            .filter(|(id, tx)| try_deliver(tx, *id, frame.clone()))
            .count();
        metrics::record_fanout(delivered);
        delivered
    }

    pub fn clear(&self) {
        self.rooms.clear();
        self.memberships.clear();
    }
}
