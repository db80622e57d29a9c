use super::IdentitySet;
use crate::ids::{ConversationId, Identity, MessageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Direct (one-to-one) or group conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    /// Exactly two distinct participants.
    Direct,
    /// Named conversation with admins.
    Group,
}

impl ConversationKind {
    /// Storage/wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }

    /// Parse the storage name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(Self::Direct),
            "group" => Some(Self::Group),
            _ => None,
        }
    }
}

/// Reference to the most recent visible message of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    /// Message id (a back-reference, never an owning pointer).
    pub id: MessageId,
    /// Message creation time.
    pub at: DateTime<Utc>,
}

/// Per-participant unread counters. Absent entries read as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnreadCounts(BTreeMap<Identity, u32>);

impl UnreadCounts {
    /// Create an empty counter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter for `identity`, zero when absent.
    pub fn get(&self, identity: &str) -> u32 {
        self.0.get(identity).copied().unwrap_or(0)
    }

    /// Set the counter for `identity`.
    pub fn set(&mut self, identity: impl Into<Identity>, count: u32) {
        self.0.insert(identity.into(), count);
    }

    /// Add one to the counter for `identity`.
    pub fn increment(&mut self, identity: &str) {
        let entry = self.0.entry(identity.to_string()).or_insert(0);
        *entry = entry.saturating_add(1);
    }

    /// Forget the counter for `identity` (participant removed).
    pub fn remove(&mut self, identity: &str) {
        self.0.remove(identity);
    }

    /// Iterate `(identity, count)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Identity, u32)> {
        self.0.iter().map(|(k, v)| (k, *v))
    }
}

/// A conversation and its per-participant bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation id.
    pub id: ConversationId,
    /// Direct or group.
    pub kind: ConversationKind,
    /// Display name (required for groups).
    pub name: Option<String>,
    /// Participants in join order, unique.
    pub participants: Vec<Identity>,
    /// Admin subset of participants (groups).
    pub admins: IdentitySet,
    /// Identity that created the conversation.
    pub created_by: Identity,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Most recent visible message.
    pub last_message: Option<LastMessage>,
    /// Unread counters, one per current participant.
    pub unread: UnreadCounts,
    /// Participants who muted the conversation.
    pub muted_by: IdentitySet,
    /// Identities that blocked the conversation.
    pub blocked_by: IdentitySet,
    /// Participants who soft-hid the conversation for themselves.
    pub hidden_by: IdentitySet,
}

impl Conversation {
    /// Whether `identity` is a current participant.
    pub fn is_participant(&self, identity: &str) -> bool {
        self.participants.iter().any(|p| p == identity)
    }

    /// Whether `identity` administers this conversation.
    pub fn is_admin(&self, identity: &str) -> bool {
        self.admins.contains(identity)
    }

    /// Participants other than `identity`.
    pub fn others<'a>(&'a self, identity: &'a str) -> impl Iterator<Item = &'a Identity> + 'a {
        self.participants.iter().filter(move |p| p.as_str() != identity)
    }

    /// Whether `identity` is barred from sending or inviting. Only the
    /// identity's own entry on the blocked list counts.
    pub fn is_blocked_for(&self, identity: &str) -> bool {
        self.blocked_by.contains(identity)
    }
}
