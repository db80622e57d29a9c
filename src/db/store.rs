//! Persistent store abstraction.
//!
//! The core talks to persistence only through [`Store`]. Two backends exist:
//! [`Database`](super::Database) (SQLite via sqlx) and
//! [`MemoryStore`](super::MemoryStore).
//!
//! Patches are plain data. Their `apply` methods define the semantics every
//! backend must reproduce; the memory backend calls them directly and the
//! SQLite backend mirrors them statement by statement.

use super::DbError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_proto::{
    ConnectionId, ContentKind, Conversation, ConversationId, ConversationKind, ForwardOrigin,
    Identity, LastMessage, Message, MessageId, Reaction, UnreadCounts, UserPresence,
};

/// Fields of a conversation about to be created.
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub kind: ConversationKind,
    pub name: Option<String>,
    /// Ordered, unique.
    pub participants: Vec<Identity>,
    pub admins: Vec<Identity>,
    pub created_by: Identity,
}

/// Fields of a message about to be created.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender: Identity,
    pub text: String,
    pub content_kind: ContentKind,
    pub media_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub duration: Option<f64>,
    pub reply_to: Option<MessageId>,
    pub forward: Option<ForwardOrigin>,
}

/// A change to a conversation record.
#[derive(Debug, Clone, Default)]
pub struct ConversationPatch {
    /// `Some(None)` clears the last message.
    pub last_message: Option<Option<LastMessage>>,
    /// Sets the last message unless the current one is newer.
    pub advance_last_message: Option<LastMessage>,
    pub add_participants: Vec<Identity>,
    pub remove_participant: Option<Identity>,
    /// Clears the hidden set for everyone.
    pub unhide_all: bool,
    pub hidden: Option<(Identity, bool)>,
    pub muted: Option<(Identity, bool)>,
    pub blocked: Option<(Identity, bool)>,
}

impl ConversationPatch {
    pub fn last_message(last: Option<LastMessage>) -> Self {
        Self {
            last_message: Some(last),
            ..Self::default()
        }
    }

    /// Apply the patch in memory.
    ///
    /// Removing a participant drops their unread counter, flags and admin
    /// status. A group left without an admin promotes its earliest remaining
    /// participant.
    pub fn apply(&self, conversation: &mut Conversation) {
        if let Some(last) = self.last_message {
            conversation.last_message = last;
        }
        if let Some(candidate) = self.advance_last_message
            && conversation
                .last_message
                .is_none_or(|current| candidate.at >= current.at)
        {
            conversation.last_message = Some(candidate);
        }
        for identity in &self.add_participants {
            if !conversation.is_participant(identity) {
                conversation.participants.push(identity.clone());
                conversation.unread.set(identity.clone(), 0);
            }
        }
        if let Some(identity) = &self.remove_participant
            && conversation.is_participant(identity)
        {
            conversation.participants.retain(|p| p != identity);
            conversation.admins.remove(identity);
            conversation.unread.remove(identity);
            conversation.muted_by.remove(identity);
            conversation.hidden_by.remove(identity);
            if conversation.kind == ConversationKind::Group
                && conversation.admins.is_empty()
                && let Some(first) = conversation.participants.first()
            {
                conversation.admins.insert(first.clone());
            }
        }
        if self.unhide_all {
            conversation.hidden_by.clear();
        }
        if let Some((identity, hidden)) = &self.hidden
            && conversation.is_participant(identity)
        {
            toggle(&mut conversation.hidden_by, identity, *hidden);
        }
        if let Some((identity, muted)) = &self.muted
            && conversation.is_participant(identity)
        {
            toggle(&mut conversation.muted_by, identity, *muted);
        }
        if let Some((identity, blocked)) = &self.blocked {
            toggle(&mut conversation.blocked_by, identity, *blocked);
        }
    }
}

fn toggle(set: &mut parley_proto::IdentitySet, identity: &str, on: bool) {
    if on {
        set.insert(identity);
    } else {
        set.remove(identity);
    }
}

/// A reaction upsert or removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionChange {
    Set { identity: Identity, reaction: Reaction },
    Remove { identity: Identity },
}

/// A change to a message record.
#[derive(Debug, Clone, Default)]
pub struct MessagePatch {
    pub text: Option<String>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub reaction: Option<ReactionChange>,
    /// Added to the read set. Never removes.
    pub read_by: Vec<Identity>,
    /// Added to the delivered set. Never removes.
    pub delivered_to: Vec<Identity>,
}

impl MessagePatch {
    pub fn edit(text: String, at: DateTime<Utc>) -> Self {
        Self {
            text: Some(text),
            edited_at: Some(at),
            ..Self::default()
        }
    }

    pub fn delete(at: DateTime<Utc>) -> Self {
        Self {
            deleted_at: Some(at),
            ..Self::default()
        }
    }

    pub fn reaction(change: ReactionChange) -> Self {
        Self {
            reaction: Some(change),
            ..Self::default()
        }
    }

    pub fn read_by(identity: impl Into<Identity>) -> Self {
        Self {
            read_by: vec![identity.into()],
            ..Self::default()
        }
    }

    pub fn delivered_to(identities: Vec<Identity>) -> Self {
        Self {
            delivered_to: identities,
            ..Self::default()
        }
    }

    /// Apply the patch in memory.
    pub fn apply(&self, message: &mut Message) {
        if let Some(text) = &self.text {
            message.text = text.clone();
        }
        if self.edited_at.is_some() {
            message.edited_at = self.edited_at;
        }
        if message.deleted_at.is_none() && self.deleted_at.is_some() {
            message.deleted_at = self.deleted_at;
        }
        match &self.reaction {
            Some(ReactionChange::Set { identity, reaction }) => {
                message.reactions.set(identity.clone(), reaction.clone());
            }
            Some(ReactionChange::Remove { identity }) => {
                message.reactions.remove(identity);
            }
            None => {}
        }
        message.read_by.extend(self.read_by.iter().cloned());
        message.delivered_to.extend(self.delivered_to.iter().cloned());
    }
}

/// Presence fields written on connect and disconnect.
#[derive(Debug, Clone)]
pub struct PresencePatch {
    pub online: bool,
    pub last_seen: DateTime<Utc>,
    pub connection: Option<ConnectionId>,
}

/// Durable records for conversations, messages and presence.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a new conversation. Every participant starts with zero unread.
    async fn create_conversation(&self, new: NewConversation) -> Result<Conversation, DbError>;

    async fn find_conversation(&self, id: ConversationId)
    -> Result<Option<Conversation>, DbError>;

    /// The direct conversation between the two participants of `new`,
    /// created from `new` if the pair has none yet. The lookup and the insert
    /// are one atomic step, so a pair never ends up with two direct
    /// conversations. The flag is true when the conversation was created.
    async fn open_direct_conversation(
        &self,
        new: NewConversation,
    ) -> Result<(Conversation, bool), DbError>;

    /// Apply `patch` atomically. Returns `None` for an unknown id.
    async fn update_conversation(
        &self,
        id: ConversationId,
        patch: ConversationPatch,
    ) -> Result<Option<Conversation>, DbError>;

    /// Add one to the unread counter of each listed current participant.
    ///
    /// Each increment is atomic at the field level. Returns the counters
    /// after the increment.
    async fn increment_unread(
        &self,
        id: ConversationId,
        identities: &[Identity],
    ) -> Result<UnreadCounts, DbError>;

    /// Conversations listing `identity` as a participant.
    async fn list_conversations_for(&self, identity: &str) -> Result<Vec<Conversation>, DbError>;

    async fn create_message(&self, new: NewMessage) -> Result<Message, DbError>;

    async fn find_message(&self, id: MessageId) -> Result<Option<Message>, DbError>;

    /// Apply `patch`. Returns `None` for an unknown id.
    async fn update_message(
        &self,
        id: MessageId,
        patch: MessagePatch,
    ) -> Result<Option<Message>, DbError>;

    /// Most recent non-deleted message of a conversation.
    async fn latest_message(&self, id: ConversationId) -> Result<Option<Message>, DbError>;

    /// Add `reader` to the read set of every message in the conversation it
    /// did not author and has not read, and zero its unread counter.
    ///
    /// Returns the ids that were newly marked.
    async fn mark_conversation_read(
        &self,
        id: ConversationId,
        reader: &str,
    ) -> Result<Vec<MessageId>, DbError>;

    async fn upsert_presence(
        &self,
        identity: &str,
        patch: PresencePatch,
    ) -> Result<UserPresence, DbError>;

    async fn find_presence(&self, identity: &str) -> Result<Option<UserPresence>, DbError>;
}
