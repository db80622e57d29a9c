//! In-memory [`Store`].
//!
//! Backs the unit tests and `backend = "memory"` deployments. Every
//! operation runs under one lock, which makes each patch and each unread
//! increment atomic. [`MemoryStore::set_available`] simulates an outage.

use super::{
    ConversationPatch, DbError, MessagePatch, NewConversation, NewMessage, PresencePatch, Store,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use parley_proto::{
    Conversation, ConversationId, ConversationKind, Identity, IdentitySet, Message, MessageId,
    Reactions, UnreadCounts, UserPresence,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
struct Tables {
    conversations: HashMap<ConversationId, Conversation>,
    messages: HashMap<MessageId, Message>,
    /// Insertion order per conversation; ties on `created_at` resolve by it.
    timeline: HashMap<ConversationId, Vec<MessageId>>,
    presence: HashMap<Identity, UserPresence>,
}

/// Process-local store.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Make every subsequent call fail with [`DbError::Unavailable`] until
    /// switched back on.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), DbError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DbError::Unavailable)
        }
    }
}

fn insert_conversation(tables: &mut Tables, new: NewConversation) -> Conversation {
    let mut unread = UnreadCounts::new();
    for identity in &new.participants {
        unread.set(identity.clone(), 0);
    }
    let conversation = Conversation {
        id: ConversationId::new(),
        kind: new.kind,
        name: new.name,
        admins: new.admins.into_iter().collect(),
        participants: new.participants,
        created_by: new.created_by,
        created_at: Utc::now(),
        last_message: None,
        unread,
        muted_by: IdentitySet::new(),
        blocked_by: IdentitySet::new(),
        hidden_by: IdentitySet::new(),
    };
    tables
        .conversations
        .insert(conversation.id, conversation.clone());
    conversation
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_conversation(&self, new: NewConversation) -> Result<Conversation, DbError> {
        self.check()?;
        Ok(insert_conversation(&mut self.tables.write(), new))
    }

    async fn find_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, DbError> {
        self.check()?;
        Ok(self.tables.read().conversations.get(&id).cloned())
    }

    async fn open_direct_conversation(
        &self,
        new: NewConversation,
    ) -> Result<(Conversation, bool), DbError> {
        self.check()?;
        let mut tables = self.tables.write();
        if let [a, b] = new.participants.as_slice()
            && let Some(existing) = tables
                .conversations
                .values()
                .filter(|c| {
                    c.kind == ConversationKind::Direct
                        && c.is_participant(a)
                        && c.is_participant(b)
                })
                .min_by_key(|c| c.created_at)
        {
            return Ok((existing.clone(), false));
        }
        let conversation = insert_conversation(&mut tables, new);
        Ok((conversation, true))
    }

    async fn update_conversation(
        &self,
        id: ConversationId,
        patch: ConversationPatch,
    ) -> Result<Option<Conversation>, DbError> {
        self.check()?;
        let mut tables = self.tables.write();
        Ok(tables.conversations.get_mut(&id).map(|conversation| {
            patch.apply(conversation);
            conversation.clone()
        }))
    }

    async fn increment_unread(
        &self,
        id: ConversationId,
        identities: &[Identity],
    ) -> Result<UnreadCounts, DbError> {
        self.check()?;
        let mut tables = self.tables.write();
        let Some(conversation) = tables.conversations.get_mut(&id) else {
            return Ok(UnreadCounts::new());
        };
        for identity in identities {
            if conversation.is_participant(identity) {
                conversation.unread.increment(identity);
            }
        }
        Ok(conversation.unread.clone())
    }

    async fn list_conversations_for(&self, identity: &str) -> Result<Vec<Conversation>, DbError> {
        self.check()?;
        let tables = self.tables.read();
        let mut conversations: Vec<Conversation> = tables
            .conversations
            .values()
            .filter(|c| c.is_participant(identity))
            .cloned()
            .collect();
        conversations.sort_by_key(|c| {
            std::cmp::Reverse(c.last_message.map(|l| l.at).unwrap_or(c.created_at))
        });
        Ok(conversations)
    }

    async fn create_message(&self, new: NewMessage) -> Result<Message, DbError> {
        self.check()?;
        let mut tables = self.tables.write();
        let message = Message {
            id: MessageId::new(),
            conversation_id: new.conversation_id,
            sender: new.sender,
            text: new.text,
            content_kind: new.content_kind,
            media_url: new.media_url,
            file_name: new.file_name,
            file_size: new.file_size,
            duration: new.duration,
            reply_to: new.reply_to,
            forward: new.forward,
            reactions: Reactions::new(),
            read_by: IdentitySet::new(),
            delivered_to: IdentitySet::new(),
            created_at: Utc::now(),
            edited_at: None,
            deleted_at: None,
        };
        tables
            .timeline
            .entry(message.conversation_id)
            .or_default()
            .push(message.id);
        tables.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn find_message(&self, id: MessageId) -> Result<Option<Message>, DbError> {
        self.check()?;
        Ok(self.tables.read().messages.get(&id).cloned())
    }

    async fn update_message(
        &self,
        id: MessageId,
        patch: MessagePatch,
    ) -> Result<Option<Message>, DbError> {
        self.check()?;
        let mut tables = self.tables.write();
        Ok(tables.messages.get_mut(&id).map(|message| {
            patch.apply(message);
            message.clone()
        }))
    }

    async fn latest_message(&self, id: ConversationId) -> Result<Option<Message>, DbError> {
        self.check()?;
        let tables = self.tables.read();
        let Some(timeline) = tables.timeline.get(&id) else {
            return Ok(None);
        };
        Ok(timeline
            .iter()
            .enumerate()
            .filter_map(|(seq, mid)| tables.messages.get(mid).map(|m| (seq, m)))
            .filter(|(_, m)| !m.is_deleted())
            .max_by_key(|(seq, m)| (m.created_at, *seq))
            .map(|(_, m)| m.clone()))
    }

    async fn mark_conversation_read(
        &self,
        id: ConversationId,
        reader: &str,
    ) -> Result<Vec<MessageId>, DbError> {
        self.check()?;
        let mut guard = self.tables.write();
        let tables = &mut *guard;
        let mut newly_read = Vec::new();
        if let Some(timeline) = tables.timeline.get(&id) {
            for mid in timeline {
                if let Some(message) = tables.messages.get_mut(mid)
                    && message.sender != reader
                    && message.read_by.insert(reader)
                {
                    newly_read.push(message.id);
                }
            }
        }
        if let Some(conversation) = tables.conversations.get_mut(&id)
            && conversation.is_participant(reader)
        {
            conversation.unread.set(reader, 0);
        }
        Ok(newly_read)
    }

    async fn upsert_presence(
        &self,
        identity: &str,
        patch: PresencePatch,
    ) -> Result<UserPresence, DbError> {
        self.check()?;
        let presence = UserPresence {
            identity: identity.to_string(),
            online: patch.online,
            last_seen: patch.last_seen,
            connection: patch.connection,
        };
        self.tables
            .write()
            .presence
            .insert(identity.to_string(), presence.clone());
        Ok(presence)
    }

    async fn find_presence(&self, identity: &str) -> Result<Option<UserPresence>, DbError> {
        self.check()?;
        Ok(self.tables.read().presence.get(identity).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_proto::ContentKind;

    fn note(conversation_id: ConversationId, sender: &str) -> NewMessage {
        NewMessage {
            conversation_id,
            sender: sender.into(),
            text: "x".into(),
            content_kind: ContentKind::Text,
            media_url: None,
            file_name: None,
            file_size: None,
            duration: None,
            reply_to: None,
            forward: None,
        }
    }

    async fn pair(store: &MemoryStore) -> Conversation {
        store
            .create_conversation(NewConversation {
                kind: ConversationKind::Direct,
                name: None,
                participants: vec!["alice".into(), "bob".into()],
                admins: vec![],
                created_by: "alice".into(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        let conv = pair(&store).await;

        store.set_available(false);
        assert!(matches!(
            store.find_conversation(conv.id).await,
            Err(DbError::Unavailable)
        ));
        assert!(matches!(
            store.create_message(note(conv.id, "alice")).await,
            Err(DbError::Unavailable)
        ));

        store.set_available(true);
        assert!(store.find_conversation(conv.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn latest_message_breaks_timestamp_ties_by_insertion() {
        let store = MemoryStore::new();
        let conv = pair(&store).await;
        let first = store.create_message(note(conv.id, "alice")).await.unwrap();
        let second = store.create_message(note(conv.id, "alice")).await.unwrap();

        {
            let mut tables = store.tables.write();
            let at = first.created_at;
            tables.messages.get_mut(&second.id).unwrap().created_at = at;
        }

        let latest = store.latest_message(conv.id).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let conv = pair(&store).await;

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.increment_unread(conv.id, &["bob".into()]).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let conv = store.find_conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(conv.unread.get("bob"), 50);
    }

    #[tokio::test]
    async fn racing_direct_opens_share_one_conversation() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let existing = pair(&store).await;

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .open_direct_conversation(NewConversation {
                        kind: ConversationKind::Direct,
                        name: None,
                        participants: vec!["bob".into(), "alice".into()],
                        admins: vec![],
                        created_by: "bob".into(),
                    })
                    .await
                    .unwrap()
            }));
        }
        for task in tasks {
            let (conversation, created) = task.await.unwrap();
            assert!(!created);
            assert_eq!(conversation.id, existing.id);
        }
        assert_eq!(store.list_conversations_for("bob").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mark_read_twice_changes_nothing_the_second_time() {
        let store = MemoryStore::new();
        let conv = pair(&store).await;
        let msg = store.create_message(note(conv.id, "alice")).await.unwrap();
        store.increment_unread(conv.id, &["bob".into()]).await.unwrap();

        assert_eq!(
            store.mark_conversation_read(conv.id, "bob").await.unwrap(),
            vec![msg.id]
        );
        assert!(store.mark_conversation_read(conv.id, "bob").await.unwrap().is_empty());
        let conv = store.find_conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(conv.unread.get("bob"), 0);
    }
}
