//! [`Store`] backed by the SQLite [`Database`].

use super::{
    ConversationPatch, Database, DbError, MessagePatch, NewConversation, NewMessage,
    PresencePatch, Store,
};
use async_trait::async_trait;
use parley_proto::{
    Conversation, ConversationId, Identity, Message, MessageId, UnreadCounts, UserPresence,
};

#[async_trait]
impl Store for Database {
    async fn create_conversation(&self, new: NewConversation) -> Result<Conversation, DbError> {
        self.conversations().insert(&new).await
    }

    async fn find_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, DbError> {
        self.conversations().find(id).await
    }

    async fn open_direct_conversation(
        &self,
        new: NewConversation,
    ) -> Result<(Conversation, bool), DbError> {
        self.conversations().open_direct(&new).await
    }

    async fn update_conversation(
        &self,
        id: ConversationId,
        patch: ConversationPatch,
    ) -> Result<Option<Conversation>, DbError> {
        self.conversations().apply_patch(id, &patch).await
    }

    async fn increment_unread(
        &self,
        id: ConversationId,
        identities: &[Identity],
    ) -> Result<UnreadCounts, DbError> {
        self.conversations().increment_unread(id, identities).await
    }

    async fn list_conversations_for(&self, identity: &str) -> Result<Vec<Conversation>, DbError> {
        self.conversations().list_for(identity).await
    }

    async fn create_message(&self, new: NewMessage) -> Result<Message, DbError> {
        self.messages().insert(&new).await
    }

    async fn find_message(&self, id: MessageId) -> Result<Option<Message>, DbError> {
        self.messages().find(id).await
    }

    async fn update_message(
        &self,
        id: MessageId,
        patch: MessagePatch,
    ) -> Result<Option<Message>, DbError> {
        self.messages().apply_patch(id, &patch).await
    }

    async fn latest_message(&self, id: ConversationId) -> Result<Option<Message>, DbError> {
        self.messages().latest_visible(id).await
    }

    async fn mark_conversation_read(
        &self,
        id: ConversationId,
        reader: &str,
    ) -> Result<Vec<MessageId>, DbError> {
        self.messages().mark_conversation_read(id, reader).await
    }

    async fn upsert_presence(
        &self,
        identity: &str,
        patch: PresencePatch,
    ) -> Result<UserPresence, DbError> {
        self.presence().upsert(identity, &patch).await
    }

    async fn find_presence(&self, identity: &str) -> Result<Option<UserPresence>, DbError> {
        self.presence().find(identity).await
    }
}
