//! Authorization guard.
//!
//! Membership is always read from the store, never from room state, and
//! never cached: a participant removed a moment ago must already be refused.

use crate::db::Store;
use crate::error::{HandlerError, HandlerResult};
use parley_proto::{Conversation, ConversationId, Message, MessageId};

pub async fn require_conversation(
    store: &dyn Store,
    id: ConversationId,
) -> HandlerResult<Conversation> {
    store
        .find_conversation(id)
        .await?
        .ok_or(HandlerError::ConversationNotFound(id))
}

pub async fn require_message(store: &dyn Store, id: MessageId) -> HandlerResult<Message> {
    store
        .find_message(id)
        .await?
        .ok_or(HandlerError::MessageNotFound(id))
}

pub fn require_participant(conversation: &Conversation, identity: &str) -> HandlerResult {
    if conversation.is_participant(identity) {
        Ok(())
    } else {
        Err(HandlerError::NotParticipant(conversation.id))
    }
}

/// Sends and call invitations additionally respect the block list.
pub fn require_not_blocked(conversation: &Conversation, identity: &str) -> HandlerResult {
    if conversation.is_blocked_for(identity) {
        Err(HandlerError::Blocked(conversation.id))
    } else {
        Ok(())
    }
}

/// Load a conversation and check that `identity` belongs to it.
pub async fn participant_of(
    store: &dyn Store,
    id: ConversationId,
    identity: &str,
) -> HandlerResult<Conversation> {
    let conversation = require_conversation(store, id).await?;
    require_participant(&conversation, identity)?;
    Ok(conversation)
}

/// Load a message and its conversation, checking that `identity` belongs
/// to the conversation.
pub async fn message_in_reach(
    store: &dyn Store,
    id: MessageId,
    identity: &str,
) -> HandlerResult<(Message, Conversation)> {
    let message = require_message(store, id).await?;
    let conversation = participant_of(store, message.conversation_id, identity).await?;
    Ok((message, conversation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ConversationPatch, MemoryStore, NewConversation};
    use parley_proto::ConversationKind;

    async fn setup() -> (MemoryStore, Conversation) {
        let store = MemoryStore::new();
        let conversation = store
            .create_conversation(NewConversation {
                kind: ConversationKind::Direct,
                name: None,
                participants: vec!["alice".into(), "bob".into()],
                admins: vec![],
                created_by: "alice".into(),
            })
            .await
            .unwrap();
        (store, conversation)
    }

    #[tokio::test]
    async fn outsiders_are_refused() {
        let (store, conv) = setup().await;
        assert!(participant_of(&store, conv.id, "alice").await.is_ok());
        assert!(matches!(
            participant_of(&store, conv.id, "mallory").await,
            Err(HandlerError::NotParticipant(id)) if id == conv.id
        ));
        assert!(matches!(
            participant_of(&store, ConversationId::new(), "alice").await,
            Err(HandlerError::ConversationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn block_applies_only_to_the_blocking_identity() {
        let (store, conv) = setup().await;
        let conv = store
            .update_conversation(
                conv.id,
                ConversationPatch {
                    blocked: Some(("bob".into(), true)),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(
            require_not_blocked(&conv, "bob"),
            Err(HandlerError::Blocked(_))
        ));
        assert!(require_not_blocked(&conv, "alice").is_ok());
    }

    #[tokio::test]
    async fn membership_is_reread_every_time() {
        let store = MemoryStore::new();
        let conv = store
            .create_conversation(NewConversation {
                kind: ConversationKind::Group,
                name: Some("ops".into()),
                participants: vec!["alice".into(), "bob".into()],
                admins: vec!["alice".into()],
                created_by: "alice".into(),
            })
            .await
            .unwrap();
        assert!(participant_of(&store, conv.id, "bob").await.is_ok());

        store
            .update_conversation(
                conv.id,
                ConversationPatch {
                    remove_participant: Some("bob".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(participant_of(&store, conv.id, "bob").await.is_err());
    }
}
