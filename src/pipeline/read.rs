use super::Actor;
use crate::db::MessagePatch;
use crate::error::{HandlerError, HandlerResult};
use crate::guard;
use crate::state::Matrix;
use parley_proto::{ConversationId, MessageId, ServerEvent};

/// What a read receipt covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadTarget {
    Conversation(ConversationId),
    Message(MessageId),
}

impl ReadTarget {
    /// Exactly one of the two ids must be given.
    pub fn from_request(
        conversation_id: Option<ConversationId>,
        message_id: Option<MessageId>,
    ) -> HandlerResult<Self> {
        match (conversation_id, message_id) {
            (Some(id), None) => Ok(Self::Conversation(id)),
            (None, Some(id)) => Ok(Self::Message(id)),
            _ => Err(HandlerError::invalid(
                "mark_read needs either conversation_id or message_id",
            )),
        }
    }
}

/// Record read receipts for the caller.
///
/// The conversation form marks every message the caller did not author and
/// zeroes the caller's unread counter. Read sets only grow, so repeating a
/// call changes nothing. Returns the messages newly marked.
pub async fn mark_read(
    matrix: &Matrix,
    actor: Actor<'_>,
    target: ReadTarget,
) -> HandlerResult<Vec<MessageId>> {
    let store = matrix.store.as_ref();
    let (conversation, newly_read) = match target {
        ReadTarget::Conversation(id) => {
            let conversation = guard::participant_of(store, id, actor.identity).await?;
            let newly_read = store
                .mark_conversation_read(conversation.id, actor.identity)
                .await?;
            (conversation, newly_read)
        }
        ReadTarget::Message(id) => {
            let (message, conversation) =
                guard::message_in_reach(store, id, actor.identity).await?;
            let newly_read =
                if message.sender == actor.identity || message.read_by.contains(actor.identity) {
                    Vec::new()
                } else {
                    store
                        .update_message(message.id, MessagePatch::read_by(actor.identity))
                        .await?;
                    vec![message.id]
                };
            (conversation, newly_read)
        }
    };

    if !newly_read.is_empty() {
        matrix.broadcast(
            conversation.id,
            ServerEvent::MessagesRead {
                conversation_id: conversation.id,
                reader: actor.identity.to_string(),
                message_ids: newly_read.clone(),
            },
            None,
        );
    }

    let unread_counts = store
        .find_conversation(conversation.id)
        .await?
        .map(|c| c.unread)
        .unwrap_or(conversation.unread);
    matrix.broadcast(
        conversation.id,
        ServerEvent::UnreadCountsUpdated {
            conversation_id: conversation.id,
            unread_counts,
        },
        None,
    );
    Ok(newly_read)
}
