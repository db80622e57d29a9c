use super::Actor;
use crate::db::{ConversationPatch, MessagePatch, now_millis};
use crate::error::{HandlerError, HandlerResult};
use crate::guard;
use crate::state::Matrix;
use parley_proto::{LastMessage, Message, MessageId, ServerEvent};
use tracing::debug;

/// Soft delete one's own message.
///
/// The record keeps its id and position. If it was the conversation's last
/// message, the most recent surviving message takes its place. Deleting an
/// already deleted message changes nothing and broadcasts nothing.
pub async fn delete(
    matrix: &Matrix,
    actor: Actor<'_>,
    message_id: MessageId,
) -> HandlerResult<Message> {
    let store = matrix.store.as_ref();
    let (message, conversation) =
        guard::message_in_reach(store, message_id, actor.identity).await?;
    if message.sender != actor.identity {
        return Err(HandlerError::NotSender);
    }
    if message.is_deleted() {
        return Ok(message.client_view());
    }

    let deleted = store
        .update_message(message.id, MessagePatch::delete(now_millis()))
        .await?
        .ok_or(HandlerError::MessageNotFound(message.id))?;

    if conversation
        .last_message
        .is_some_and(|last| last.id == deleted.id)
    {
        let latest = store.latest_message(conversation.id).await?;
        debug!(
            conversation = %conversation.id,
            replacement = ?latest.as_ref().map(|m| m.id),
            "Recomputed last message"
        );
        store
            .update_conversation(
                conversation.id,
                ConversationPatch::last_message(latest.map(|m| LastMessage {
                    id: m.id,
                    at: m.created_at,
                })),
            )
            .await?;
    }

    matrix.broadcast(
        conversation.id,
        ServerEvent::MessageDeleted {
            conversation_id: conversation.id,
            message_id: deleted.id,
        },
        None,
    );
    Ok(deleted.client_view())
}
