use super::{Actor, validate_text};
use crate::db::{MessagePatch, now_millis};
use crate::error::{HandlerError, HandlerResult};
use crate::guard;
use crate::state::Matrix;
use parley_proto::{Message, MessageId, ServerEvent};

/// Replace the text of one's own message.
///
/// Only the id, new text and edit time are broadcast.
pub async fn edit(
    matrix: &Matrix,
    actor: Actor<'_>,
    message_id: MessageId,
    text: String,
) -> HandlerResult<Message> {
    let store = matrix.store.as_ref();
    let (message, _) = guard::message_in_reach(store, message_id, actor.identity).await?;
    if message.sender != actor.identity {
        return Err(HandlerError::NotSender);
    }
    if message.is_deleted() {
        return Err(HandlerError::invalid("cannot edit a deleted message"));
    }
    validate_text(&text, matrix.limits.max_message_len)?;

    let edited_at = now_millis();
    let updated = store
        .update_message(message.id, MessagePatch::edit(text, edited_at))
        .await?
        .ok_or(HandlerError::MessageNotFound(message.id))?;

    matrix.broadcast(
        updated.conversation_id,
        ServerEvent::MessageEdited {
            conversation_id: updated.conversation_id,
            message_id: updated.id,
            text: updated.text.clone(),
            edited_at,
        },
        None,
    );
    Ok(updated)
}
