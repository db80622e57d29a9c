use super::{Actor, publish, validate_body};
use crate::db::NewMessage;
use crate::error::{HandlerError, HandlerResult};
use crate::guard;
use crate::state::Matrix;
use parley_proto::{ConversationId, Message, MessageBody, ServerEvent};

/// Post a new message to a conversation.
pub async fn send(
    matrix: &Matrix,
    actor: Actor<'_>,
    conversation_id: ConversationId,
    body: MessageBody,
) -> HandlerResult<Message> {
    let store = matrix.store.as_ref();
    let conversation = guard::participant_of(store, conversation_id, actor.identity).await?;
    guard::require_not_blocked(&conversation, actor.identity)?;
    validate_body(&body, matrix.limits.max_message_len)?;

    if let Some(reply_to) = body.reply_to {
        let target = guard::require_message(store, reply_to).await?;
        if target.conversation_id != conversation.id {
            return Err(HandlerError::invalid(
                "reply target belongs to another conversation",
            ));
        }
    }

    let message = publish(
        matrix,
        &conversation,
        NewMessage {
            conversation_id: conversation.id,
            sender: actor.identity.to_string(),
            text: body.text,
            content_kind: body.content_kind,
            media_url: body.media_url,
            file_name: body.file_name,
            file_size: body.file_size,
            duration: body.duration,
            reply_to: body.reply_to,
            forward: None,
        },
    )
    .await?;

    if matrix.typing.stop(conversation.id, actor.identity) {
        matrix.broadcast(
            conversation.id,
            ServerEvent::TypingStop {
                conversation_id: conversation.id,
                user_id: actor.identity.to_string(),
            },
            Some(actor.conn),
        );
    }
    Ok(message)
}
