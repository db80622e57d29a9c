//! Message pipeline.
//!
//! Every operation follows the same shape: guard against the store, validate,
//! persist, then fan out. Fan-out is best effort and never undoes a
//! successful write.

mod delete;
mod edit;
mod forward;
mod react;
mod read;
mod send;
mod typing;

pub use delete::delete;
pub use edit::edit;
pub use forward::forward;
pub use react::react;
pub use read::{ReadTarget, mark_read};
pub use send::send;
pub use typing::typing;

use crate::db::{ConversationPatch, MessagePatch, NewMessage};
use crate::error::{HandlerError, HandlerResult};
use crate::metrics;
use crate::state::Matrix;
use parley_proto::{
    ConnectionId, Conversation, Identity, LastMessage, Message, MessageBody, ServerEvent,
};
use tracing::debug;

/// The connection and identity an operation runs on behalf of.
#[derive(Debug, Clone, Copy)]
pub struct Actor<'a> {
    pub conn: ConnectionId,
    pub identity: &'a str,
}

impl<'a> Actor<'a> {
    pub fn new(conn: ConnectionId, identity: &'a str) -> Self {
        Self { conn, identity }
    }
}

/// Text must be non-blank and within the configured length.
pub(crate) fn validate_text(text: &str, max_len: usize) -> HandlerResult {
    if text.trim().is_empty() {
        return Err(HandlerError::invalid("message text is empty"));
    }
    check_len(text, max_len)
}

fn check_len(text: &str, max_len: usize) -> HandlerResult {
    if text.chars().count() > max_len {
        return Err(HandlerError::invalid(format!(
            "message text exceeds {max_len} characters"
        )));
    }
    Ok(())
}

/// Text messages need text; every other kind needs a media reference and
/// may carry a caption.
pub(crate) fn validate_body(body: &MessageBody, max_len: usize) -> HandlerResult {
    if !body.content_kind.requires_media() {
        return validate_text(&body.text, max_len);
    }
    if body
        .media_url
        .as_deref()
        .is_none_or(|url| url.trim().is_empty())
    {
        return Err(HandlerError::invalid(format!(
            "{} messages need a media reference",
            body.content_kind.as_str()
        )));
    }
    check_len(&body.text, max_len)
}

/// Persist a new message and fan it out.
///
/// Updates the conversation's last message, revives it for everyone who
/// hid it, bumps the unread counter of every other participant, records
/// delivery to every participant with a live handle, then broadcasts the
/// message followed by the new counters.
pub(crate) async fn publish(
    matrix: &Matrix,
    conversation: &Conversation,
    new: NewMessage,
) -> HandlerResult<Message> {
    let store = matrix.store.as_ref();
    let message = store.create_message(new).await?;
    metrics::inc(&metrics::MESSAGES_PERSISTED);

    let patch = ConversationPatch {
        advance_last_message: Some(LastMessage {
            id: message.id,
            at: message.created_at,
        }),
        unhide_all: !conversation.hidden_by.is_empty(),
        ..Default::default()
    };
    store.update_conversation(conversation.id, patch).await?;

    let others: Vec<Identity> = conversation.others(&message.sender).cloned().collect();
    let unread_counts = store.increment_unread(conversation.id, &others).await?;

    let online: Vec<Identity> = conversation
        .participants
        .iter()
        .filter(|p| matrix.connections.is_online(p))
        .cloned()
        .collect();
    let message = if online.is_empty() {
        message
    } else {
        store
            .update_message(message.id, MessagePatch::delivered_to(online))
            .await?
            .unwrap_or(message)
    };

    let reached = matrix.broadcast(
        conversation.id,
        ServerEvent::NewMessage(message.client_view()),
        None,
    );
    matrix.broadcast(
        conversation.id,
        ServerEvent::UnreadCountsUpdated {
            conversation_id: conversation.id,
            unread_counts,
        },
        None,
    );

    debug!(
        conversation = %conversation.id,
        message = %message.id,
        sender = %message.sender,
        reached,
        "Message published"
    );
    Ok(message)
}
