use super::CallPayload;
use crate::ids::{ConnectionId, ConversationId, Identity, MessageId};
use crate::model::{Conversation, Message, UnreadCounts};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events pushed to clients, either privately or to a whole room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Sent once after admission.
    Ready {
        /// Verified identity of this connection.
        identity: Identity,
        /// Handle id assigned to this connection.
        connection: ConnectionId,
        /// Conversations whose rooms were joined.
        conversations: Vec<ConversationId>,
    },
    /// Reply to a request that carried an ack id.
    Ack {
        /// Ack id from the request.
        ack: u64,
        /// Whether the operation succeeded.
        success: bool,
        /// Failure description.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Operation result.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },
    /// Private failure notice for the caller.
    Error {
        /// Event that failed.
        event: String,
        /// Static error code.
        code: String,
        /// Human readable message.
        message: String,
    },
    /// Reply to `ping`.
    Pong,
    /// A message was posted.
    NewMessage(Message),
    /// A message's text changed.
    MessageEdited {
        /// Owning conversation.
        conversation_id: ConversationId,
        /// Edited message.
        message_id: MessageId,
        /// New text.
        text: String,
        /// Edit time.
        edited_at: DateTime<Utc>,
    },
    /// A message was soft deleted.
    MessageDeleted {
        /// Owning conversation.
        conversation_id: ConversationId,
        /// Deleted message.
        message_id: MessageId,
    },
    /// A reaction was set or removed.
    MessageReaction {
        /// Owning conversation.
        conversation_id: ConversationId,
        /// Target message.
        message_id: MessageId,
        /// Reacting identity.
        user_id: Identity,
        /// Reaction kind, `"remove"` when cleared.
        kind: String,
        /// Display glyph.
        glyph: Option<String>,
    },
    /// Read receipts were recorded.
    MessagesRead {
        /// Owning conversation.
        conversation_id: ConversationId,
        /// Reader.
        reader: Identity,
        /// Messages newly read by `reader`.
        message_ids: Vec<MessageId>,
    },
    /// Someone started typing.
    TypingStart {
        /// Conversation.
        conversation_id: ConversationId,
        /// Typing identity.
        user_id: Identity,
    },
    /// Someone stopped typing.
    TypingStop {
        /// Conversation.
        conversation_id: ConversationId,
        /// Identity that stopped.
        user_id: Identity,
    },
    /// Presence changed.
    UserPresence {
        /// Identity.
        user_id: Identity,
        /// New online state.
        online: bool,
        /// Last seen time.
        last_seen: DateTime<Utc>,
    },
    /// Unread counters of a conversation changed.
    UnreadCountsUpdated {
        /// Conversation.
        conversation_id: ConversationId,
        /// Counters of every current participant.
        unread_counts: UnreadCounts,
    },
    /// Incoming call.
    CallInvite {
        /// Conversation.
        conversation_id: ConversationId,
        /// Caller.
        from: Identity,
        /// Opaque call metadata.
        payload: CallPayload,
    },
    /// Call invitation withdrawn.
    CallCancelled {
        /// Conversation.
        conversation_id: ConversationId,
        /// Identity that cancelled.
        from: Identity,
        /// Opaque call metadata.
        payload: CallPayload,
    },
    /// Call accepted.
    CallAccepted {
        /// Conversation.
        conversation_id: ConversationId,
        /// Identity that accepted.
        from: Identity,
        /// Opaque call metadata.
        payload: CallPayload,
    },
    /// Call rejected.
    CallRejected {
        /// Conversation.
        conversation_id: ConversationId,
        /// Identity that rejected.
        from: Identity,
        /// Opaque call metadata.
        payload: CallPayload,
    },
    /// SDP/ICE payload relay.
    WebrtcSignal {
        /// Conversation.
        conversation_id: ConversationId,
        /// Sender.
        from: Identity,
        /// Opaque negotiation payload.
        payload: CallPayload,
    },
    /// A conversation was created (or reopened) with the receiver in it.
    ConversationCreated(Conversation),
    /// Conversation metadata or membership changed.
    ConversationUpdated(Conversation),
    /// The receiver is no longer a participant.
    ConversationRemoved {
        /// Conversation.
        conversation_id: ConversationId,
    },
}

impl ServerEvent {
    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Ack { .. } => "ack",
            Self::Error { .. } => "error",
            Self::Pong => "pong",
            Self::NewMessage(_) => "new_message",
            Self::MessageEdited { .. } => "message_edited",
            Self::MessageDeleted { .. } => "message_deleted",
            Self::MessageReaction { .. } => "message_reaction",
            Self::MessagesRead { .. } => "messages_read",
            Self::TypingStart { .. } => "typing_start",
            Self::TypingStop { .. } => "typing_stop",
            Self::UserPresence { .. } => "user_presence",
            Self::UnreadCountsUpdated { .. } => "unread_counts_updated",
            Self::CallInvite { .. } => "call_invite",
            Self::CallCancelled { .. } => "call_cancelled",
            Self::CallAccepted { .. } => "call_accepted",
            Self::CallRejected { .. } => "call_rejected",
            Self::WebrtcSignal { .. } => "webrtc_signal",
            Self::ConversationCreated(_) => "conversation_created",
            Self::ConversationUpdated(_) => "conversation_updated",
            Self::ConversationRemoved { .. } => "conversation_removed",
        }
    }
}
