use super::CallPayload;
use crate::ids::{ConversationId, Identity, MessageId};
use crate::model::{ContentKind, ConversationKind};
use serde::{Deserialize, Serialize};

/// Content of a new message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    /// Text, may be empty for media messages.
    #[serde(default)]
    pub text: String,
    /// Content kind, defaults to text.
    #[serde(default)]
    pub content_kind: ContentKind,
    /// Media reference from the upload collaborator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    /// Original file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// File size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    /// Duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Message being replied to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
}

impl MessageBody {
    /// Plain text body.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Requests a connected client may issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Post a new message.
    SendMessage {
        /// Target conversation.
        conversation_id: ConversationId,
        /// Message content.
        body: MessageBody,
    },
    /// Replace the text of one's own message.
    EditMessage {
        /// Message to edit.
        message_id: MessageId,
        /// New text.
        text: String,
    },
    /// Soft delete one's own message.
    DeleteMessage {
        /// Message to delete.
        message_id: MessageId,
    },
    /// Set or clear (kind `"remove"`) one's reaction.
    React {
        /// Target message.
        message_id: MessageId,
        /// Reaction kind.
        kind: String,
        /// Display glyph.
        #[serde(default)]
        glyph: Option<String>,
    },
    /// Mark a whole conversation or a single message as read.
    MarkRead {
        /// Conversation-scoped form.
        #[serde(default)]
        conversation_id: Option<ConversationId>,
        /// Message-scoped form.
        #[serde(default)]
        message_id: Option<MessageId>,
    },
    /// Copy a message into another conversation.
    ForwardMessage {
        /// Source message.
        message_id: MessageId,
        /// Destination conversation.
        target_conversation_id: ConversationId,
    },
    /// Typing indicator.
    Typing {
        /// Conversation being typed in.
        conversation_id: ConversationId,
        /// Started (`true`) or stopped typing.
        is_typing: bool,
    },
    /// (Re)subscribe this handle to a conversation's room before signaling.
    JoinCallRoom {
        /// Conversation hosting the call.
        conversation_id: ConversationId,
    },
    /// Ring the other participants.
    CallInvite {
        /// Conversation hosting the call.
        conversation_id: ConversationId,
        /// Opaque call metadata.
        #[serde(default)]
        payload: CallPayload,
    },
    /// Caller withdrew the invitation.
    CallCancel {
        /// Conversation hosting the call.
        conversation_id: ConversationId,
        /// Opaque call metadata.
        #[serde(default)]
        payload: CallPayload,
    },
    /// Callee accepted.
    CallAccept {
        /// Conversation hosting the call.
        conversation_id: ConversationId,
        /// Opaque call metadata.
        #[serde(default)]
        payload: CallPayload,
    },
    /// Callee declined.
    CallReject {
        /// Conversation hosting the call.
        conversation_id: ConversationId,
        /// Opaque call metadata.
        #[serde(default)]
        payload: CallPayload,
    },
    /// SDP/ICE negotiation payload.
    WebrtcSignal {
        /// Conversation hosting the call.
        conversation_id: ConversationId,
        /// Opaque negotiation payload.
        payload: CallPayload,
    },
    /// Open a direct conversation or create a group.
    CreateConversation {
        /// Direct or group.
        kind: ConversationKind,
        /// Other participants; the caller is always included.
        participants: Vec<Identity>,
        /// Display name, required for groups.
        #[serde(default)]
        name: Option<String>,
    },
    /// Hide a conversation for the caller only.
    HideConversation {
        /// Conversation to hide.
        conversation_id: ConversationId,
    },
    /// Toggle the caller's mute flag.
    MuteConversation {
        /// Target conversation.
        conversation_id: ConversationId,
        /// New flag value.
        muted: bool,
    },
    /// Toggle the caller's block flag.
    BlockConversation {
        /// Target conversation.
        conversation_id: ConversationId,
        /// New flag value.
        blocked: bool,
    },
    /// Add members to a group (admins only).
    AddParticipants {
        /// Target group.
        conversation_id: ConversationId,
        /// Identities to add.
        identities: Vec<Identity>,
    },
    /// Remove a member from a group (admins, or oneself to leave).
    RemoveParticipant {
        /// Target group.
        conversation_id: ConversationId,
        /// Identity to remove.
        identity: Identity,
    },
    /// Liveness probe.
    Ping,
}

impl ClientEvent {
    /// Every event name accepted on the wire.
    pub const NAMES: &'static [&'static str] = &[
        "send_message",
        "edit_message",
        "delete_message",
        "react",
        "mark_read",
        "forward_message",
        "typing",
        "join_call_room",
        "call_invite",
        "call_cancel",
        "call_accept",
        "call_reject",
        "webrtc_signal",
        "create_conversation",
        "hide_conversation",
        "mute_conversation",
        "block_conversation",
        "add_participants",
        "remove_participant",
        "ping",
    ];

    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SendMessage { .. } => "send_message",
            Self::EditMessage { .. } => "edit_message",
            Self::DeleteMessage { .. } => "delete_message",
            Self::React { .. } => "react",
            Self::MarkRead { .. } => "mark_read",
            Self::ForwardMessage { .. } => "forward_message",
            Self::Typing { .. } => "typing",
            Self::JoinCallRoom { .. } => "join_call_room",
            Self::CallInvite { .. } => "call_invite",
            Self::CallCancel { .. } => "call_cancel",
            Self::CallAccept { .. } => "call_accept",
            Self::CallReject { .. } => "call_reject",
            Self::WebrtcSignal { .. } => "webrtc_signal",
            Self::CreateConversation { .. } => "create_conversation",
            Self::HideConversation { .. } => "hide_conversation",
            Self::MuteConversation { .. } => "mute_conversation",
            Self::BlockConversation { .. } => "block_conversation",
            Self::AddParticipants { .. } => "add_participants",
            Self::RemoveParticipant { .. } => "remove_participant",
            Self::Ping => "ping",
        }
    }

    /// Whether `name` is a known event.
    pub fn is_known(name: &str) -> bool {
        Self::NAMES.contains(&name)
    }

    /// Conversation the event targets directly, if any.
    pub fn conversation_id(&self) -> Option<ConversationId> {
        match self {
            Self::SendMessage { conversation_id, .. }
            | Self::Typing { conversation_id, .. }
            | Self::JoinCallRoom { conversation_id }
            | Self::CallInvite { conversation_id, .. }
            | Self::CallCancel { conversation_id, .. }
            | Self::CallAccept { conversation_id, .. }
            | Self::CallReject { conversation_id, .. }
            | Self::WebrtcSignal { conversation_id, .. }
            | Self::HideConversation { conversation_id }
            | Self::MuteConversation { conversation_id, .. }
            | Self::BlockConversation { conversation_id, .. }
            | Self::AddParticipants { conversation_id, .. }
            | Self::RemoveParticipant { conversation_id, .. } => Some(*conversation_id),
            Self::MarkRead { conversation_id, .. } => *conversation_id,
            Self::ForwardMessage {
                target_conversation_id,
                ..
            } => Some(*target_conversation_id),
            Self::EditMessage { .. }
            | Self::DeleteMessage { .. }
            | Self::React { .. }
            | Self::CreateConversation { .. }
            | Self::Ping => None,
        }
    }
}
