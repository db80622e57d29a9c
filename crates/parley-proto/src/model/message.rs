use super::IdentitySet;
use crate::ids::{ConversationId, Identity, MessageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of content a message carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Plain text; requires non-blank text.
    #[default]
    Text,
    /// Image attachment.
    Image,
    /// Generic file attachment.
    File,
    /// Voice note.
    Voice,
    /// Video attachment.
    Video,
}

impl ContentKind {
    /// Storage/wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::Voice => "voice",
            Self::Video => "video",
        }
    }

    /// Parse the storage name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "file" => Some(Self::File),
            "voice" => Some(Self::Voice),
            "video" => Some(Self::Video),
            _ => None,
        }
    }

    /// Whether this kind needs a media reference.
    pub const fn requires_media(&self) -> bool {
        !matches!(self, Self::Text)
    }
}

/// One user's reaction to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    /// Reaction kind (e.g. "like").
    pub kind: String,
    /// Display glyph (e.g. an emoji).
    pub glyph: Option<String>,
}

/// Reactions keyed by identity. Absent means no reaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reactions(BTreeMap<Identity, Reaction>);

impl Reactions {
    /// Create an empty reaction map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reaction of `identity`, if any.
    pub fn get(&self, identity: &str) -> Option<&Reaction> {
        self.0.get(identity)
    }

    /// Insert or replace the reaction of `identity`.
    pub fn set(&mut self, identity: impl Into<Identity>, reaction: Reaction) {
        self.0.insert(identity.into(), reaction);
    }

    /// Remove the reaction of `identity`.
    pub fn remove(&mut self, identity: &str) -> Option<Reaction> {
        self.0.remove(identity)
    }

    /// Number of reacting identities.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nobody reacted.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(identity, reaction)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Identity, &Reaction)> {
        self.0.iter()
    }
}

/// Where a forwarded message came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardOrigin {
    /// Message this one was copied from.
    pub original_message_id: MessageId,
    /// Author of the original content.
    pub original_sender: Identity,
}

/// A persisted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message id.
    pub id: MessageId,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Author.
    pub sender: Identity,
    /// Text content, possibly empty when media is present.
    pub text: String,
    /// Content kind.
    pub content_kind: ContentKind,
    /// Media reference (URL or storage key).
    pub media_url: Option<String>,
    /// Original file name.
    pub file_name: Option<String>,
    /// File size in bytes.
    pub file_size: Option<u64>,
    /// Duration in seconds for voice/video.
    pub duration: Option<f64>,
    /// Message this one replies to.
    pub reply_to: Option<MessageId>,
    /// Forwarding provenance.
    pub forward: Option<ForwardOrigin>,
    /// Reactions by identity.
    pub reactions: Reactions,
    /// Identities that read the message. Only grows.
    pub read_by: IdentitySet,
    /// Identities the message was delivered to. Only grows.
    pub delivered_to: IdentitySet,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last edit.
    pub edited_at: Option<DateTime<Utc>>,
    /// Time of the soft delete.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Whether the message was edited.
    pub fn is_edited(&self) -> bool {
        self.edited_at.is_some()
    }

    /// Whether the message was soft deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the message was forwarded from another conversation.
    pub fn is_forwarded(&self) -> bool {
        self.forward.is_some()
    }

    /// The message as clients may see it.
    ///
    /// Deleted messages keep their id, sender, position and flags but lose
    /// their content.
    pub fn client_view(&self) -> Message {
        let mut view = self.clone();
        if view.is_deleted() {
            view.text.clear();
            view.media_url = None;
            view.file_name = None;
            view.file_size = None;
            view.duration = None;
            view.reactions = Reactions::new();
        }
        view
    }
}
