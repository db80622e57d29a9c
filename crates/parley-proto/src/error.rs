//! Error types for frame encoding and decoding.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtoError`].
pub type Result<T, E = ProtoError> = std::result::Result<T, E>;

/// Frame codec errors.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// The frame is not a JSON object with an `event` field.
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The event name is not part of the protocol.
    #[error("unknown event: {event}")]
    UnknownEvent {
        /// Event name.
        event: String,
        /// Ack id the frame carried.
        ack: Option<u64>,
    },

    /// The event is known but its payload does not match the schema.
    #[error("invalid payload for {event}: {reason}")]
    InvalidPayload {
        /// Event name.
        event: String,
        /// Ack id the frame carried.
        ack: Option<u64>,
        /// Decoder message.
        reason: String,
    },

    /// Serialization failed.
    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ProtoError {
    /// Event name the error relates to, when it could be determined.
    pub fn event_name(&self) -> Option<&str> {
        match self {
            Self::UnknownEvent { event, .. } | Self::InvalidPayload { event, .. } => Some(event),
            Self::Malformed(_) | Self::Encode(_) => None,
        }
    }

    /// Ack id of a frame that parsed far enough to carry one.
    pub fn ack(&self) -> Option<u64> {
        match self {
            Self::UnknownEvent { ack, .. } | Self::InvalidPayload { ack, .. } => *ack,
            Self::Malformed(_) | Self::Encode(_) => None,
        }
    }
}
