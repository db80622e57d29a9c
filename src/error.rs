//! Unified error handling for parley.
//!
//! Every operation failure maps onto one of four client-facing kinds
//! (authorization, validation, not found, persistence) plus the
//! transport-level rate limit and internal faults. Errors are signaled
//! only to the caller.

use crate::db::DbError;
use parley_proto::{ConversationId, MessageId, ProtoError, ServerEvent};
use thiserror::Error;

/// Client-facing error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authorization,
    Validation,
    NotFound,
    Persistence,
    RateLimited,
    Internal,
}

/// Errors that can occur while handling a client event.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("not a participant of conversation {0}")]
    NotParticipant(ConversationId),

    #[error("conversation {0} is blocked")]
    Blocked(ConversationId),

    #[error("only the original sender may change this message")]
    NotSender,

    #[error("only an admin may do that")]
    NotAdmin,

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Protocol(#[from] ProtoError),

    #[error("conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    #[error("message not found: {0}")]
    MessageNotFound(MessageId),

    #[error("store failure: {0}")]
    Persistence(#[from] DbError),

    #[error("rate limited")]
    RateLimited,

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }

    /// Which client-facing category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotParticipant(_) | Self::Blocked(_) | Self::NotSender | Self::NotAdmin => {
                ErrorKind::Authorization
            }
            Self::Invalid(_) | Self::Protocol(_) => ErrorKind::Validation,
            Self::ConversationNotFound(_) | Self::MessageNotFound(_) => ErrorKind::NotFound,
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::RateLimited => ErrorKind::RateLimited,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Get a static error code string for metrics labeling and the `error`
    /// event.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotParticipant(_) => "not_participant",
            Self::Blocked(_) => "blocked",
            Self::NotSender => "not_sender",
            Self::NotAdmin => "not_admin",
            Self::Invalid(_) => "invalid",
            Self::Protocol(ProtoError::Malformed(_)) => "malformed",
            Self::Protocol(ProtoError::UnknownEvent { .. }) => "unknown_event",
            Self::Protocol(_) => "invalid_payload",
            Self::ConversationNotFound(_) => "conversation_not_found",
            Self::MessageNotFound(_) => "message_not_found",
            Self::Persistence(_) => "persistence",
            Self::RateLimited => "rate_limited",
            Self::Internal(_) => "internal",
        }
    }

    /// Text shown to the client. Store failures stay generic.
    pub fn client_message(&self) -> String {
        match self {
            Self::Persistence(_) => "temporary failure, try again".to_string(),
            Self::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }

    /// The private `error` event for a failed `event`.
    pub fn to_event(&self, event: &str) -> ServerEvent {
        ServerEvent::Error {
            event: event.to_string(),
            code: self.error_code().to_string(),
            message: self.client_message(),
        }
    }
}

/// Result type for event handlers.
pub type HandlerResult<T = ()> = Result<T, HandlerError>;
