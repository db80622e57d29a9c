//! Handler context and trait.

use crate::error::{HandlerError, HandlerResult};
use crate::pipeline::Actor;
use crate::state::Matrix;
use async_trait::async_trait;
use parley_proto::{ClientEvent, ConnectionId, ServerEvent};
use serde::Serialize;
use std::sync::Arc;

/// Ack payload returned by a successful handler.
pub type Reply = Option<serde_json::Value>;

/// Context passed to each handler.
pub struct Context<'a> {
    /// Shared server state.
    pub matrix: &'a Arc<Matrix>,
    /// The handle the event arrived on.
    pub conn: ConnectionId,
    /// Verified identity of that handle.
    pub identity: &'a str,
}

impl<'a> Context<'a> {
    pub fn new(matrix: &'a Arc<Matrix>, conn: ConnectionId, identity: &'a str) -> Self {
        Self {
            matrix,
            conn,
            identity,
        }
    }

    pub fn actor(&self) -> Actor<'_> {
        Actor::new(self.conn, self.identity)
    }

    /// Queue a private frame for the calling handle.
    pub fn reply(&self, event: ServerEvent) -> bool {
        self.matrix.send_to(self.conn, event)
    }
}

/// Trait implemented by all event handlers.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult<Reply>;
}

/// Serialize an ack payload.
pub(super) fn reply_with<T: Serialize>(value: &T) -> HandlerResult<Reply> {
    serde_json::to_value(value)
        .map(Some)
        .map_err(|e| HandlerError::Internal(format!("encoding ack data: {e}")))
}

/// A handler was given an event it is not registered for.
pub(super) fn mismatched(expected: &str, event: &ClientEvent) -> HandlerError {
    HandlerError::Internal(format!(
        "{expected} handler received {}",
        event.name()
    ))
}
