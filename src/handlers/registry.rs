//! Event handler registry and dispatch.
//!
//! The `Registry` maps every wire event name to its handler and keeps usage
//! counters. Dispatch wraps each handler in a `parley.event` span, times it,
//! and turns the outcome into an `ack` and, on failure, a private `error`.

use super::calls::{CallSignalHandler, JoinCallRoomHandler};
use super::context::{Context, Handler};
use super::conversation::{
    AddParticipantsHandler, CreateConversationHandler, FlagHandler, RemoveParticipantHandler,
};
use super::messaging::{
    DeleteMessageHandler, EditMessageHandler, ForwardMessageHandler, MarkReadHandler,
    ReactHandler, SendMessageHandler, TypingHandler,
};
use super::misc::PingHandler;
use crate::error::{ErrorKind, HandlerError};
use crate::metrics;
use crate::signaling::Signal;
use crate::telemetry::EventTimer;
use parley_proto::{ClientFrame, ProtoError, ServerEvent};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{Instrument, Level, debug, span, warn};

/// Registry of event handlers.
pub struct Registry {
    handlers: HashMap<&'static str, Box<dyn Handler>>,
    /// Event usage counters.
    event_counts: HashMap<&'static str, Arc<AtomicU64>>,
}

impl Registry {
    /// Create a new registry with all handlers registered.
    pub fn new() -> Self {
        let mut handlers: HashMap<&'static str, Box<dyn Handler>> = HashMap::new();

        // Message pipeline
        handlers.insert("send_message", Box::new(SendMessageHandler));
        handlers.insert("edit_message", Box::new(EditMessageHandler));
        handlers.insert("delete_message", Box::new(DeleteMessageHandler));
        handlers.insert("react", Box::new(ReactHandler));
        handlers.insert("mark_read", Box::new(MarkReadHandler));
        handlers.insert("forward_message", Box::new(ForwardMessageHandler));
        handlers.insert("typing", Box::new(TypingHandler));

        // Call signaling
        handlers.insert("join_call_room", Box::new(JoinCallRoomHandler));
        handlers.insert("call_invite", Box::new(CallSignalHandler::new(Signal::Invite)));
        handlers.insert("call_cancel", Box::new(CallSignalHandler::new(Signal::Cancel)));
        handlers.insert("call_accept", Box::new(CallSignalHandler::new(Signal::Accept)));
        handlers.insert("call_reject", Box::new(CallSignalHandler::new(Signal::Reject)));
        handlers.insert(
            "webrtc_signal",
            Box::new(CallSignalHandler::new(Signal::Negotiation)),
        );

        // Conversation management
        handlers.insert("create_conversation", Box::new(CreateConversationHandler));
        handlers.insert("hide_conversation", Box::new(FlagHandler::hide()));
        handlers.insert("mute_conversation", Box::new(FlagHandler::mute()));
        handlers.insert("block_conversation", Box::new(FlagHandler::block()));
        handlers.insert("add_participants", Box::new(AddParticipantsHandler));
        handlers.insert("remove_participant", Box::new(RemoveParticipantHandler));

        handlers.insert("ping", Box::new(PingHandler));

        let mut event_counts = HashMap::new();
        for &event in handlers.keys() {
            event_counts.insert(event, Arc::new(AtomicU64::new(0)));
        }

        Self {
            handlers,
            event_counts,
        }
    }

    /// Event usage, most used first. Unused events are omitted.
    pub fn event_stats(&self) -> Vec<(&'static str, u64)> {
        let mut stats: Vec<_> = self
            .event_counts
            .iter()
            .map(|(event, count)| (*event, count.load(Ordering::Relaxed)))
            .filter(|(_, count)| *count > 0)
            .collect();
        stats.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        stats
    }

    /// Run one decoded frame to completion and reply to the caller.
    pub async fn dispatch(&self, ctx: &Context<'_>, frame: ClientFrame) {
        let event_name = frame.event.name();
        let Some(handler) = self.handlers.get(event_name) else {
            let err = HandlerError::Protocol(ProtoError::UnknownEvent {
                event: event_name.to_string(),
                ack: frame.ack,
            });
            reject(ctx, event_name, frame.ack, &err);
            return;
        };

        if let Some(counter) = self.event_counts.get(event_name) {
            counter.fetch_add(1, Ordering::Relaxed);
        }

        let event_span = span!(
            Level::DEBUG,
            "parley.event",
            event = event_name,
            conn = %ctx.conn,
            identity = %ctx.identity,
            conversation = ?frame.event.conversation_id(),
            ack = ?frame.ack,
        );

        let _timer = EventTimer::new(event_name);
        let result = handler
            .handle(ctx, frame.event)
            .instrument(event_span)
            .await;

        match result {
            Ok(data) => {
                if let Some(ack) = frame.ack {
                    ctx.reply(ServerEvent::Ack {
                        ack,
                        success: true,
                        error: None,
                        data,
                    });
                }
            }
            Err(e) => reject(ctx, event_name, frame.ack, &e),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Report a failed event to the calling handle only.
///
/// Read-marking failures are acknowledged but never produce an `error`
/// event; clients retry those silently.
pub fn reject(ctx: &Context<'_>, event: &str, ack: Option<u64>, err: &HandlerError) {
    metrics::record_event_error(event, err.error_code());
    match err.kind() {
        ErrorKind::Persistence | ErrorKind::Internal => {
            warn!(event, conn = %ctx.conn, identity = %ctx.identity, error = %err, "Event failed");
        }
        _ => debug!(event, conn = %ctx.conn, error = %err, "Event rejected"),
    }

    if event != "mark_read" {
        ctx.reply(err.to_event(event));
    }
    if let Some(ack) = ack {
        ctx.reply(ServerEvent::Ack {
            ack,
            success: false,
            error: Some(err.client_message()),
            data: None,
        });
    }
}
