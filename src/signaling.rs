//! Call signaling relay.
//!
//! Payloads are opaque: they are relayed verbatim to the rest of the room
//! and never stored. Call state is tracked for expiry only; an accept or
//! cancel with no invitation outstanding is relayed all the same.

use crate::error::HandlerResult;
use crate::guard;
use crate::pipeline::Actor;
use crate::state::{CallState, Matrix};
use parley_proto::{CallPayload, ConversationId, ServerEvent};
use std::time::Instant;
use tracing::debug;

/// The call intents a client can relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Invite,
    Cancel,
    Accept,
    Reject,
    /// SDP offer/answer or ICE candidate.
    Negotiation,
}

impl Signal {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Invite => "call_invite",
            Self::Cancel => "call_cancel",
            Self::Accept => "call_accept",
            Self::Reject => "call_reject",
            Self::Negotiation => "webrtc_signal",
        }
    }

    fn into_event(
        self,
        conversation_id: ConversationId,
        from: String,
        payload: CallPayload,
    ) -> ServerEvent {
        match self {
            Self::Invite => ServerEvent::CallInvite {
                conversation_id,
                from,
                payload,
            },
            Self::Cancel => ServerEvent::CallCancelled {
                conversation_id,
                from,
                payload,
            },
            Self::Accept => ServerEvent::CallAccepted {
                conversation_id,
                from,
                payload,
            },
            Self::Reject => ServerEvent::CallRejected {
                conversation_id,
                from,
                payload,
            },
            Self::Negotiation => ServerEvent::WebrtcSignal {
                conversation_id,
                from,
                payload,
            },
        }
    }
}

/// Relay a call signal to every other handle in the room.
///
/// Returns how many handles it was queued for.
pub async fn relay(
    matrix: &Matrix,
    actor: Actor<'_>,
    conversation_id: ConversationId,
    signal: Signal,
    payload: CallPayload,
) -> HandlerResult<usize> {
    let conversation =
        guard::participant_of(matrix.store.as_ref(), conversation_id, actor.identity).await?;
    if signal == Signal::Invite {
        guard::require_not_blocked(&conversation, actor.identity)?;
    }

    match signal {
        Signal::Invite => {
            let previous = matrix
                .calls
                .invite(conversation.id, actor.identity, Instant::now());
            if let CallState::Invited { caller, .. } = previous {
                debug!(conversation = %conversation.id, %caller, "Invitation replaced");
            }
        }
        Signal::Cancel | Signal::Accept | Signal::Reject => {
            if matrix.calls.resolve(conversation.id) == CallState::Idle {
                debug!(
                    conversation = %conversation.id,
                    signal = signal.as_str(),
                    "No outstanding invitation, relaying anyway"
                );
            }
        }
        Signal::Negotiation => {}
    }

    let event = signal.into_event(conversation.id, actor.identity.to_string(), payload);
    Ok(matrix.broadcast(conversation.id, event, Some(actor.conn)))
}

/// (Re)subscribe the acting handle to a conversation's room.
///
/// Covers clients that open after a call has started. Returns whether the
/// handle was newly joined.
pub async fn join_call_room(
    matrix: &Matrix,
    actor: Actor<'_>,
    conversation_id: ConversationId,
) -> HandlerResult<bool> {
    let conversation =
        guard::participant_of(matrix.store.as_ref(), conversation_id, actor.identity).await?;
    let joined = !matrix.rooms.is_member(conversation.id, actor.conn)
        && matrix.join_room(conversation.id, actor.conn);
    Ok(joined)
}
