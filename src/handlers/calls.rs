//! Call signaling handlers.

use super::context::{Context, Handler, Reply, mismatched};
use crate::error::HandlerResult;
use crate::signaling::{self, Signal};
use async_trait::async_trait;
use parley_proto::ClientEvent;
use serde_json::json;

pub struct JoinCallRoomHandler;

#[async_trait]
impl Handler for JoinCallRoomHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult<Reply> {
        let ClientEvent::JoinCallRoom { conversation_id } = event else {
            return Err(mismatched("join_call_room", &event));
        };
        let joined = signaling::join_call_room(ctx.matrix, ctx.actor(), conversation_id).await?;
        Ok(Some(json!({ "joined": joined })))
    }
}

/// Relays one kind of call signal.
pub struct CallSignalHandler {
    signal: Signal,
}

impl CallSignalHandler {
    pub fn new(signal: Signal) -> Self {
        Self { signal }
    }
}

#[async_trait]
impl Handler for CallSignalHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult<Reply> {
        let (conversation_id, payload) = match (self.signal, event) {
            (Signal::Invite, ClientEvent::CallInvite { conversation_id, payload })
            | (Signal::Cancel, ClientEvent::CallCancel { conversation_id, payload })
            | (Signal::Accept, ClientEvent::CallAccept { conversation_id, payload })
            | (Signal::Reject, ClientEvent::CallReject { conversation_id, payload })
            | (Signal::Negotiation, ClientEvent::WebrtcSignal { conversation_id, payload }) => {
                (conversation_id, payload)
            }
            (_, event) => return Err(mismatched(self.signal.as_str(), &event)),
        };
        let delivered =
            signaling::relay(ctx.matrix, ctx.actor(), conversation_id, self.signal, payload)
                .await?;
        Ok(Some(json!({ "delivered": delivered })))
    }
}
