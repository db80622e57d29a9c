//! Conversation management handlers.

use super::context::{Context, Handler, Reply, mismatched, reply_with};
use crate::error::HandlerResult;
use crate::membership::{self, Flag};
use async_trait::async_trait;
use parley_proto::ClientEvent;

pub struct CreateConversationHandler;

#[async_trait]
impl Handler for CreateConversationHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult<Reply> {
        let ClientEvent::CreateConversation {
            kind,
            participants,
            name,
        } = event
        else {
            return Err(mismatched("create_conversation", &event));
        };
        let conversation =
            membership::create(ctx.matrix, ctx.actor(), kind, participants, name).await?;
        reply_with(&conversation)
    }
}

/// Handles `hide_conversation`, `mute_conversation` and `block_conversation`.
pub struct FlagHandler {
    flag: Flag,
}

impl FlagHandler {
    pub fn hide() -> Self {
        Self { flag: Flag::Hidden }
    }

    pub fn mute() -> Self {
        Self { flag: Flag::Muted }
    }

    pub fn block() -> Self {
        Self {
            flag: Flag::Blocked,
        }
    }
}

#[async_trait]
impl Handler for FlagHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult<Reply> {
        let (conversation_id, on) = match (self.flag, &event) {
            (Flag::Hidden, ClientEvent::HideConversation { conversation_id }) => {
                (*conversation_id, true)
            }
            (
                Flag::Muted,
                ClientEvent::MuteConversation {
                    conversation_id,
                    muted,
                },
            ) => (*conversation_id, *muted),
            (
                Flag::Blocked,
                ClientEvent::BlockConversation {
                    conversation_id,
                    blocked,
                },
            ) => (*conversation_id, *blocked),
            _ => return Err(mismatched("conversation flag", &event)),
        };
        let conversation =
            membership::set_flag(ctx.matrix, ctx.actor(), conversation_id, self.flag, on).await?;
        reply_with(&conversation)
    }
}

pub struct AddParticipantsHandler;

#[async_trait]
impl Handler for AddParticipantsHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult<Reply> {
        let ClientEvent::AddParticipants {
            conversation_id,
            identities,
        } = event
        else {
            return Err(mismatched("add_participants", &event));
        };
        let conversation =
            membership::add_participants(ctx.matrix, ctx.actor(), conversation_id, identities)
                .await?;
        reply_with(&conversation)
    }
}

pub struct RemoveParticipantHandler;

#[async_trait]
impl Handler for RemoveParticipantHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult<Reply> {
        let ClientEvent::RemoveParticipant {
            conversation_id,
            identity,
        } = event
        else {
            return Err(mismatched("remove_participant", &event));
        };
        let conversation =
            membership::remove_participant(ctx.matrix, ctx.actor(), conversation_id, &identity)
                .await?;
        reply_with(&conversation)
    }
}
