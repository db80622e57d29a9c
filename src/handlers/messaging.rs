//! Message pipeline handlers.

use super::context::{Context, Handler, Reply, mismatched, reply_with};
use crate::error::HandlerResult;
use crate::pipeline::{self, ReadTarget};
use async_trait::async_trait;
use parley_proto::ClientEvent;
use serde_json::json;

pub struct SendMessageHandler;

#[async_trait]
impl Handler for SendMessageHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult<Reply> {
        let ClientEvent::SendMessage {
            conversation_id,
            body,
        } = event
        else {
            return Err(mismatched("send_message", &event));
        };
        let message = pipeline::send(ctx.matrix, ctx.actor(), conversation_id, body).await?;
        reply_with(&message.client_view())
    }
}

pub struct EditMessageHandler;

#[async_trait]
impl Handler for EditMessageHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult<Reply> {
        let ClientEvent::EditMessage { message_id, text } = event else {
            return Err(mismatched("edit_message", &event));
        };
        let message = pipeline::edit(ctx.matrix, ctx.actor(), message_id, text).await?;
        reply_with(&message.client_view())
    }
}

pub struct DeleteMessageHandler;

#[async_trait]
impl Handler for DeleteMessageHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult<Reply> {
        let ClientEvent::DeleteMessage { message_id } = event else {
            return Err(mismatched("delete_message", &event));
        };
        let message = pipeline::delete(ctx.matrix, ctx.actor(), message_id).await?;
        reply_with(&message)
    }
}

pub struct ReactHandler;

#[async_trait]
impl Handler for ReactHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult<Reply> {
        let ClientEvent::React {
            message_id,
            kind,
            glyph,
        } = event
        else {
            return Err(mismatched("react", &event));
        };
        let message = pipeline::react(ctx.matrix, ctx.actor(), message_id, kind, glyph).await?;
        reply_with(&message.client_view())
    }
}

pub struct MarkReadHandler;

#[async_trait]
impl Handler for MarkReadHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult<Reply> {
        let ClientEvent::MarkRead {
            conversation_id,
            message_id,
        } = event
        else {
            return Err(mismatched("mark_read", &event));
        };
        let target = ReadTarget::from_request(conversation_id, message_id)?;
        let newly_read = pipeline::mark_read(ctx.matrix, ctx.actor(), target).await?;
        Ok(Some(json!({ "message_ids": newly_read })))
    }
}

pub struct ForwardMessageHandler;

#[async_trait]
impl Handler for ForwardMessageHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult<Reply> {
        let ClientEvent::ForwardMessage {
            message_id,
            target_conversation_id,
        } = event
        else {
            return Err(mismatched("forward_message", &event));
        };
        let message =
            pipeline::forward(ctx.matrix, ctx.actor(), message_id, target_conversation_id).await?;
        reply_with(&message.client_view())
    }
}

pub struct TypingHandler;

#[async_trait]
impl Handler for TypingHandler {
    async fn handle(&self, ctx: &Context<'_>, event: ClientEvent) -> HandlerResult<Reply> {
        let ClientEvent::Typing {
            conversation_id,
            is_typing,
        } = event
        else {
            return Err(mismatched("typing", &event));
        };
        pipeline::typing(ctx.matrix, ctx.actor(), conversation_id, is_typing).await?;
        Ok(None)
    }
}
