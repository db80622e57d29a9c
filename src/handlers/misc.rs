use super::context::{Context, Handler, Reply};
use crate::error::HandlerResult;
use async_trait::async_trait;
use parley_proto::{ClientEvent, ServerEvent};

pub struct PingHandler;

#[async_trait]
impl Handler for PingHandler {
    async fn handle(&self, ctx: &Context<'_>, _event: ClientEvent) -> HandlerResult<Reply> {
        ctx.reply(ServerEvent::Pong);
        Ok(None)
    }
}
