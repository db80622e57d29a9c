//! Connection - drives one authenticated WebSocket.
//!
//! ```text
//!   ws source ──decode──▶ rate limit ──spawn──▶ Registry::dispatch
//!                                                     │
//!   ws sink ◀──encode── outbound queue ◀──────────────┘ (and broadcasts)
//! ```
//!
//! Each inbound event runs in its own task so a slow store call never
//! stalls the outbound side of the socket.

use crate::error::HandlerError;
use crate::handlers::{Context, Registry, reject};
use crate::metrics;
use crate::state::{Frame, Matrix};
use crate::telemetry::spans;
use futures_util::{SinkExt, StreamExt};
use parley_proto::{
    ConnectionId, Identity, ProtoError, decode_client_frame, encode_server_event,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{Instrument, Span, debug, info, warn};

/// A client connection handler.
pub struct Connection {
    stream: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    identity: Identity,
    matrix: Arc<Matrix>,
    registry: Arc<Registry>,
}

impl Connection {
    pub fn new(
        stream: WebSocketStream<TcpStream>,
        addr: SocketAddr,
        identity: Identity,
        matrix: Arc<Matrix>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            stream,
            addr,
            identity,
            matrix,
            registry,
        }
    }

    /// Admit the handle, run its event loop, and tear it down on exit.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let (tx, rx) = self.matrix.outbound_channel();
        let id = match self.matrix.admit(&self.identity, tx).await {
            Ok(id) => id,
            Err(e) => {
                warn!(addr = %self.addr, identity = %self.identity, error = %e, "Admission refused");
                let _ = self.stream.close(None).await;
                return Ok(());
            }
        };

        let span = spans::connection(id, &self.identity);
        let result = self.event_loop(id, rx).instrument(span).await;
        self.matrix.disconnect(id).await;
        result
    }

    async fn event_loop(
        &mut self,
        id: ConnectionId,
        mut outbound: mpsc::Receiver<Frame>,
    ) -> anyhow::Result<()> {
        info!(addr = %self.addr, "Client connected");
        let mut shutdown = self.matrix.shutdown_signal();
        let (mut sink, mut source) = (&mut self.stream).split();

        loop {
            tokio::select! {
                incoming = source.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        on_text(&self.matrix, &self.registry, id, &self.identity, &text);
                    }
                    Some(Ok(Message::Binary(_))) => {
                        let ctx = Context::new(&self.matrix, id, &self.identity);
                        let err = HandlerError::invalid("binary frames are not supported");
                        reject(&ctx, "unknown", None, &err);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Client closed the socket");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "WebSocket read failed");
                        break;
                    }
                },
                frame = outbound.recv() => match frame {
                    Some(frame) => {
                        let text = encode_server_event(&frame)?;
                        sink.send(Message::Text(text)).await?;
                    }
                    None => break,
                },
                _ = shutdown.changed() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }

        info!("Client disconnected");
        Ok(())
    }
}

/// Decode one text frame, apply the inbound rate limit, and hand it off.
fn on_text(
    matrix: &Arc<Matrix>,
    registry: &Arc<Registry>,
    id: ConnectionId,
    identity: &str,
    text: &str,
) {
    let ctx = Context::new(matrix, id, identity);

    let frame = match decode_client_frame(text) {
        Ok(frame) => frame,
        Err(e) => {
            let event = match &e {
                ProtoError::InvalidPayload { event, .. } => event.clone(),
                _ => "unknown".to_string(),
            };
            let ack = e.ack();
            reject(&ctx, &event, ack, &HandlerError::Protocol(e));
            return;
        }
    };

    if !matrix.rate_limiter.check_event_rate(id) {
        metrics::inc(&metrics::RATE_LIMITED);
        reject(&ctx, frame.event.name(), frame.ack, &HandlerError::RateLimited);
        return;
    }

    let matrix = Arc::clone(matrix);
    let registry = Arc::clone(registry);
    let identity = identity.to_string();
    tokio::spawn(
        async move {
            let ctx = Context::new(&matrix, id, &identity);
            registry.dispatch(&ctx, frame).await;
        }
        .instrument(Span::current()),
    );
}
