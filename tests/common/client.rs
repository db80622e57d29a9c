//! Test WebSocket client.
//!
//! Mints its own tokens with the shared secret, sends client frames and
//! asserts on received server events.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use futures_util::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use parley_proto::{
    ClientEvent, ClientFrame, ServerEvent, decode_server_event, encode_client_frame,
};
use sha2::Sha256;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// Sign `<identity>.<expiry>` the way the auth service does.
pub fn mint_token(identity: &str, secret: &str, expires_at: i64) -> String {
    let payload = format!("{identity}.{expires_at}");
    let mut mac =
        <Hmac<Sha256> as Mac>::new_from_slice(secret.as_bytes()).expect("any key length");
    mac.update(payload.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    format!("{payload}.{signature}")
}

/// A token valid for the next hour.
pub fn fresh_token(identity: &str, secret: &str) -> String {
    mint_token(identity, secret, chrono::Utc::now().timestamp() + 3600)
}

/// A test client.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pub identity: String,
    next_ack: u64,
}

impl TestClient {
    /// Connect with a `?token=` query and consume the `ready` event.
    pub async fn connect(url: &str, identity: &str, secret: &str) -> anyhow::Result<Self> {
        let token = fresh_token(identity, secret);
        let (ws, _) = connect_async(format!("{url}?token={token}")).await?;
        let mut client = Self {
            ws,
            identity: identity.to_string(),
            next_ack: 1,
        };
        match client.recv().await? {
            ServerEvent::Ready { .. } => Ok(client),
            other => anyhow::bail!("expected ready, got {other:?}"),
        }
    }

    /// Attempt an upgrade with an arbitrary `Authorization` header and
    /// return the HTTP status the server answered with.
    pub async fn handshake_status(url: &str, authorization: Option<&str>) -> anyhow::Result<u16> {
        let mut request = url.into_client_request()?;
        if let Some(value) = authorization {
            request
                .headers_mut()
                .insert(http::header::AUTHORIZATION, value.parse()?);
        }
        match connect_async(request).await {
            Ok((_, response)) => Ok(response.status().as_u16()),
            Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
                Ok(response.status().as_u16())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Send an event without an ack id.
    pub async fn send(&mut self, event: ClientEvent) -> anyhow::Result<()> {
        self.send_frame(ClientFrame { ack: None, event }).await
    }

    /// Send an event with a fresh ack id and return that id.
    pub async fn request(&mut self, event: ClientEvent) -> anyhow::Result<u64> {
        let ack = self.next_ack;
        self.next_ack += 1;
        self.send_frame(ClientFrame {
            ack: Some(ack),
            event,
        })
        .await?;
        Ok(ack)
    }

    /// Send a raw text frame.
    pub async fn send_raw(&mut self, text: &str) -> anyhow::Result<()> {
        self.ws.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    async fn send_frame(&mut self, frame: ClientFrame) -> anyhow::Result<()> {
        let text = encode_client_frame(&frame)?;
        self.send_raw(&text).await
    }

    /// Receive a single event from the server.
    pub async fn recv(&mut self) -> anyhow::Result<ServerEvent> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive an event with a timeout.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<ServerEvent> {
        loop {
            let message = timeout(dur, self.ws.next())
                .await?
                .ok_or_else(|| anyhow::anyhow!("connection closed"))??;
            if let Message::Text(text) = message {
                return Ok(decode_server_event(&text)?);
            }
        }
    }

    /// Receive events until the predicate matches; returns the matching one.
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<ServerEvent>
    where
        F: FnMut(&ServerEvent) -> bool,
    {
        loop {
            let event = self.recv().await?;
            if predicate(&event) {
                return Ok(event);
            }
        }
    }

    /// Wait for the ack with id `ack`.
    pub async fn ack(&mut self, ack: u64) -> anyhow::Result<ServerEvent> {
        self.recv_until(|e| matches!(e, ServerEvent::Ack { ack: id, .. } if *id == ack))
            .await
    }

    /// Assert nothing arrives within `dur`.
    #[allow(dead_code)]
    pub async fn expect_silence(&mut self, dur: Duration) -> anyhow::Result<()> {
        match self.recv_timeout(dur).await {
            Ok(event) => anyhow::bail!("unexpected event: {event:?}"),
            Err(_) => Ok(()),
        }
    }

    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
