//! Gateway - WebSocket listener that authenticates and admits clients.
//!
//! Authentication happens inside the upgrade handshake: a request with a
//! disallowed `Origin` gets `403`, one without a valid token gets `401`, and
//! neither ever reaches the connection registry.

use crate::config::ListenConfig;
use crate::handlers::Registry;
use crate::metrics;
use crate::network::Connection;
use crate::security::{AuthError, Authenticator, extract_token};
use crate::state::Matrix;
use parley_proto::Identity;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tracing::{debug, error, info, instrument, warn};

/// The Gateway accepts incoming connections and spawns handlers.
pub struct Gateway {
    listener: TcpListener,
    listen: Arc<ListenConfig>,
    authenticator: Arc<dyn Authenticator>,
    matrix: Arc<Matrix>,
    registry: Arc<Registry>,
}

impl Gateway {
    /// Bind the gateway to the configured address.
    pub async fn bind(
        listen: ListenConfig,
        authenticator: Arc<dyn Authenticator>,
        matrix: Arc<Matrix>,
        registry: Arc<Registry>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(listen.address).await?;
        info!(address = %listener.local_addr()?, "WebSocket listener bound");
        Ok(Self {
            listener,
            listen: Arc::new(listen),
            authenticator,
            matrix,
            registry,
        })
    }

    /// Accept connections until the server shuts down.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        let mut shutdown = self.matrix.shutdown_signal();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if self.matrix.is_shutting_down() {
                            drop(stream);
                            continue;
                        }
                        debug!(%addr, "WebSocket connection attempt");

                        let listen = Arc::clone(&self.listen);
                        let authenticator = Arc::clone(&self.authenticator);
                        let matrix = Arc::clone(&self.matrix);
                        let registry = Arc::clone(&self.registry);
                        tokio::spawn(async move {
                            handle_upgrade(stream, addr, listen, authenticator, matrix, registry)
                                .await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept WebSocket connection");
                    }
                },
                _ = shutdown.changed() => {
                    info!("Gateway stopping");
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_upgrade(
    stream: TcpStream,
    addr: SocketAddr,
    listen: Arc<ListenConfig>,
    authenticator: Arc<dyn Authenticator>,
    matrix: Arc<Matrix>,
    registry: Arc<Registry>,
) {
    let mut verified: Option<Identity> = None;

    let callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let origin = req
            .headers()
            .get(http::header::ORIGIN)
            .and_then(|o| o.to_str().ok());
        if !listen.origin_allowed(origin) {
            warn!(%addr, origin = ?origin, "WebSocket origin rejected");
            return Err(error_response(http::StatusCode::FORBIDDEN, "origin not allowed"));
        }

        let authorization = req
            .headers()
            .get(http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());
        let identity = extract_token(req.uri().query(), authorization)
            .ok_or(AuthError::Missing)
            .and_then(|token| authenticator.verify(&token));

        match identity {
            Ok(identity) => {
                verified = Some(identity);
                Ok(response)
            }
            Err(e) => {
                metrics::inc(&metrics::AUTH_REJECTED);
                warn!(%addr, error = %e, "WebSocket authentication rejected");
                Err(error_response(http::StatusCode::UNAUTHORIZED, "unauthorized"))
            }
        }
    };

    let ws_stream = match accept_hdr_async(stream, callback).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            debug!(%addr, error = %e, "WebSocket handshake failed");
            return;
        }
    };
    let Some(identity) = verified else {
        return;
    };

    info!(%addr, identity = %identity, "WebSocket handshake successful");
    let connection = Connection::new(ws_stream, addr, identity, matrix, registry);
    if let Err(e) = connection.run().await {
        warn!(%addr, error = %e, "WebSocket connection error");
    }
    debug!(%addr, "WebSocket connection closed");
}

fn error_response(status: http::StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}
