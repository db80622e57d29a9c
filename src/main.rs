//! parleyd - real-time messaging coordination daemon.
//!
//! Accepts authenticated WebSocket connections, fans conversation events out
//! to every participant's live handles, and persists messages and
//! conversation state through a pluggable store.

mod config;
mod db;
mod error;
mod guard;
mod handlers;
mod http;
mod membership;
mod metrics;
mod network;
mod pipeline;
mod security;
mod signaling;
mod state;
mod telemetry;

use crate::config::{Config, StoreBackend, validate};
use crate::db::{Database, MemoryStore, Store};
use crate::handlers::Registry;
use crate::network::Gateway;
use crate::security::{Authenticator, HmacAuthenticator};
use crate::state::Matrix;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        eprintln!("Failed to load config {config_path}: {e}");
        e
    })?;

    telemetry::init_logging(config.server.log_format);

    if let Err(errors) = validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s) in {config_path}", errors.len());
    }

    info!(server = %config.server.name, "Starting parleyd");

    metrics::init();

    // Initialize store
    let store: Arc<dyn Store> = match config.database.backend {
        StoreBackend::Sqlite => {
            let db = Database::new(&config.database.path).await?;
            info!(path = %config.database.path, "SQLite store opened");
            Arc::new(db)
        }
        StoreBackend::Memory => {
            warn!("Memory store selected; nothing survives a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let matrix = Arc::new(Matrix::new(&config, store));

    // Expire typing indicators and unanswered call invites (runs every second)
    {
        let matrix = Arc::clone(&matrix);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                if matrix.is_shutting_down() {
                    break;
                }
                let expired = matrix.sweep(Instant::now());
                if expired > 0 {
                    debug!(expired, "Stale typing indicators cleared");
                }
            }
        });
    }

    // Convention: metrics_port = 0 disables the HTTP endpoint (used by tests).
    let metrics_port = config.server.metrics_port;
    if metrics_port == 0 {
        info!("Metrics endpoint disabled");
    } else {
        tokio::spawn(async move {
            http::run_http_server(metrics_port).await;
        });
    }

    let authenticator: Arc<dyn Authenticator> = Arc::new(HmacAuthenticator::new(
        &config.auth.secret,
        config.auth.max_clock_skew_secs,
    ));
    let registry = Arc::new(Registry::new());

    let gateway = Gateway::bind(
        config.listen.clone(),
        authenticator,
        Arc::clone(&matrix),
        Arc::clone(&registry),
    )
    .await?;

    tokio::select! {
        result = gateway.run() => {
            if let Err(e) = result {
                error!(error = %e, "Gateway failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
        }
    }

    matrix.shutdown().await;

    for (event, count) in registry.event_stats() {
        info!(event, count, "Event usage");
    }

    Ok(())
}
