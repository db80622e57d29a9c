//! Network module.
//!
//! Contains the Gateway (WebSocket listener and handshake authentication)
//! and the per-connection event loop.

mod connection;
mod gateway;

pub use connection::Connection;
pub use gateway::Gateway;
