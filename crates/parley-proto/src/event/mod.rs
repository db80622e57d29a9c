//! Client requests and server events.
//!
//! Both directions are closed tagged unions: `{"event": <name>, "data": {...}}`.

mod client;
mod server;

pub use client::{ClientEvent, MessageBody};
pub use server::ServerEvent;

/// Opaque call negotiation payload (SDP offer/answer, ICE candidate, call
/// metadata). Relayed verbatim, never inspected.
pub type CallPayload = serde_json::Value;
