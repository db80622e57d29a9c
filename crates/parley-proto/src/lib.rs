//! # parley-proto
//!
//! Wire types for the parley real-time messaging core.
//!
//! ## Features
//!
//! - Strongly typed identifiers for conversations, messages and connections
//! - The persisted data model (conversations, messages, presence) with
//!   explicit "absent means default" map and set types
//! - A closed union of client requests and server events
//! - A JSON frame codec that rejects unknown event names explicitly
//!
//! ## Quick Start
//!
//! ```rust
//! use parley_proto::{decode_client_frame, ClientEvent};
//!
//! let raw = r#"{"event":"typing","ack":1,"data":{"conversation_id":"2c3d8f5e-4b3a-4c2e-9d1f-0a1b2c3d4e5f","is_typing":true}}"#;
//! let frame = decode_client_frame(raw).expect("valid frame");
//! assert_eq!(frame.ack, Some(1));
//! assert!(matches!(frame.event, ClientEvent::Typing { is_typing: true, .. }));
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod event;
pub mod ids;
pub mod model;

pub use codec::{
    decode_client_frame, decode_server_event, encode_client_frame, encode_server_event, ClientFrame,
};
pub use error::{ProtoError, Result};
pub use event::{CallPayload, ClientEvent, MessageBody, ServerEvent};
pub use ids::{ConnectionId, ConversationId, Identity, MessageId};
pub use model::{
    ContentKind, Conversation, ConversationKind, ForwardOrigin, IdentitySet, LastMessage, Message,
    Reaction, Reactions, UnreadCounts, UserPresence,
};
