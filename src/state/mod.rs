//! State management module.
//!
//! Contains the Matrix (shared server state) and the in-memory structures it
//! owns: connection registry, room broadcaster, typing and call trackers.
//! None of this is persisted; it is rebuilt from the store as clients
//! reconnect.

mod calls;
mod lifecycle;
mod matrix;
mod registry;
mod rooms;
mod typing;

pub use calls::{CallState, CallTracker};
pub use matrix::Matrix;
#[cfg(test)]
pub(crate) use matrix::test_support;
pub use registry::{AdmitError, ConnectionRegistry, Frame, Outbound};
pub use rooms::RoomBroadcaster;
pub use typing::TypingTracker;
