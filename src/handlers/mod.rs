//! Client event handlers.
//!
//! One handler per event name, registered in a single typed table. The
//! registry owns instrumentation, acknowledgements and error replies; the
//! handlers only translate a [`ClientEvent`](parley_proto::ClientEvent)
//! into a pipeline, membership or signaling call.

mod calls;
mod context;
mod conversation;
mod messaging;
mod misc;
mod registry;

pub use context::Context;
pub use registry::{Registry, reject};
