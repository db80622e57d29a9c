use crate::ids::{ConnectionId, Identity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Online state of one identity, independent of any single connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPresence {
    /// Identity.
    pub identity: Identity,
    /// Whether at least one handle is live.
    pub online: bool,
    /// Last connect/disconnect time.
    pub last_seen: DateTime<Utc>,
    /// Most recently admitted handle, for diagnostics.
    pub connection: Option<ConnectionId>,
}
