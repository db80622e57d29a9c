//! Persisted data model.
//!
//! Per-identity maps and sets are explicit types with "absent means default"
//! semantics: a missing unread counter reads as zero, a missing reaction reads
//! as no reaction, a missing flag reads as unset.

mod conversation;
mod message;
mod presence;

pub use conversation::{Conversation, ConversationKind, LastMessage, UnreadCounts};
pub use message::{ContentKind, ForwardOrigin, Message, Reaction, Reactions};
pub use presence::UserPresence;

use crate::ids::Identity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Ordered set of identities.
///
/// Used for read receipts, deliveries and per-user conversation flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentitySet(BTreeSet<Identity>);

impl IdentitySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Membership test.
    pub fn contains(&self, identity: &str) -> bool {
        self.0.contains(identity)
    }

    /// Insert an identity, returning `true` if it was not already present.
    pub fn insert(&mut self, identity: impl Into<Identity>) -> bool {
        self.0.insert(identity.into())
    }

    /// Remove an identity, returning `true` if it was present.
    pub fn remove(&mut self, identity: &str) -> bool {
        self.0.remove(identity)
    }

    /// Drop every member.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate members in order.
    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.0.iter()
    }
}

impl<S: Into<Identity>> FromIterator<S> for IdentitySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<Identity>> Extend<S> for IdentitySet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.0.extend(iter.into_iter().map(Into::into));
    }
}
