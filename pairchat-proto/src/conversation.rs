//! Canonical identification of a two-party conversation.

use serde::{Deserialize, Serialize};

use crate::message::UserId;

/// The unordered pair of users exchanging messages.
///
/// Canonicalized by sorting the two ids, so `{alice, bob}` and
/// `{bob, alice}` produce the same key. Conversations are derived from
/// message traffic, never stored on their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    lower: UserId,
    upper: UserId,
}

impl ConversationKey {
    /// Builds the canonical key for a pair of users.
    #[must_use]
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b {
            Self { lower: a, upper: b }
        } else {
            Self { lower: b, upper: a }
        }
    }

    /// Returns both participants in canonical order.
    #[must_use]
    pub const fn participants(&self) -> (&UserId, &UserId) {
        (&self.lower, &self.upper)
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.lower, self.upper)
    }
}
