//! Core record types for the `PairChat` protocol.
//!
//! Identifier newtypes and the [`Message`] record exchanged between the
//! server and its clients. The server treats [`UserId`] as an opaque key —
//! account data lives with the authentication collaborator, not here.

use serde::{Deserialize, Serialize};

use crate::conversation::ConversationKey;

/// Opaque, stable identifier for a user.
///
/// Assigned by the external account system; the chat core only compares
/// and routes by it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a user id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a message.
///
/// Assigned by the message store as a strictly increasing sequence, so ids
/// double as a submission-order tiebreaker and a pagination cursor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    /// Creates a message id from its raw sequence number.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw sequence number.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// A persisted chat message between two users.
///
/// Immutable once stored, except for the `deleted` flag which the sender
/// may set (soft delete — the row is never removed, so history positions
/// stay stable for pagination).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned, strictly increasing identifier.
    pub id: MessageId,
    /// Who sent the message.
    pub sender_id: UserId,
    /// Who the message is addressed to.
    pub recipient_id: UserId,
    /// The message text. Empty when presented in redacted form.
    pub body: String,
    /// Server-side creation time.
    pub created_at: Timestamp,
    /// Whether the sender has soft-deleted this message.
    pub deleted: bool,
}

impl Message {
    /// Returns the conversation this message belongs to.
    #[must_use]
    pub fn conversation(&self) -> ConversationKey {
        ConversationKey::new(self.sender_id.clone(), self.recipient_id.clone())
    }

    /// Returns the presentation form of this message.
    ///
    /// A deleted message keeps its id and position but its body is blanked,
    /// so clients can render a tombstone without learning the original text.
    #[must_use]
    pub fn redacted(&self) -> Self {
        if self.deleted {
            Self {
                body: String::new(),
                ..self.clone()
            }
        } else {
            self.clone()
        }
    }
}
