//! Presence status types for user online/offline tracking.

use serde::{Deserialize, Serialize};

/// Presence status of a user.
///
/// A user is `Online` exactly while they have at least one live connection;
/// the registry flips them to `Offline` when the last connection goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    /// The user has at least one live connection.
    Online,
    /// The user has no live connections.
    Offline,
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}
