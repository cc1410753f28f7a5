//! Read-only boundary to the external profile collaborator.
//!
//! The router uses profile lookups for two things: deciding whether a
//! message recipient exists at all, and enriching outbound events with a
//! display name. An enrichment miss degrades to the raw user id — it never
//! fails a delivery.

use std::collections::HashMap;

use parking_lot::RwLock;

use pairchat_proto::message::UserId;

/// Display data for a user, owned by the excluded account system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Human-readable name shown next to messages.
    pub display_name: String,
    /// Reference to the user's avatar, if any.
    pub avatar: Option<String>,
}

/// Read-only lookup of profile data by user id.
pub trait ProfileDirectory: Send + Sync {
    /// Returns the profile for a user, or `None` if unknown.
    fn lookup(&self, user_id: &UserId) -> Option<Profile>;
}

/// In-memory [`ProfileDirectory`], seeded from the server configuration.
#[derive(Default)]
pub struct InMemoryProfiles {
    profiles: RwLock<HashMap<UserId, Profile>>,
}

impl InMemoryProfiles {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a user's profile.
    pub fn insert(&self, user_id: UserId, profile: Profile) {
        self.profiles.write().insert(user_id, profile);
    }
}

impl ProfileDirectory for InMemoryProfiles {
    fn lookup(&self, user_id: &UserId) -> Option<Profile> {
        self.profiles.read().get(user_id).cloned()
    }
}
