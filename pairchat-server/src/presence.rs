//! Process-wide presence registry.
//!
//! Maps each user to their set of live connections. All mutation happens
//! under a single [`RwLock`], so register/unregister for any mix of users
//! are linearizable and a user is observed online exactly while their
//! connection set is non-empty.
//!
//! Entries are never removed: once a user has connected, their entry is
//! retained offline with a `last_seen` stamp from the moment the last
//! connection went away.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, mpsc};

use pairchat_proto::frame::ServerEvent;
use pairchat_proto::message::{Timestamp, UserId};
use pairchat_proto::presence::PresenceStatus;

/// Channel used to deliver events to one connection's writer task.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Opaque identifier for one live connection.
///
/// Minted once per connection from the registry's counter; never reused
/// within a process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Handle to one live connection: its id plus the sender half of its event
/// channel. Owned by the presence entry it is registered under.
#[derive(Debug, Clone)]
pub struct ConnHandle {
    /// The connection's identifier.
    pub id: ConnId,
    sender: EventSender,
}

impl ConnHandle {
    /// Creates a handle from a connection id and its event channel.
    #[must_use]
    pub const fn new(id: ConnId, sender: EventSender) -> Self {
        Self { id, sender }
    }

    /// Delivers an event to the connection, best-effort.
    ///
    /// Returns `false` if the connection's writer task is gone. Callers do
    /// not retry — a dead connection is cleaned up by its own lifecycle.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// A presence transition worth broadcasting to interested connections.
#[derive(Debug, Clone)]
pub struct PresenceChange {
    /// The user whose presence changed.
    pub user_id: UserId,
    /// The new status.
    pub status: PresenceStatus,
    /// The user's last-seen stamp after the transition.
    pub last_seen: Option<Timestamp>,
}

#[derive(Default)]
struct PresenceEntry {
    connections: Vec<ConnHandle>,
    last_seen: Option<Timestamp>,
}

impl PresenceEntry {
    fn status(&self) -> PresenceStatus {
        if self.connections.is_empty() {
            PresenceStatus::Offline
        } else {
            PresenceStatus::Online
        }
    }
}

/// Registry of every user's live connections and last-seen stamp.
pub struct PresenceRegistry {
    entries: RwLock<HashMap<UserId, PresenceEntry>>,
    next_conn_id: AtomicU64,
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Mints a fresh connection id.
    pub fn next_conn_id(&self) -> ConnId {
        ConnId(self.next_conn_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Adds a connection under a user, creating the entry if absent.
    ///
    /// Always succeeds. Returns the presence change if this was the user's
    /// first live connection (offline-to-online transition), `None`
    /// otherwise. `last_seen` is deliberately not touched here — it only
    /// moves on the offline transition.
    pub async fn register(&self, user_id: &UserId, handle: ConnHandle) -> Option<PresenceChange> {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(user_id.clone()).or_default();
        let was_offline = entry.connections.is_empty();
        entry.connections.push(handle);
        if was_offline {
            Some(PresenceChange {
                user_id: user_id.clone(),
                status: PresenceStatus::Online,
                last_seen: entry.last_seen,
            })
        } else {
            None
        }
    }

    /// Removes a connection from a user's entry.
    ///
    /// Unknown user or handle is a no-op (disconnect paths must be
    /// idempotent). When the last connection goes away, stamps `last_seen`
    /// and returns the offline transition.
    pub async fn unregister(&self, user_id: &UserId, conn_id: ConnId) -> Option<PresenceChange> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(user_id)?;
        let before = entry.connections.len();
        entry.connections.retain(|c| c.id != conn_id);
        if entry.connections.len() == before {
            return None;
        }
        if entry.connections.is_empty() {
            entry.last_seen = Some(Timestamp::now());
            Some(PresenceChange {
                user_id: user_id.clone(),
                status: PresenceStatus::Offline,
                last_seen: entry.last_seen,
            })
        } else {
            None
        }
    }

    /// Returns whether the user currently has at least one live connection.
    pub async fn is_online(&self, user_id: &UserId) -> bool {
        let entries = self.entries.read().await;
        entries
            .get(user_id)
            .is_some_and(|e| e.status() == PresenceStatus::Online)
    }

    /// Returns when the user last went offline, if ever observed.
    pub async fn last_seen(&self, user_id: &UserId) -> Option<Timestamp> {
        let entries = self.entries.read().await;
        entries.get(user_id).and_then(|e| e.last_seen)
    }

    /// Returns handles to all of the user's live connections (may be empty).
    pub async fn connections_of(&self, user_id: &UserId) -> Vec<ConnHandle> {
        let entries = self.entries.read().await;
        entries
            .get(user_id)
            .map(|e| e.connections.clone())
            .unwrap_or_default()
    }
}
