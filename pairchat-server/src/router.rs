//! Conversation router: validation, persistence, and live fan-out.
//!
//! Every inbound operation lands here. The router persists through the
//! [`MessageStore`], resolves live recipients through the
//! [`PresenceRegistry`], and delivers events over each connection's
//! channel. Delivery is best-effort — once the store has confirmed a
//! write, a dead connection never fails the call.
//!
//! Ordering: all fan-out happens inline on the calling connection's task,
//! after persistence, and each connection channel is FIFO. Two
//! `send_message` calls from the same sender therefore reach any given
//! connection in id order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use pairchat_proto::conversation::ConversationKey;
use pairchat_proto::frame::{ErrorCode, ServerEvent};
use pairchat_proto::message::{Message, MessageId, UserId};

use crate::presence::{ConnId, EventSender, PresenceChange, PresenceRegistry};
use crate::profile::ProfileDirectory;
use crate::store::{MessageStore, StoreError};

/// Errors surfaced to the originating connection as `error` frames.
///
/// None of these are fatal to the connection, let alone the process.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Malformed input: empty body, oversized body, self-send, bad limit.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requester is not the sender of the message they tried to delete.
    #[error("only the sender may delete a message")]
    Permission,

    /// Unknown message id or unknown peer.
    #[error("not found: {0}")]
    NotFound(String),

    /// The durable store failed or timed out; the router does not retry.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl RouterError {
    /// Maps this error to its wire-level code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::Validation,
            Self::Permission => ErrorCode::Permission,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::StorageUnavailable(_) => ErrorCode::StorageUnavailable,
        }
    }
}

/// Tunable bounds enforced by the router.
#[derive(Debug, Clone)]
pub struct RouterLimits {
    /// Maximum message body length in characters, after trimming.
    pub max_message_len: usize,
    /// Maximum page size accepted by `fetch_history`.
    pub max_history_limit: i64,
    /// How long to wait for the store before reporting it unavailable.
    pub store_timeout: Duration,
}

impl Default for RouterLimits {
    fn default() -> Self {
        Self {
            max_message_len: 4000,
            max_history_limit: 100,
            store_timeout: Duration::from_secs(5),
        }
    }
}

/// A connection's live delivery channel plus the set of peers it is
/// currently viewing as conversation partners.
struct Watcher {
    sender: EventSender,
    peers: HashSet<UserId>,
}

/// Routes messages, typing events, deletions, and presence broadcasts
/// between exactly two participants per call.
pub struct ChatRouter<S> {
    registry: Arc<PresenceRegistry>,
    store: S,
    profiles: Arc<dyn ProfileDirectory>,
    limits: RouterLimits,
    watchers: RwLock<HashMap<ConnId, Watcher>>,
}

impl<S: MessageStore> ChatRouter<S> {
    /// Creates a router over the given registry, store, and profile
    /// directory.
    pub fn new(
        registry: Arc<PresenceRegistry>,
        store: S,
        profiles: Arc<dyn ProfileDirectory>,
        limits: RouterLimits,
    ) -> Self {
        Self {
            registry,
            store,
            profiles,
            limits,
            watchers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a connection's event channel for presence broadcasts.
    ///
    /// Called once when the connection becomes active; paired with
    /// [`forget`](Self::forget) on close.
    pub async fn attach(&self, conn_id: ConnId, sender: EventSender) {
        let mut watchers = self.watchers.write().await;
        watchers.insert(
            conn_id,
            Watcher {
                sender,
                peers: HashSet::new(),
            },
        );
    }

    /// Marks a connection as currently viewing `peer` as a conversation
    /// partner.
    ///
    /// Interest is derived from traffic: sending a message, typing, or
    /// requesting history all imply the peer's conversation is open.
    pub async fn watch(&self, conn_id: ConnId, peer: UserId) {
        let mut watchers = self.watchers.write().await;
        if let Some(watcher) = watchers.get_mut(&conn_id) {
            watcher.peers.insert(peer);
        }
    }

    /// Drops a closed connection's channel and interests. Idempotent.
    pub async fn forget(&self, conn_id: ConnId) {
        let mut watchers = self.watchers.write().await;
        watchers.remove(&conn_id);
    }

    /// Validates, persists, and fans out a message.
    ///
    /// On success the message has been durably stored; delivery to each
    /// live connection of the recipient (`message_received`) and of the
    /// sender (`message_sent_ack`, multi-tab echo) is best-effort.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty or oversized body or a self-send,
    /// `NotFound` for an unknown recipient, `StorageUnavailable` if the
    /// store fails or times out.
    pub async fn send_message(
        &self,
        sender: &UserId,
        recipient: &UserId,
        body: &str,
    ) -> Result<Message, RouterError> {
        let text = body.trim();
        if text.is_empty() {
            return Err(RouterError::Validation("message body is empty".to_string()));
        }
        if text.chars().count() > self.limits.max_message_len {
            return Err(RouterError::Validation(format!(
                "message exceeds {} characters",
                self.limits.max_message_len
            )));
        }
        if sender == recipient {
            return Err(RouterError::Validation(
                "cannot send a message to yourself".to_string(),
            ));
        }
        if self.profiles.lookup(recipient).is_none() {
            return Err(RouterError::NotFound(format!("unknown user {recipient}")));
        }

        let message = self
            .store_call(self.store.insert(sender, recipient, text.to_string()))
            .await?;

        tracing::debug!(
            id = %message.id,
            from = %sender,
            to = %recipient,
            "message persisted, fanning out"
        );

        let sender_name = self.display_name(sender);
        for conn in self.registry.connections_of(recipient).await {
            let delivered = conn.send(ServerEvent::MessageReceived {
                message: message.clone(),
                sender_name: sender_name.clone(),
            });
            if !delivered {
                tracing::warn!(to = %recipient, conn = %conn.id, "delivery skipped, connection gone");
            }
        }
        for conn in self.registry.connections_of(sender).await {
            if !conn.send(ServerEvent::MessageSentAck {
                message: message.clone(),
            }) {
                tracing::warn!(to = %sender, conn = %conn.id, "ack skipped, connection gone");
            }
        }

        Ok(message)
    }

    /// Forwards a typing indicator to the recipient's live connections.
    ///
    /// Nothing is persisted and nothing is queued: an offline recipient
    /// simply never hears about it.
    pub async fn notify_typing(&self, sender: &UserId, recipient: &UserId, is_typing: bool) {
        let connections = self.registry.connections_of(recipient).await;
        if connections.is_empty() {
            tracing::trace!(from = %sender, to = %recipient, "typing event dropped, recipient offline");
            return;
        }
        for conn in connections {
            let _ = conn.send(ServerEvent::Typing {
                sender_id: sender.clone(),
                is_typing,
            });
        }
    }

    /// Soft-deletes a message on behalf of its sender and notifies both
    /// participants' live connections.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `Permission` if the requester is not
    /// the original sender, `StorageUnavailable` on store failure. Deleting
    /// an already-deleted message succeeds again with the same state.
    pub async fn delete_message(
        &self,
        requester: &UserId,
        message_id: MessageId,
    ) -> Result<Message, RouterError> {
        let message = self.store_call(self.store.fetch(message_id)).await?;
        if message.sender_id != *requester {
            tracing::warn!(
                requester = %requester,
                id = %message_id,
                "delete rejected, requester is not the sender"
            );
            return Err(RouterError::Permission);
        }

        let message = self.store_call(self.store.mark_deleted(message_id)).await?;

        let key = message.conversation();
        let (first, second) = key.participants();
        for user in [first, second] {
            for conn in self.registry.connections_of(user).await {
                let _ = conn.send(ServerEvent::MessageDeleted {
                    message_id,
                    deleted_by: requester.clone(),
                });
            }
        }

        Ok(message)
    }

    /// Returns a page of conversation history, newest first, with deleted
    /// bodies redacted in place so pagination positions stay stable.
    ///
    /// # Errors
    ///
    /// `Validation` if `limit` is non-positive or exceeds the configured
    /// maximum, `StorageUnavailable` on store failure or timeout.
    pub async fn fetch_history(
        &self,
        requester: &UserId,
        peer: &UserId,
        before_id: Option<MessageId>,
        limit: i64,
    ) -> Result<Vec<Message>, RouterError> {
        if limit <= 0 || limit > self.limits.max_history_limit {
            return Err(RouterError::Validation(format!(
                "limit must be between 1 and {}",
                self.limits.max_history_limit
            )));
        }
        let key = ConversationKey::new(requester.clone(), peer.clone());
        #[allow(clippy::cast_sign_loss)]
        let page = self
            .store_call(self.store.history(&key, before_id, limit as usize))
            .await?;
        Ok(page.iter().map(Message::redacted).collect())
    }

    /// Broadcasts a presence transition to every connection currently
    /// viewing the changed user as a conversation peer — never globally.
    pub async fn notify_presence(&self, change: &PresenceChange) {
        let watchers = self.watchers.read().await;
        for (conn_id, watcher) in watchers.iter() {
            if !watcher.peers.contains(&change.user_id) {
                continue;
            }
            let delivered = watcher
                .sender
                .send(ServerEvent::PresenceChanged {
                    user_id: change.user_id.clone(),
                    status: change.status,
                    last_seen: change.last_seen,
                })
                .is_ok();
            if !delivered {
                tracing::trace!(conn = %conn_id, "presence broadcast skipped, connection gone");
            }
        }
    }

    /// Resolves a display name, degrading to the raw id when the profile
    /// collaborator has no answer.
    fn display_name(&self, user_id: &UserId) -> String {
        self.profiles
            .lookup(user_id)
            .map_or_else(|| user_id.to_string(), |p| p.display_name)
    }

    /// Runs a store future under the configured timeout and maps store
    /// errors into router errors.
    async fn store_call<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, StoreError>> + Send,
    ) -> Result<T, RouterError> {
        match tokio::time::timeout(self.limits.store_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(StoreError::NotFound(id))) => {
                Err(RouterError::NotFound(format!("message {id}")))
            }
            Ok(Err(StoreError::Unavailable(reason))) => {
                Err(RouterError::StorageUnavailable(reason))
            }
            Err(_) => Err(RouterError::StorageUnavailable(
                "store call timed out".to_string(),
            )),
        }
    }
}
