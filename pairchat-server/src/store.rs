//! Durable message history: the [`MessageStore`] contract and the in-memory
//! implementation used by a single-node deployment.
//!
//! The store's guarantees are load-bearing for the router: `insert` assigns
//! strictly increasing ids atomically, so submission order, persistence
//! order, and delivery order all agree, and `history` reads a consistent
//! snapshot at call time.

use tokio::sync::Mutex;

use pairchat_proto::conversation::ConversationKey;
use pairchat_proto::message::{Message, MessageId, Timestamp, UserId};

/// Errors that can occur during message storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The referenced message does not exist.
    #[error("message {0} not found")]
    NotFound(MessageId),

    /// The underlying storage failed or did not respond.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Contract for the durable message history collaborator.
///
/// Implementations must make `insert` atomic (a message is never partially
/// visible) and assign ids from a single strictly increasing sequence.
pub trait MessageStore: Send + Sync {
    /// Persists a new message, assigning its id and server-side timestamp.
    fn insert(
        &self,
        sender: &UserId,
        recipient: &UserId,
        body: String,
    ) -> impl std::future::Future<Output = Result<Message, StoreError>> + Send;

    /// Returns a message by id.
    fn fetch(
        &self,
        id: MessageId,
    ) -> impl std::future::Future<Output = Result<Message, StoreError>> + Send;

    /// Sets the deleted flag on a message.
    ///
    /// Idempotent: deleting an already-deleted message returns the same
    /// state, not an error.
    fn mark_deleted(
        &self,
        id: MessageId,
    ) -> impl std::future::Future<Output = Result<Message, StoreError>> + Send;

    /// Returns messages in a conversation, newest first, from a consistent
    /// snapshot at call time.
    ///
    /// When `before_id` is set, only messages with smaller ids are
    /// returned. Deleted messages are included as stored — redaction is a
    /// presentation concern.
    fn history(
        &self,
        key: &ConversationKey,
        before_id: Option<MessageId>,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, StoreError>> + Send;
}

struct StoreInner {
    next_id: u64,
    messages: Vec<Message>,
}

/// In-memory [`MessageStore`] behind a single mutex.
///
/// Stands in for the durable-storage collaborator on a single node; the
/// append-only `Vec` keeps messages in id order so history reads are a
/// reverse scan.
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                next_id: 1,
                messages: Vec::new(),
            }),
        }
    }

    /// Returns the total number of stored messages (deleted included).
    pub async fn len(&self) -> usize {
        self.inner.lock().await.messages.len()
    }

    /// Returns whether the store holds no messages.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl MessageStore for MemoryStore {
    async fn insert(
        &self,
        sender: &UserId,
        recipient: &UserId,
        body: String,
    ) -> Result<Message, StoreError> {
        let mut inner = self.inner.lock().await;
        let message = Message {
            id: MessageId::new(inner.next_id),
            sender_id: sender.clone(),
            recipient_id: recipient.clone(),
            body,
            created_at: Timestamp::now(),
            deleted: false,
        };
        inner.next_id += 1;
        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn fetch(&self, id: MessageId) -> Result<Message, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn mark_deleted(&self, id: MessageId) -> Result<Message, StoreError> {
        let mut inner = self.inner.lock().await;
        let message = inner
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(StoreError::NotFound(id))?;
        message.deleted = true;
        Ok(message.clone())
    }

    async fn history(
        &self,
        key: &ConversationKey,
        before_id: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let inner = self.inner.lock().await;
        // Messages are appended in id order, so reverse iteration yields
        // newest-first without sorting.
        let page = inner
            .messages
            .iter()
            .rev()
            .filter(|m| m.conversation() == *key)
            .filter(|m| before_id.is_none_or(|cursor| m.id < cursor))
            .take(limit)
            .cloned()
            .collect();
        Ok(page)
    }
}
