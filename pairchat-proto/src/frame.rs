//! Typed wire frames exchanged over the per-user WebSocket.
//!
//! Every inbound and outbound payload is a tagged JSON object, decoded into
//! [`ClientFrame`] or [`ServerEvent`] before any dispatch. Matching on the
//! enums keeps frame handling exhaustive at compile time — there is no
//! ad hoc payload inspection anywhere in the server.

use serde::{Deserialize, Serialize};

use crate::message::{Message, MessageId, Timestamp, UserId};
use crate::presence::PresenceStatus;

/// Frames sent by a client over its connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Send a text message to another user.
    SendMessage {
        /// The recipient of the message.
        recipient_id: UserId,
        /// The message text.
        body: String,
    },

    /// Report that the sender started or stopped composing a message.
    ///
    /// Ephemeral — never persisted, silently dropped if the recipient is
    /// offline.
    Typing {
        /// The user being typed to.
        recipient_id: UserId,
        /// `true` while composing, `false` once stopped.
        is_typing: bool,
    },

    /// Soft-delete a previously sent message (sender only).
    DeleteMessage {
        /// The id of the message to delete.
        message_id: MessageId,
    },

    /// Request a page of conversation history with another user.
    FetchHistory {
        /// The other participant.
        peer_id: UserId,
        /// Return only messages with ids below this cursor, if set.
        #[serde(default)]
        before_id: Option<MessageId>,
        /// Maximum number of messages to return. Signed on the wire so a
        /// nonsensical negative value is a validation error, not a decode
        /// error.
        limit: i64,
    },
}

/// Events delivered by the server to a client connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A new message addressed to this connection's user.
    MessageReceived {
        /// The persisted message.
        message: Message,
        /// Display name of the sender, or the raw user id if the profile
        /// lookup failed.
        sender_name: String,
    },

    /// Echo of a message this user sent, delivered to all of their
    /// connections once the store confirmed persistence.
    MessageSentAck {
        /// The persisted message, including its assigned id.
        message: Message,
    },

    /// Another user started or stopped typing to this connection's user.
    Typing {
        /// Who is typing.
        sender_id: UserId,
        /// `true` while composing, `false` once stopped.
        is_typing: bool,
    },

    /// A message in one of this user's conversations was deleted.
    MessageDeleted {
        /// The id of the deleted message.
        message_id: MessageId,
        /// The user who deleted it (always the original sender).
        deleted_by: UserId,
    },

    /// A conversation peer of this connection went online or offline.
    PresenceChanged {
        /// The user whose presence changed.
        user_id: UserId,
        /// The new status.
        status: PresenceStatus,
        /// When the user was last seen; `None` if never observed offline.
        last_seen: Option<Timestamp>,
    },

    /// A page of conversation history, newest first.
    ///
    /// Deleted messages are present with a blank body so pagination cursors
    /// stay stable.
    HistoryResult {
        /// The conversation peer the page was requested for.
        peer_id: UserId,
        /// The messages, newest first.
        messages: Vec<Message>,
    },

    /// A request failed; the connection stays usable.
    Error {
        /// Machine-readable error category.
        code: ErrorCode,
        /// Human-readable description.
        detail: String,
    },
}

/// Machine-readable error categories carried in [`ServerEvent::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed input: empty body, bad limit, self-send.
    Validation,
    /// The requester is not allowed to perform the operation.
    Permission,
    /// The referenced message or user does not exist.
    NotFound,
    /// The durable store did not answer in time.
    StorageUnavailable,
    /// The frame itself could not be decoded.
    Protocol,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            Self::Validation => "validation",
            Self::Permission => "permission",
            Self::NotFound => "not_found",
            Self::StorageUnavailable => "storage_unavailable",
            Self::Protocol => "protocol",
        };
        write!(f, "{code}")
    }
}

/// Errors raised by the frame codec.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A frame could not be serialized to JSON.
    #[error("frame encode error: {0}")]
    Encode(#[source] serde_json::Error),

    /// An inbound payload was not a well-formed frame.
    #[error("frame decode error: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Encodes a [`ClientFrame`] as a JSON text frame.
///
/// # Errors
///
/// Returns [`FrameError::Encode`] if serialization fails.
pub fn encode_client(frame: &ClientFrame) -> Result<String, FrameError> {
    serde_json::to_string(frame).map_err(FrameError::Encode)
}

/// Decodes a [`ClientFrame`] from a JSON text frame.
///
/// # Errors
///
/// Returns [`FrameError::Decode`] if the payload is not a valid frame.
pub fn decode_client(text: &str) -> Result<ClientFrame, FrameError> {
    serde_json::from_str(text).map_err(FrameError::Decode)
}

/// Encodes a [`ServerEvent`] as a JSON text frame.
///
/// # Errors
///
/// Returns [`FrameError::Encode`] if serialization fails.
pub fn encode_event(event: &ServerEvent) -> Result<String, FrameError> {
    serde_json::to_string(event).map_err(FrameError::Encode)
}

/// Decodes a [`ServerEvent`] from a JSON text frame.
///
/// # Errors
///
/// Returns [`FrameError::Decode`] if the payload is not a valid event.
pub fn decode_event(text: &str) -> Result<ServerEvent, FrameError> {
    serde_json::from_str(text).map_err(FrameError::Decode)
}
