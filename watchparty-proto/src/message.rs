//! Chat message records.

use serde::{Deserialize, Serialize};

use crate::user::UserRef;

/// An immutable chat record as retained by clients.
///
/// Insertion order equals chronological order as received; the retained
/// sequence is bounded and evicts the oldest entry on overflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Unique message id (server-assigned, or client-generated when the
    /// broadcast carried none).
    pub id: String,
    /// Sender's participant id.
    pub user_id: String,
    /// Sender's display name at send time.
    pub username: String,
    /// Message body.
    pub content: String,
    /// Milliseconds since the UNIX epoch.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
    /// Whether the sender was the room host.
    #[serde(default)]
    pub is_host: bool,
}

/// A chat record as carried inside `room:init` history.
///
/// Distinct from the live `chat:message` broadcast payload: history
/// entries nest the sender as a `user` object and name the body
/// `content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    /// Unique message id.
    pub id: String,
    /// Sender reference.
    pub user: UserRef,
    /// Message body.
    pub content: String,
    /// Milliseconds since the UNIX epoch.
    pub timestamp: u64,
}

impl From<HistoryMessage> for ChatMessage {
    fn from(entry: HistoryMessage) -> Self {
        let is_host = entry.user.is_host();
        Self {
            id: entry.id,
            user_id: entry.user.id,
            username: entry.user.username,
            content: entry.content,
            timestamp_ms: entry.timestamp,
            is_host,
        }
    }
}
