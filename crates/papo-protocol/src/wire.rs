//! Shared wire records.
//!
//! These are the value types embedded in commands and events: the user
//! profile, the chat message, and the group summary shown in the sidebar
//! catalog. Field names are camelCase on the wire to match the browser
//! client.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in milliseconds.
///
/// All wire timestamps (message creation, connection time) use this clock.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A connected participant as seen by other clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    /// Opaque id, unique for the connection's lifetime.
    pub id: String,
    /// Display name. Not unique.
    pub username: String,
    /// When the user joined, unix millis.
    pub connected_at: u64,
}

/// A single chat message.
///
/// Immutable once created; the server never mutates or truncates the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Author display name.
    pub username: String,
    /// Message body.
    pub text: String,
    /// Creation time, unix millis.
    pub timestamp: u64,
}

impl ChatMessage {
    /// Create a message stamped with the current time.
    #[must_use]
    pub fn new(username: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            text: text.into(),
            timestamp: now_millis(),
        }
    }
}

/// A catalog entry for one group, including its live member count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    /// Stable group id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Short description shown under the name.
    pub description: String,
    /// Emoji icon.
    pub icon: String,
    /// Number of currently joined connections.
    pub user_count: usize,
}
