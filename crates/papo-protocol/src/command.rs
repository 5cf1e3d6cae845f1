//! Inbound client commands.
//!
//! Commands arrive as JSON objects tagged with a `type` field. The set of
//! valid commands is closed; anything else parses into [`ClientCommand::Unknown`]
//! and is ignored by the dispatcher rather than treated as an error.

use serde::{Deserialize, Serialize};

/// A command sent by a connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    /// Enter the chat under a display name, optionally into a specific group.
    ///
    /// When `group_id` is absent the server places the user in its default
    /// group.
    Join {
        username: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_id: Option<String>,
    },

    /// Move the session to another group.
    SwitchGroup { group_id: String },

    /// Post a message to the session's current group.
    Message { text: String },

    /// Toggle the typing indicator for the session's current group.
    Typing { is_typing: bool },

    /// Any unrecognized command type. Silently dropped.
    #[serde(other)]
    Unknown,
}
