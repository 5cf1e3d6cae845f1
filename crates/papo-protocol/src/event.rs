//! Outbound server events.
//!
//! Events are JSON objects tagged with a `type` field. Message, history and
//! typing events are scoped to one group; catalog updates go to every open
//! connection. The scoping itself is the dispatcher's job; this crate only
//! defines the shapes.

use crate::wire::{ChatMessage, GroupSummary, UserInfo};
use serde::{Deserialize, Serialize};

/// An event emitted by the server to one or more clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Full group catalog with live member counts.
    GroupList { groups: Vec<GroupSummary> },

    /// Recent message history of one group, oldest first.
    History {
        messages: Vec<ChatMessage>,
        group_id: String,
    },

    /// A new chat message in one group.
    Message {
        message: ChatMessage,
        group_id: String,
    },

    /// A user entered a group.
    UserJoined {
        user: UserInfo,
        user_count: usize,
        group_id: String,
    },

    /// A user left a group (switched away or disconnected).
    UserLeft {
        username: String,
        user_count: usize,
        group_id: String,
    },

    /// Typing indicator toggle from another member of the group.
    Typing { username: String, is_typing: bool },

    /// Confirmation that the session now points at another group.
    GroupSwitched {
        group_id: String,
        group: GroupSummary,
    },

    /// Aged-out messages were evicted; the payload carries the timestamps of
    /// every message that survived so clients can reconcile their rendered
    /// list.
    MessagesCleared {
        remaining_timestamps: Vec<u64>,
        group_id: String,
    },

    /// Members of the joined group.
    UserList { users: Vec<UserInfo> },
}
