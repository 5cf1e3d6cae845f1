//! Group abstraction.
//!
//! A group is a named room from the fixed catalog. It owns the canonical
//! copy of each joined user's record and a bounded message history. Two
//! independent eviction mechanisms apply to the history: FIFO eviction past
//! the capacity, and age-based eviction driven by the sweeper.

use crate::session::ConnectionId;
use papo_protocol::{now_millis, ChatMessage, GroupSummary, UserInfo};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::debug;

/// Default number of messages retained per group.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Default number of messages included in a history snapshot.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// A chat group: catalog metadata, live membership, bounded history.
#[derive(Debug)]
pub struct Group {
    id: String,
    name: String,
    description: String,
    icon: String,
    /// Ordered history, oldest first.
    history: VecDeque<ChatMessage>,
    /// Currently joined connections and their user records.
    members: HashMap<ConnectionId, UserInfo>,
    capacity: usize,
}

impl Group {
    /// Create a new group with the default history capacity.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        icon: impl Into<String>,
    ) -> Self {
        Self::with_capacity(id, name, description, icon, DEFAULT_HISTORY_CAPACITY)
    }

    /// Create a new group with a specific history capacity.
    #[must_use]
    pub fn with_capacity(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        icon: impl Into<String>,
        capacity: usize,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            icon: icon.into(),
            history: VecDeque::with_capacity(capacity),
            members: HashMap::new(),
            capacity,
        }
    }

    /// Get the group id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append a message, evicting the oldest past capacity.
    pub fn push_message(&mut self, message: ChatMessage) {
        self.history.push_back(message);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
    }

    /// The most recent `limit` messages, oldest first.
    #[must_use]
    pub fn recent_messages(&self, limit: usize) -> Vec<ChatMessage> {
        let skip = self.history.len().saturating_sub(limit);
        self.history.iter().skip(skip).cloned().collect()
    }

    /// Number of messages currently held.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Evict messages older than `max_age`.
    ///
    /// Returns the timestamps of the surviving messages iff at least one
    /// message was removed, `None` otherwise.
    pub fn evict_expired(&mut self, max_age: Duration) -> Option<Vec<u64>> {
        let cutoff = now_millis().saturating_sub(max_age.as_millis() as u64);
        let before = self.history.len();
        self.history.retain(|m| m.timestamp > cutoff);

        let removed = before - self.history.len();
        if removed == 0 {
            return None;
        }

        debug!(group = %self.id, removed, "Evicted expired messages");
        Some(self.history.iter().map(|m| m.timestamp).collect())
    }

    /// Add a member. The group owns the user record from here on.
    pub fn add_member(&mut self, connection_id: ConnectionId, user: UserInfo) {
        debug!(group = %self.id, connection = %connection_id, user = %user.username, "Member added");
        self.members.insert(connection_id, user);
    }

    /// Remove a member, returning the owned user record so it can be moved
    /// into another group.
    pub fn remove_member(&mut self, connection_id: &str) -> Option<UserInfo> {
        let user = self.members.remove(connection_id);
        if let Some(ref u) = user {
            debug!(group = %self.id, connection = %connection_id, user = %u.username, "Member removed");
        }
        user
    }

    /// Look up a member's user record.
    #[must_use]
    pub fn member(&self, connection_id: &str) -> Option<&UserInfo> {
        self.members.get(connection_id)
    }

    /// Check if a connection is a member.
    #[must_use]
    pub fn is_member(&self, connection_id: &str) -> bool {
        self.members.contains_key(connection_id)
    }

    /// Number of currently joined connections.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// All member user records.
    #[must_use]
    pub fn member_list(&self) -> Vec<UserInfo> {
        self.members.values().cloned().collect()
    }

    /// Catalog summary with the live member count.
    #[must_use]
    pub fn summary(&self) -> GroupSummary {
        GroupSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            icon: self.icon.clone(),
            user_count: self.members.len(),
        }
    }
}
