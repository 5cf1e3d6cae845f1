//! Session directory.
//!
//! Tracks two things: the outbound sink of every open connection, and the
//! session of every *joined* connection. A connection is either absent from
//! the session map (not joined) or bound to exactly one group. The session
//! also owns its periodic history sweeper task, which is aborted when the
//! session goes away.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Identifies one live connection for its lifetime.
pub type ConnectionId = String;

/// Outbound sink for one connection, carrying pre-serialized events.
pub type EventSink = mpsc::UnboundedSender<Arc<str>>;

/// State of one joined connection.
#[derive(Debug)]
pub struct Session {
    /// The group this connection is currently bound to.
    pub group_id: String,
    /// Periodic history sweeper owned by this session.
    sweeper: Option<JoinHandle<()>>,
}

impl Session {
    fn new(group_id: String) -> Self {
        Self {
            group_id,
            sweeper: None,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // The sweeper must never fire against a removed session.
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }
    }
}

/// Maps live connections to sinks and sessions.
#[derive(Debug, Default)]
pub struct SessionDirectory {
    /// Every open connection, joined or not.
    connections: HashMap<ConnectionId, EventSink>,
    /// Joined connections only.
    sessions: HashMap<ConnectionId, Session>,
}

impl SessionDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open connection's outbound sink.
    pub fn register(&mut self, connection_id: ConnectionId, sink: EventSink) {
        debug!(connection = %connection_id, "Connection registered");
        self.connections.insert(connection_id, sink);
    }

    /// Remove a connection entirely.
    ///
    /// Returns the session if the connection was joined. Dropping the
    /// returned session aborts its sweeper.
    pub fn unregister(&mut self, connection_id: &str) -> Option<Session> {
        self.connections.remove(connection_id);
        let session = self.sessions.remove(connection_id);
        debug!(connection = %connection_id, was_joined = session.is_some(), "Connection unregistered");
        session
    }

    /// Get a connection's outbound sink.
    #[must_use]
    pub fn sink(&self, connection_id: &str) -> Option<&EventSink> {
        self.connections.get(connection_id)
    }

    /// Check if a connection is open.
    #[must_use]
    pub fn is_registered(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Bind a connection to a group, creating its session.
    pub fn bind(&mut self, connection_id: ConnectionId, group_id: String) {
        debug!(connection = %connection_id, group = %group_id, "Session bound");
        self.sessions.insert(connection_id, Session::new(group_id));
    }

    /// Point an existing session at another group, keeping its sweeper.
    pub fn rebind(&mut self, connection_id: &str, group_id: String) {
        if let Some(session) = self.sessions.get_mut(connection_id) {
            debug!(connection = %connection_id, group = %group_id, "Session rebound");
            session.group_id = group_id;
        }
    }

    /// Check if a connection has joined.
    #[must_use]
    pub fn is_joined(&self, connection_id: &str) -> bool {
        self.sessions.contains_key(connection_id)
    }

    /// The group a connection is currently bound to.
    #[must_use]
    pub fn current_group(&self, connection_id: &str) -> Option<&str> {
        self.sessions
            .get(connection_id)
            .map(|s| s.group_id.as_str())
    }

    /// Hand a sweeper task to the session that owns it.
    ///
    /// If the session is already gone the task is aborted immediately; a
    /// replaced task is aborted as well.
    pub fn attach_sweeper(&mut self, connection_id: &str, handle: JoinHandle<()>) {
        match self.sessions.get_mut(connection_id) {
            Some(session) => {
                if let Some(old) = session.sweeper.replace(handle) {
                    old.abort();
                }
            }
            None => handle.abort(),
        }
    }

    /// Iterate over every open connection's sink.
    pub fn sinks(&self) -> impl Iterator<Item = (&ConnectionId, &EventSink)> {
        self.connections.iter()
    }

    /// Number of open connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of joined connections.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
