//! The chat service.
//!
//! One `ChatService` is constructed at startup and handed to every
//! connection handler. It interprets inbound commands, mutates the group
//! registry and session directory, and fans the resulting events out to the
//! right subset of open connections.
//!
//! All state lives behind a single mutex. The lock is held only for the
//! duration of one command (mutation plus event emission, no awaits), which
//! serializes commands against each other and against sweeper ticks and
//! makes the group switch atomic.

use crate::group::Group;
use crate::registry::{CatalogEntry, CatalogError, GroupRegistry};
use crate::session::{ConnectionId, EventSink, SessionDirectory};
use papo_protocol::{codec, now_millis, ChatMessage, ClientCommand, ServerEvent, UserInfo};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Counter ensuring unique user ids even within the same millisecond.
static USER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Generate an opaque user id, unique per connection lifetime.
fn next_user_id() -> String {
    let seq = USER_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("user_{}_{}", now_millis(), seq)
}

/// Tunables for the chat service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Group joined when a `join` command carries no group id.
    pub default_group: String,
    /// Messages retained per group before FIFO eviction.
    pub history_capacity: usize,
    /// Messages included in a history snapshot on join/switch.
    pub history_limit: usize,
    /// Age past which the sweeper evicts a message.
    pub message_ttl: Duration,
    /// Period of the per-session sweeper task.
    pub sweep_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_group: "geral".to_string(),
            history_capacity: crate::group::DEFAULT_HISTORY_CAPACITY,
            history_limit: crate::group::DEFAULT_HISTORY_LIMIT,
            message_ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Everything guarded by the service lock.
struct State {
    registry: GroupRegistry,
    directory: SessionDirectory,
}

impl State {
    /// Deliver an event to one connection, best-effort.
    fn send_to(&self, connection_id: &str, event: &ServerEvent) {
        let Some(sink) = self.directory.sink(connection_id) else {
            return;
        };
        match codec::encode_event(event) {
            Ok(payload) => {
                if sink.send(Arc::from(payload)).is_err() {
                    debug!(connection = %connection_id, "Dropped event for closing connection");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode event"),
        }
    }

    /// Deliver an event to every open connection matching the filter.
    ///
    /// With `scope` set, only connections currently bound to that group
    /// receive the event; without it, every open connection does. A failed
    /// send to one connection never affects the others.
    fn broadcast(&self, event: &ServerEvent, exclude: Option<&str>, scope: Option<&str>) {
        let payload: Arc<str> = match codec::encode_event(event) {
            Ok(payload) => Arc::from(payload),
            Err(e) => {
                warn!(error = %e, "Failed to encode event");
                return;
            }
        };

        for (connection_id, sink) in self.directory.sinks() {
            if exclude == Some(connection_id.as_str()) {
                continue;
            }
            if let Some(group_id) = scope {
                if self.directory.current_group(connection_id) != Some(group_id) {
                    continue;
                }
            }
            if sink.send(Arc::clone(&payload)).is_err() {
                debug!(connection = %connection_id, "Dropped event for closing connection");
            }
        }
    }
}

/// Snapshot of the service's size, for metrics and health reporting.
#[derive(Debug, Clone)]
pub struct ServiceStats {
    /// Open connections, joined or not.
    pub connections: usize,
    /// Joined connections.
    pub sessions: usize,
    /// Groups in the catalog.
    pub groups: usize,
    /// Messages evicted by the history sweeper since startup.
    pub messages_expired: u64,
}

/// The message-routing service. Constructed once, shared via `Arc`.
pub struct ChatService {
    state: Mutex<State>,
    config: ServiceConfig,
    expired_total: AtomicU64,
}

impl ChatService {
    /// Build the service from a group catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog is invalid or the configured default
    /// group is not in it.
    pub fn new(catalog: &[CatalogEntry], config: ServiceConfig) -> Result<Self, CatalogError> {
        let registry = GroupRegistry::from_catalog(catalog, config.history_capacity)?;
        if !registry.contains(&config.default_group) {
            return Err(CatalogError::UnknownDefault(config.default_group.clone()));
        }

        info!(default_group = %config.default_group, "Chat service initialized");
        Ok(Self {
            state: Mutex::new(State {
                registry,
                directory: SessionDirectory::new(),
            }),
            config,
            expired_total: AtomicU64::new(0),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a freshly accepted connection's outbound sink.
    ///
    /// The connection takes part in catalog broadcasts from this point on,
    /// even before it joins a group.
    pub fn register_connection(&self, connection_id: ConnectionId, sink: EventSink) {
        self.lock().directory.register(connection_id, sink);
    }

    /// Dispatch one inbound command to completion.
    pub fn handle_command(self: &Arc<Self>, connection_id: &str, command: ClientCommand) {
        match command {
            ClientCommand::Join { username, group_id } => {
                if self.join(connection_id, username, group_id) {
                    self.start_sweeper(connection_id);
                }
            }
            ClientCommand::SwitchGroup { group_id } => self.switch_group(connection_id, group_id),
            ClientCommand::Message { text } => self.post_message(connection_id, text),
            ClientCommand::Typing { is_typing } => self.set_typing(connection_id, is_typing),
            ClientCommand::Unknown => {
                debug!(connection = %connection_id, "Ignoring unknown command");
            }
        }
    }

    /// Handle transport-level disconnect: remove the user from its group,
    /// notify the former group, and stop the session's sweeper.
    pub fn disconnect(&self, connection_id: &str) {
        let mut state = self.lock();

        let session = state.directory.unregister(connection_id);
        let Some(group_id) = session.map(|s| s.group_id.clone()) else {
            debug!(connection = %connection_id, "Unjoined connection closed");
            return;
        };

        let Some(user) = state
            .registry
            .get_mut(&group_id)
            .and_then(|g| g.remove_member(connection_id))
        else {
            return;
        };
        let user_count = state.registry.get(&group_id).map_or(0, Group::member_count);

        info!(connection = %connection_id, user = %user.username, group = %group_id, "Client disconnected");

        state.broadcast(
            &ServerEvent::UserLeft {
                username: user.username,
                user_count,
                group_id: group_id.clone(),
            },
            None,
            Some(&group_id),
        );
        state.broadcast(
            &ServerEvent::GroupList {
                groups: state.registry.summaries(),
            },
            None,
            None,
        );
    }

    /// Evict aged-out messages from every group and notify each affected
    /// group's current members with the surviving timestamp set.
    pub fn sweep_expired(&self) {
        let mut state = self.lock();

        let mut cleared = Vec::new();
        let mut evicted: u64 = 0;
        for group in state.registry.groups_mut() {
            let before = group.history_len();
            if let Some(remaining) = group.evict_expired(self.config.message_ttl) {
                evicted += (before - remaining.len()) as u64;
                cleared.push((group.id().to_string(), remaining));
            }
        }
        if evicted > 0 {
            self.expired_total.fetch_add(evicted, Ordering::Relaxed);
            debug!(evicted, "Swept expired messages");
        }

        for (group_id, remaining_timestamps) in cleared {
            state.broadcast(
                &ServerEvent::MessagesCleared {
                    remaining_timestamps,
                    group_id: group_id.clone(),
                },
                None,
                Some(&group_id),
            );
        }
    }

    /// Check whether a connection has joined a group.
    #[must_use]
    pub fn is_joined(&self, connection_id: &str) -> bool {
        self.lock().directory.is_joined(connection_id)
    }

    /// Current catalog summaries with live counts.
    #[must_use]
    pub fn summaries(&self) -> Vec<papo_protocol::GroupSummary> {
        self.lock().registry.summaries()
    }

    /// Current service size.
    #[must_use]
    pub fn stats(&self) -> ServiceStats {
        let state = self.lock();
        ServiceStats {
            connections: state.directory.connection_count(),
            sessions: state.directory.session_count(),
            groups: state.registry.len(),
            messages_expired: self.expired_total.load(Ordering::Relaxed),
        }
    }

    /// Spawn the periodic history sweeper for a joined session and hand the
    /// task to the session record, which aborts it when the session ends.
    fn start_sweeper(self: &Arc<Self>, connection_id: &str) {
        let service = Arc::clone(self);
        let period = self.config.sweep_interval;
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it.
            tick.tick().await;
            loop {
                tick.tick().await;
                service.sweep_expired();
            }
        });
        self.lock().directory.attach_sweeper(connection_id, handle);
    }

    /// Returns true if a session was created.
    fn join(&self, connection_id: &str, username: String, group_id: Option<String>) -> bool {
        let mut state = self.lock();

        if !state.directory.is_registered(connection_id) {
            debug!(connection = %connection_id, "Join from unregistered connection ignored");
            return false;
        }
        if state.directory.is_joined(connection_id) {
            debug!(connection = %connection_id, "Join ignored: already joined");
            return false;
        }

        // Absent group id falls back to the default; an unknown id is a
        // silent no-op.
        let target = group_id.unwrap_or_else(|| self.config.default_group.clone());

        let user = UserInfo {
            id: next_user_id(),
            username,
            connected_at: now_millis(),
        };

        let (history, users, user_count) = match state.registry.get_mut(&target) {
            Some(group) => {
                group.add_member(connection_id.to_string(), user.clone());
                (
                    group.recent_messages(self.config.history_limit),
                    group.member_list(),
                    group.member_count(),
                )
            }
            None => {
                debug!(connection = %connection_id, group = %target, "Join rejected: unknown group");
                return false;
            }
        };
        state.directory.bind(connection_id.to_string(), target.clone());

        info!(connection = %connection_id, user = %user.username, group = %target, "User joined");

        let catalog = state.registry.summaries();
        state.send_to(
            connection_id,
            &ServerEvent::GroupList {
                groups: catalog.clone(),
            },
        );
        state.send_to(
            connection_id,
            &ServerEvent::History {
                messages: history,
                group_id: target.clone(),
            },
        );
        state.send_to(connection_id, &ServerEvent::UserList { users });

        state.broadcast(
            &ServerEvent::UserJoined {
                user,
                user_count,
                group_id: target.clone(),
            },
            None,
            Some(&target),
        );
        state.broadcast(&ServerEvent::GroupList { groups: catalog }, None, None);

        true
    }

    fn switch_group(&self, connection_id: &str, target: String) {
        let mut state = self.lock();

        let Some(current) = state
            .directory
            .current_group(connection_id)
            .map(str::to_string)
        else {
            debug!(connection = %connection_id, "Switch ignored: not joined");
            return;
        };
        if !state.registry.contains(&target) {
            debug!(connection = %connection_id, group = %target, "Switch rejected: unknown group");
            return;
        }
        if current == target {
            debug!(connection = %connection_id, group = %target, "Switch to current group is a no-op");
            return;
        }

        // Move the user record between memberships. Both groups are behind
        // the same lock, so no observer sees the user in two groups or none.
        let Some(user) = state
            .registry
            .get_mut(&current)
            .and_then(|g| g.remove_member(connection_id))
        else {
            warn!(connection = %connection_id, group = %current, "Session bound to group without membership");
            return;
        };
        let old_count = state.registry.get(&current).map_or(0, Group::member_count);

        let (history, new_count, summary) = match state.registry.get_mut(&target) {
            Some(group) => {
                group.add_member(connection_id.to_string(), user.clone());
                (
                    group.recent_messages(self.config.history_limit),
                    group.member_count(),
                    group.summary(),
                )
            }
            // Unreachable: existence was checked under this same lock.
            None => return,
        };
        state.directory.rebind(connection_id, target.clone());

        info!(connection = %connection_id, user = %user.username, from = %current, to = %target, "User switched group");

        state.broadcast(
            &ServerEvent::UserLeft {
                username: user.username.clone(),
                user_count: old_count,
                group_id: current.clone(),
            },
            None,
            Some(&current),
        );

        state.send_to(
            connection_id,
            &ServerEvent::History {
                messages: history,
                group_id: target.clone(),
            },
        );
        state.send_to(
            connection_id,
            &ServerEvent::GroupSwitched {
                group_id: target.clone(),
                group: summary,
            },
        );

        state.broadcast(
            &ServerEvent::UserJoined {
                user,
                user_count: new_count,
                group_id: target.clone(),
            },
            None,
            Some(&target),
        );
        state.broadcast(
            &ServerEvent::GroupList {
                groups: state.registry.summaries(),
            },
            None,
            None,
        );
    }

    fn post_message(&self, connection_id: &str, text: String) {
        // Whitespace-only messages are dropped; accepted text is stored
        // untrimmed.
        if text.trim().is_empty() {
            debug!(connection = %connection_id, "Dropped empty message");
            return;
        }

        let mut state = self.lock();

        let Some(group_id) = state
            .directory
            .current_group(connection_id)
            .map(str::to_string)
        else {
            debug!(connection = %connection_id, "Message before join ignored");
            return;
        };
        let Some(username) = state
            .registry
            .get(&group_id)
            .and_then(|g| g.member(connection_id))
            .map(|u| u.username.clone())
        else {
            return;
        };

        let message = ChatMessage::new(username, text);
        if let Some(group) = state.registry.get_mut(&group_id) {
            group.push_message(message.clone());
        }

        state.broadcast(
            &ServerEvent::Message {
                message,
                group_id: group_id.clone(),
            },
            None,
            Some(&group_id),
        );
    }

    fn set_typing(&self, connection_id: &str, is_typing: bool) {
        let state = self.lock();

        let Some(group_id) = state.directory.current_group(connection_id) else {
            debug!(connection = %connection_id, "Typing before join ignored");
            return;
        };
        let Some(username) = state
            .registry
            .get(group_id)
            .and_then(|g| g.member(connection_id))
            .map(|u| u.username.clone())
        else {
            return;
        };

        let group_id = group_id.to_string();
        state.broadcast(
            &ServerEvent::Typing {
                username,
                is_typing,
            },
            Some(connection_id),
            Some(&group_id),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::default_catalog;
    use tokio::sync::mpsc;

    fn test_service(config: ServiceConfig) -> Arc<ChatService> {
        Arc::new(ChatService::new(&default_catalog(), config).unwrap())
    }

    fn connect(service: &Arc<ChatService>, id: &str) -> mpsc::UnboundedReceiver<Arc<str>> {
        let (tx, rx) = mpsc::unbounded_channel();
        service.register_connection(id.to_string(), tx);
        rx
    }

    fn join(service: &Arc<ChatService>, id: &str, username: &str, group: Option<&str>) {
        service.handle_command(
            id,
            ClientCommand::Join {
                username: username.into(),
                group_id: group.map(String::from),
            },
        );
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Arc<str>>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(raw) = rx.try_recv() {
            events.push(serde_json::from_str(&raw).unwrap());
        }
        events
    }

    fn count_of(service: &Arc<ChatService>, group: &str) -> usize {
        service
            .summaries()
            .into_iter()
            .find(|s| s.id == group)
            .unwrap()
            .user_count
    }

    #[tokio::test]
    async fn test_join_snapshots_and_presence() {
        let service = test_service(ServiceConfig::default());
        let mut rx = connect(&service, "conn-a");

        join(&service, "conn-a", "A", Some("geral"));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 5);
        assert!(matches!(&events[0], ServerEvent::GroupList { groups } if groups.len() == 5));
        assert!(matches!(
            &events[1],
            ServerEvent::History { messages, group_id }
                if messages.is_empty() && group_id == "geral"
        ));
        assert!(matches!(&events[2], ServerEvent::UserList { users } if users.len() == 1));
        assert!(matches!(
            &events[3],
            ServerEvent::UserJoined { user, user_count: 1, group_id }
                if user.username == "A" && group_id == "geral"
        ));
        assert!(matches!(
            &events[4],
            ServerEvent::GroupList { groups }
                if groups.iter().find(|g| g.id == "geral").unwrap().user_count == 1
        ));
    }

    #[tokio::test]
    async fn test_join_defaults_to_default_group() {
        let service = test_service(ServiceConfig::default());
        let mut rx = connect(&service, "conn-a");

        join(&service, "conn-a", "A", None);

        assert_eq!(count_of(&service, "geral"), 1);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, ServerEvent::UserJoined { group_id, .. } if group_id == "geral")));
    }

    #[tokio::test]
    async fn test_join_unknown_group_is_noop() {
        let service = test_service(ServiceConfig::default());
        let mut rx = connect(&service, "conn-a");

        join(&service, "conn-a", "A", Some("nope"));

        assert!(drain(&mut rx).is_empty());
        assert!(!service.is_joined("conn-a"));
    }

    #[tokio::test]
    async fn test_second_joiner_sees_history_and_members() {
        let service = test_service(ServiceConfig::default());
        let mut rx_a = connect(&service, "conn-a");
        join(&service, "conn-a", "A", Some("geral"));
        service.handle_command("conn-a", ClientCommand::Message { text: "hi".into() });
        drain(&mut rx_a);

        let mut rx_b = connect(&service, "conn-b");
        join(&service, "conn-b", "B", Some("geral"));

        // A sees exactly the presence update and the catalog refresh.
        let events_a = drain(&mut rx_a);
        assert_eq!(events_a.len(), 2);
        assert!(matches!(
            &events_a[0],
            ServerEvent::UserJoined { user, user_count: 2, group_id }
                if user.username == "B" && group_id == "geral"
        ));
        assert!(matches!(&events_a[1], ServerEvent::GroupList { .. }));

        // B's history snapshot carries A's earlier message.
        let events_b = drain(&mut rx_b);
        assert!(matches!(
            &events_b[1],
            ServerEvent::History { messages, .. }
                if messages.len() == 1 && messages[0].text == "hi"
        ));
        assert!(matches!(
            &events_b[2],
            ServerEvent::UserList { users } if users.len() == 2
        ));
    }

    #[tokio::test]
    async fn test_message_scoped_to_group_including_sender() {
        let service = test_service(ServiceConfig::default());
        let mut rx_a = connect(&service, "conn-a");
        let mut rx_b = connect(&service, "conn-b");
        join(&service, "conn-a", "A", Some("geral"));
        join(&service, "conn-b", "B", Some("tecnologia"));
        drain(&mut rx_a);
        drain(&mut rx_b);

        service.handle_command("conn-a", ClientCommand::Message { text: "hi".into() });

        let events_a = drain(&mut rx_a);
        assert_eq!(events_a.len(), 1);
        assert!(matches!(
            &events_a[0],
            ServerEvent::Message { message, group_id }
                if message.username == "A" && message.text == "hi" && group_id == "geral"
        ));
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn test_empty_message_dropped() {
        let service = test_service(ServiceConfig::default());
        let mut rx = connect(&service, "conn-a");
        join(&service, "conn-a", "A", Some("geral"));
        drain(&mut rx);

        service.handle_command("conn-a", ClientCommand::Message { text: "   ".into() });

        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_typing_excludes_sender() {
        let service = test_service(ServiceConfig::default());
        let mut rx_a = connect(&service, "conn-a");
        let mut rx_b = connect(&service, "conn-b");
        join(&service, "conn-a", "A", Some("geral"));
        join(&service, "conn-b", "B", Some("geral"));
        drain(&mut rx_a);
        drain(&mut rx_b);

        service.handle_command("conn-a", ClientCommand::Typing { is_typing: true });

        assert!(drain(&mut rx_a).is_empty());
        let events_b = drain(&mut rx_b);
        assert_eq!(events_b.len(), 1);
        assert!(matches!(
            &events_b[0],
            ServerEvent::Typing { username, is_typing: true } if username == "A"
        ));
    }

    #[tokio::test]
    async fn test_commands_before_join_ignored() {
        let service = test_service(ServiceConfig::default());
        let mut rx = connect(&service, "conn-a");

        service.handle_command("conn-a", ClientCommand::Message { text: "hi".into() });
        service.handle_command("conn-a", ClientCommand::Typing { is_typing: true });
        service.handle_command("conn-a", ClientCommand::SwitchGroup { group_id: "games".into() });
        service.handle_command("conn-a", ClientCommand::Unknown);

        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_switch_group_flow() {
        let service = test_service(ServiceConfig::default());
        let mut rx_a = connect(&service, "conn-a");
        let mut rx_b = connect(&service, "conn-b");
        join(&service, "conn-a", "A", Some("geral"));
        join(&service, "conn-b", "B", Some("geral"));
        drain(&mut rx_a);
        drain(&mut rx_b);

        service.handle_command(
            "conn-b",
            ClientCommand::SwitchGroup {
                group_id: "tecnologia".into(),
            },
        );

        // User is in exactly one group at any observation point.
        assert_eq!(count_of(&service, "geral"), 1);
        assert_eq!(count_of(&service, "tecnologia"), 1);

        let events_a = drain(&mut rx_a);
        assert_eq!(events_a.len(), 2);
        assert!(matches!(
            &events_a[0],
            ServerEvent::UserLeft { username, user_count: 1, group_id }
                if username == "B" && group_id == "geral"
        ));
        assert!(matches!(&events_a[1], ServerEvent::GroupList { .. }));

        let events_b = drain(&mut rx_b);
        assert_eq!(events_b.len(), 4);
        assert!(matches!(
            &events_b[0],
            ServerEvent::History { messages, group_id }
                if messages.is_empty() && group_id == "tecnologia"
        ));
        assert!(matches!(
            &events_b[1],
            ServerEvent::GroupSwitched { group_id, group }
                if group_id == "tecnologia" && group.user_count == 1
        ));
        assert!(matches!(
            &events_b[2],
            ServerEvent::UserJoined { user_count: 1, group_id, .. } if group_id == "tecnologia"
        ));
        assert!(matches!(&events_b[3], ServerEvent::GroupList { .. }));
    }

    #[tokio::test]
    async fn test_switch_to_same_group_is_noop() {
        let service = test_service(ServiceConfig::default());
        let mut rx = connect(&service, "conn-a");
        join(&service, "conn-a", "A", Some("geral"));
        drain(&mut rx);

        service.handle_command(
            "conn-a",
            ClientCommand::SwitchGroup {
                group_id: "geral".into(),
            },
        );

        assert!(drain(&mut rx).is_empty());
        assert_eq!(count_of(&service, "geral"), 1);
    }

    #[tokio::test]
    async fn test_switch_to_unknown_group_is_noop() {
        let service = test_service(ServiceConfig::default());
        let mut rx = connect(&service, "conn-a");
        join(&service, "conn-a", "A", Some("geral"));
        drain(&mut rx);

        service.handle_command(
            "conn-a",
            ClientCommand::SwitchGroup {
                group_id: "nope".into(),
            },
        );

        assert!(drain(&mut rx).is_empty());
        assert_eq!(count_of(&service, "geral"), 1);
    }

    #[tokio::test]
    async fn test_unjoined_connection_receives_catalog_broadcasts() {
        let service = test_service(ServiceConfig::default());
        let mut rx_x = connect(&service, "conn-x");
        let _rx_a = connect(&service, "conn-a");

        join(&service, "conn-a", "A", Some("geral"));

        let events_x = drain(&mut rx_x);
        assert_eq!(events_x.len(), 1);
        assert!(matches!(&events_x[0], ServerEvent::GroupList { .. }));
    }

    #[tokio::test]
    async fn test_disconnect_notifies_former_group() {
        let service = test_service(ServiceConfig::default());
        let mut rx_a = connect(&service, "conn-a");
        let mut rx_b = connect(&service, "conn-b");
        join(&service, "conn-a", "A", Some("geral"));
        join(&service, "conn-b", "B", Some("geral"));
        drain(&mut rx_a);
        drain(&mut rx_b);

        service.disconnect("conn-b");

        let events_a = drain(&mut rx_a);
        assert_eq!(events_a.len(), 2);
        assert!(matches!(
            &events_a[0],
            ServerEvent::UserLeft { username, user_count: 1, group_id }
                if username == "B" && group_id == "geral"
        ));
        assert!(matches!(&events_a[1], ServerEvent::GroupList { .. }));
        assert_eq!(count_of(&service, "geral"), 1);
        assert_eq!(service.stats().connections, 1);
    }

    #[tokio::test]
    async fn test_history_capacity_keeps_most_recent() {
        let config = ServiceConfig {
            history_capacity: 3,
            ..ServiceConfig::default()
        };
        let service = test_service(config);
        let mut rx_a = connect(&service, "conn-a");
        join(&service, "conn-a", "A", Some("geral"));
        for i in 0..5 {
            service.handle_command(
                "conn-a",
                ClientCommand::Message {
                    text: format!("m{i}"),
                },
            );
        }
        drain(&mut rx_a);

        let mut rx_b = connect(&service, "conn-b");
        join(&service, "conn-b", "B", Some("geral"));

        let events_b = drain(&mut rx_b);
        let ServerEvent::History { messages, .. } = &events_b[1] else {
            panic!("expected history snapshot");
        };
        let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_sweep_emits_cleared_with_survivors() {
        let config = ServiceConfig {
            message_ttl: Duration::ZERO,
            ..ServiceConfig::default()
        };
        let service = test_service(config);
        let mut rx = connect(&service, "conn-a");
        join(&service, "conn-a", "A", Some("geral"));
        service.handle_command("conn-a", ClientCommand::Message { text: "old".into() });
        drain(&mut rx);

        service.sweep_expired();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            ServerEvent::MessagesCleared { remaining_timestamps, group_id }
                if remaining_timestamps.is_empty() && group_id == "geral"
        ));
    }

    #[tokio::test]
    async fn test_sweep_counts_expired_messages() {
        let config = ServiceConfig {
            message_ttl: Duration::ZERO,
            ..ServiceConfig::default()
        };
        let service = test_service(config);
        let mut rx = connect(&service, "conn-a");
        join(&service, "conn-a", "A", Some("geral"));
        service.handle_command("conn-a", ClientCommand::Message { text: "um".into() });
        service.handle_command("conn-a", ClientCommand::Message { text: "dois".into() });
        drain(&mut rx);
        assert_eq!(service.stats().messages_expired, 0);

        service.sweep_expired();
        assert_eq!(service.stats().messages_expired, 2);

        // An empty sweep leaves the total untouched.
        service.sweep_expired();
        assert_eq!(service.stats().messages_expired, 2);
    }

    #[tokio::test]
    async fn test_sweep_without_expiry_emits_nothing() {
        let service = test_service(ServiceConfig::default());
        let mut rx = connect(&service, "conn-a");
        join(&service, "conn-a", "A", Some("geral"));
        service.handle_command("conn-a", ClientCommand::Message { text: "fresh".into() });
        drain(&mut rx);

        service.sweep_expired();

        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_task_fires_periodically() {
        let config = ServiceConfig {
            message_ttl: Duration::ZERO,
            ..ServiceConfig::default()
        };
        let service = test_service(config);
        let mut rx = connect(&service, "conn-a");
        join(&service, "conn-a", "A", Some("geral"));
        service.handle_command("conn-a", ClientCommand::Message { text: "old".into() });
        drain(&mut rx);

        // Let the sweeper task start its interval before moving the clock.
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::MessagesCleared { group_id, .. } if group_id == "geral")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_after_disconnect() {
        let config = ServiceConfig {
            message_ttl: Duration::ZERO,
            ..ServiceConfig::default()
        };
        let service = test_service(config);
        let mut rx_a = connect(&service, "conn-a");
        join(&service, "conn-a", "A", Some("geral"));
        service.handle_command("conn-a", ClientCommand::Message { text: "hi".into() });
        drain(&mut rx_a);

        service.disconnect("conn-a");
        // A leaked sweeper would clear the history within two periods.
        tokio::time::advance(Duration::from_secs(121)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let mut rx_b = connect(&service, "conn-b");
        join(&service, "conn-b", "B", Some("geral"));
        let events_b = drain(&mut rx_b);
        assert!(matches!(
            &events_b[1],
            ServerEvent::History { messages, .. }
                if messages.len() == 1 && messages[0].text == "hi"
        ));
    }

    #[tokio::test]
    async fn test_user_ids_unique() {
        let id_a = next_user_id();
        let id_b = next_user_id();
        assert_ne!(id_a, id_b);
        assert!(id_a.starts_with("user_"));
    }
}
