//! Connection handlers for the papo server.
//!
//! This module owns the connection lifecycle: accept, register the outbound
//! sink with the chat service, pump frames in both directions, and run the
//! disconnect cleanup when the socket goes away.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use papo_core::ChatService;
use papo_protocol::{codec, ClientCommand};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The chat service.
    pub service: Arc<ChatService>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured group catalog is invalid.
    pub fn new(config: Config) -> Result<Self> {
        let service = ChatService::new(&config.chat.catalog, config.chat.service_config())?;
        Ok(Self {
            service: Arc::new(service),
            config,
        })
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone())?);

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    // Build router
    let app = Router::new()
        .route(&config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    // Bind and serve
    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr).await?;

    info!("papo server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.service.stats();
    metrics::set_messages_expired(stats.messages_expired);
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": stats.connections,
        "sessions": stats.sessions,
        "groups": stats.groups,
        "messagesExpired": stats.messages_expired,
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    // Generate connection ID
    let connection_id = format!(
        "conn_{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    );

    debug!(connection = %connection_id, "WebSocket connected");

    // Split the WebSocket
    let (mut sender, mut receiver) = socket.split();

    // Register the outbound sink before any command can arrive
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Arc<str>>();
    state
        .service
        .register_connection(connection_id.clone(), event_tx);

    // Message processing loop
    loop {
        tokio::select! {
            biased;

            // Forward events emitted by the chat service
            Some(payload) = event_rx.recv() => {
                metrics::record_event(payload.len());
                if sender.send(Message::Text(payload.to_string())).await.is_err() {
                    break;
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match codec::decode_command(&text, state.config.chat.max_frame_size) {
                            Ok(command) => {
                                metrics::record_command(command_label(&command));
                                state.service.handle_command(&connection_id, command);
                            }
                            Err(e) => {
                                // Malformed payloads are dropped; the
                                // connection stays open.
                                warn!(connection = %connection_id, error = %e, "Dropping malformed payload");
                                metrics::record_error("malformed");
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!(connection = %connection_id, "Ignoring binary frame");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup: leave the current group, stop the sweeper, drop the sink
    state.service.disconnect(&connection_id);
    let stats = state.service.stats();
    metrics::set_active_sessions(stats.sessions);
    metrics::set_messages_expired(stats.messages_expired);

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Metric label for an inbound command.
fn command_label(command: &ClientCommand) -> &'static str {
    match command {
        ClientCommand::Join { .. } => "join",
        ClientCommand::SwitchGroup { .. } => "switchGroup",
        ClientCommand::Message { .. } => "message",
        ClientCommand::Typing { .. } => "typing",
        ClientCommand::Unknown => "unknown",
    }
}
