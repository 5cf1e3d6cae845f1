//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (PAPO_*)
//! - TOML configuration file
//!
//! The group catalog is part of the configuration; deployments can replace
//! the built-in five-group catalog from TOML.

use anyhow::{Context, Result};
use papo_core::{default_catalog, CatalogEntry, ServiceConfig};
use papo_protocol::MAX_FRAME_SIZE;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Chat behavior configuration.
    #[serde(default)]
    pub chat: ChatConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for the WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,
}

/// Chat behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Group joined when a `join` command names none.
    #[serde(default = "default_group")]
    pub default_group: String,

    /// Messages retained per group before FIFO eviction.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Messages included in a history snapshot.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Age in seconds past which messages are evicted.
    #[serde(default = "default_message_ttl_secs")]
    pub message_ttl_secs: u64,

    /// Period in seconds of the history sweeper.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Maximum accepted inbound frame size in bytes.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// The group catalog.
    #[serde(default = "default_catalog")]
    pub catalog: Vec<CatalogEntry>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("PAPO_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("PAPO_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3015)
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_group() -> String {
    "geral".to_string()
}

fn default_history_capacity() -> usize {
    100
}

fn default_history_limit() -> usize {
    50
}

fn default_message_ttl_secs() -> u64 {
    60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_max_frame_size() -> usize {
    MAX_FRAME_SIZE
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            chat: ChatConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_group: default_group(),
            history_capacity: default_history_capacity(),
            history_limit: default_history_limit(),
            message_ttl_secs: default_message_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_frame_size: default_max_frame_size(),
            catalog: default_catalog(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl ChatConfig {
    /// Core service tunables derived from this section.
    #[must_use]
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            default_group: self.default_group.clone(),
            history_capacity: self.history_capacity,
            history_limit: self.history_limit,
            message_ttl: Duration::from_secs(self.message_ttl_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        // Try to load from default paths
        let config_paths = ["papo.toml", "/etc/papo/papo.toml", "~/.config/papo/papo.toml"];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Invalid host:port")
    }
}
