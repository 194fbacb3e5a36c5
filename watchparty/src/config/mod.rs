//! Configuration for the `WatchParty` client library.
//!
//! Layered with the following priority (highest first):
//! 1. TOML config file (`~/.config/watchparty/config.toml`)
//! 2. Compiled defaults
//!
//! A missing config file is not an error (defaults are used). An
//! explicit path that doesn't exist is an error. Embedding applications
//! layer their own CLI/env handling on top and pass the resolved values
//! down.

use std::path::PathBuf;
use std::time::Duration;

use crate::connection::ReconnectConfig;
use crate::room::{DEFAULT_MESSAGE_CAP, SessionConfig};
use crate::transfer::DEFAULT_TRACKERS;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    connection: ConnectionFileConfig,
    room: RoomFileConfig,
    transfer: TransferFileConfig,
}

/// `[connection]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConnectionFileConfig {
    ws_base_url: Option<String>,
    reconnect_base_interval_ms: Option<u64>,
    reconnect_max_delay_ms: Option<u64>,
    reconnect_max_attempts: Option<u32>,
}

/// `[room]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RoomFileConfig {
    message_cap: Option<usize>,
}

/// `[transfer]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct TransferFileConfig {
    trackers: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket base URL of the room server.
    pub ws_base_url: String,
    /// Reconnection backoff policy.
    pub reconnect: ReconnectConfig,
    /// Bound on retained chat messages per room.
    pub message_cap: usize,
    /// WebSocket tracker endpoints for swarm peer discovery.
    pub trackers: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_base_url: "ws://localhost:8080".to_string(),
            reconnect: ReconnectConfig::default(),
            message_cap: DEFAULT_MESSAGE_CAP,
            trackers: DEFAULT_TRACKERS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file merged over defaults.
    ///
    /// If `explicit_path` is `Some`, the file must exist. If `None`, the
    /// default path (`~/.config/watchparty/config.toml`) is tried and
    /// silently ignored when missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be
    /// read, or if any found file fails to parse.
    pub fn load(explicit_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let file = load_config_file(explicit_path)?;
        Ok(Self::resolve(&file))
    }

    /// Resolve a `ClientConfig` from a parsed config file.
    ///
    /// Priority: file > default. Separated from `load()` to enable unit
    /// testing without filesystem access.
    #[must_use]
    fn resolve(file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            ws_base_url: file
                .connection
                .ws_base_url
                .clone()
                .unwrap_or(defaults.ws_base_url),
            reconnect: ReconnectConfig {
                base_interval: file
                    .connection
                    .reconnect_base_interval_ms
                    .map_or(defaults.reconnect.base_interval, Duration::from_millis),
                max_delay: file
                    .connection
                    .reconnect_max_delay_ms
                    .map_or(defaults.reconnect.max_delay, Duration::from_millis),
                max_attempts: file
                    .connection
                    .reconnect_max_attempts
                    .unwrap_or(defaults.reconnect.max_attempts),
            },
            message_cap: file.room.message_cap.unwrap_or(defaults.message_cap),
            trackers: file
                .transfer
                .trackers
                .clone()
                .unwrap_or(defaults.trackers),
        }
    }

    /// Build a [`SessionConfig`] for joining `room_code` under this
    /// configuration.
    #[must_use]
    pub fn session_config(&self, room_code: impl Into<String>) -> SessionConfig {
        let mut session = SessionConfig::new(self.ws_base_url.clone(), room_code);
        session.message_cap = self.message_cap;
        session.reconnect = self.reconnect.clone();
        session
    }
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and a
/// missing file is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            // No config dir available — use defaults.
            return Ok(ConfigFile::default());
        };
        config_dir.join("watchparty").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
