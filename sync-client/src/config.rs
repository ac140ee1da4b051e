//! Configuration loading for trailsync clients.
//!
//! Configuration is loaded from a TOML file (default: `trailsync.toml`).
//! Every section and field is optional.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root client configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// REST API settings.
    pub api: ApiConfig,
    /// Realtime channel settings.
    pub realtime: RealtimeConfig,
    /// Idle detection settings.
    pub idle: IdleConfig,
    /// Session migration settings.
    pub migration: MigrationConfig,
    /// Local cache settings.
    pub cache: CacheConfig,
}

/// REST API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL all REST paths are appended to (default: http://localhost:3000/api).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Extra attempts for the initial preference load (default: 2).
    #[serde(default = "default_load_retries")]
    pub load_retries: u32,
}

/// Realtime channel configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// WebSocket URL (default: ws://localhost:3000/ws).
    #[serde(default = "default_realtime_url")]
    pub url: String,
    /// Socket connect timeout in seconds (default: 10).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Reconnect attempts per outage before giving up (default: 10).
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

/// Idle detection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IdleConfig {
    /// Inactivity before the client counts as idle, in seconds (default: 60).
    #[serde(default = "default_idle_threshold_secs")]
    pub threshold_secs: u64,
    /// Idle check interval in seconds (default: 30).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

/// Session migration configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MigrationConfig {
    /// Lifetime of an anonymous session marker in hours (default: 24).
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u64,
}

/// Local cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of the cached map view in hours (default: 24).
    #[serde(default = "default_map_view_ttl_hours")]
    pub map_view_ttl_hours: u64,
}

// Default value functions
fn default_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_load_retries() -> u32 {
    2
}

fn default_realtime_url() -> String {
    "ws://localhost:3000/ws".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_idle_threshold_secs() -> u64 {
    60
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_session_ttl_hours() -> u64 {
    24
}

fn default_map_view_ttl_hours() -> u64 {
    24
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            load_retries: default_load_retries(),
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: default_realtime_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            threshold_secs: default_idle_threshold_secs(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: default_session_ttl_hours(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            map_view_ttl_hours: default_map_view_ttl_hours(),
        }
    }
}

impl RealtimeConfig {
    /// Connect timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl IdleConfig {
    /// Idle threshold as a `Duration`.
    pub fn threshold(&self) -> Duration {
        Duration::from_secs(self.threshold_secs)
    }

    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl MigrationConfig {
    /// Marker lifetime as a `Duration`.
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_hours * 60 * 60)
    }
}

impl CacheConfig {
    /// Map view lifetime as a `Duration`.
    pub fn map_view_ttl(&self) -> Duration {
        Duration::from_secs(self.map_view_ttl_hours * 60 * 60)
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
