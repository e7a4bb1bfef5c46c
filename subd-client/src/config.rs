//! Client configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via SUBD_CONFIG or --config)
//! 3. Environment variables
//!
//! Command-line flags are applied on top by the binary.

use crate::connection::ConnectionConfig;
use crate::state::DEFAULT_STATE_FILE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use subd_protocol::{DEFAULT_HOST, DEFAULT_PORT, MAX_PAYLOAD_SIZE};

/// Client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server connection settings.
    pub network: NetworkConfig,
    /// Change-notification polling.
    pub sync: SyncConfig,
    /// Persisted session state.
    pub state: StateConfig,
}

impl ClientConfig {
    /// Loads configuration from `path` (or `SUBD_CONFIG`), then applies
    /// environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match std::env::var("SUBD_CONFIG") {
                Ok(path) => Self::from_file(&path)?,
                Err(_) => Self::default(),
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: ClientConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Applies overrides from a key lookup (the process environment in
    /// [`ClientConfig::load`]). Unparsable values are ignored.
    pub fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        self.network.apply_overrides(&get);
        self.sync.apply_overrides(&get);
        self.state.apply_overrides(&get);
    }

    /// Checks values that would make the client unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "network.host must not be empty".to_string(),
            ));
        }
        if self.network.port == 0 {
            return Err(ConfigError::ValidationError(
                "network.port must be non-zero".to_string(),
            ));
        }
        if self.network.max_reply_size == 0 || self.network.max_reply_size > MAX_PAYLOAD_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "network.max_reply_size must be between 1 and {}",
                MAX_PAYLOAD_SIZE
            )));
        }
        if self.state.path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "state.path must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }

    /// Builds the transport settings.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::new(self.network.host.clone(), self.network.port)
            .with_connect_timeout(self.network.connect_timeout())
            .with_request_timeout(self.network.request_timeout())
            .with_max_reply_size(self.network.max_reply_size)
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Request timeout in seconds; absent or 0 waits forever.
    pub request_timeout_secs: Option<u64>,
    /// Largest reply payload accepted, in bytes.
    pub max_reply_size: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout_secs: 10,
            request_timeout_secs: None,
            max_reply_size: MAX_PAYLOAD_SIZE,
        }
    }
}

impl NetworkConfig {
    fn apply_overrides(&mut self, get: &impl Fn(&str) -> Option<String>) {
        if let Some(host) = get("SUBD_HOST") {
            if !host.trim().is_empty() {
                self.host = host.trim().to_string();
            }
        }

        if let Some(port) = get("SUBD_PORT") {
            if let Ok(port) = port.parse() {
                self.port = port;
            }
        }

        if let Some(timeout) = get("SUBD_CONNECT_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.connect_timeout_secs = secs;
            }
        }

        if let Some(timeout) = get("SUBD_REQUEST_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.request_timeout_secs = Some(secs);
            }
        }

        if let Some(size) = get("SUBD_MAX_REPLY_SIZE") {
            if let Ok(size) = size.parse() {
                self.max_reply_size = size;
            }
        }
    }

    /// Returns connect timeout as Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Returns the request timeout, if enabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Notification polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Whether to watch for changes made by other clients.
    pub enabled: bool,
    /// Poll interval in milliseconds (clamped to 200..=1000).
    pub poll_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 500,
        }
    }
}

impl SyncConfig {
    fn apply_overrides(&mut self, get: &impl Fn(&str) -> Option<String>) {
        if let Some(enabled) = get("SUBD_SYNC_ENABLED") {
            self.enabled = enabled == "1" || enabled.to_lowercase() == "true";
        }
        if let Some(interval) = get("SUBD_POLL_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                self.poll_interval_ms = ms;
            }
        }
    }

    /// Returns the poll interval as Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Session state persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Path of the JSON state file.
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_STATE_FILE),
        }
    }
}

impl StateConfig {
    fn apply_overrides(&mut self, get: &impl Fn(&str) -> Option<String>) {
        if let Some(path) = get("SUBD_STATE_FILE") {
            if !path.is_empty() {
                self.path = PathBuf::from(path);
            }
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
