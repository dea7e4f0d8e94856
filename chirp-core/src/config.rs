//! Bot configuration, persisted as TOML
//!
//! A missing file yields the default config so first runs work without
//! any setup. The admin plugin writes the file back after mutating the
//! prefix, the admin lists or the enabled plugin set.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::socket::{Reconnection, SocketConfig};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Reconnection policy section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectionConfig {
    pub enable: bool,
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            enable: true,
            attempts: 10,
            delay_ms: 5000,
        }
    }
}

/// Top-level bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Endpoint host
    pub host: String,
    /// Endpoint port
    pub port: u16,
    /// Use wss instead of ws
    pub secure: bool,
    /// Access token appended to the connection URL
    pub access_token: Option<String>,
    /// Command prefix for the admin plugin
    pub prefix: String,
    /// User ids with full control (settings commands included)
    pub root: Vec<i64>,
    /// User ids allowed to run admin commands
    pub admins: Vec<i64>,
    /// Enabled user plugins, by directory name
    pub plugins: Vec<String>,
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    pub reconnection: ReconnectionConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            secure: false,
            access_token: None,
            prefix: "/".to_string(),
            root: Vec::new(),
            admins: Vec::new(),
            plugins: Vec::new(),
            log_level: "info".to_string(),
            reconnection: ReconnectionConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load from a TOML file, returning the default config when the file
    /// does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save to a TOML file, creating parent directories as needed
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// True when `user_id` may run admin commands
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.root.contains(&user_id) || self.admins.contains(&user_id)
    }

    /// True when `user_id` may change bot settings
    pub fn is_root(&self, user_id: i64) -> bool {
        self.root.contains(&user_id)
    }

    /// Derive the transport configuration
    pub fn socket_config(&self) -> SocketConfig {
        SocketConfig {
            host: self.host.clone(),
            port: self.port,
            secure: self.secure,
            access_token: self.access_token.clone(),
            reconnection: Reconnection {
                enable: self.reconnection.enable,
                attempts: self.reconnection.attempts,
                delay: Duration::from_millis(self.reconnection.delay_ms),
            },
        }
    }
}
