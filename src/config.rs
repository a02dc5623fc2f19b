//! Configuration for the broker host
//!
//! ```toml
//! context = "prod"
//! contexts_dir = "/etc/broker/context"
//!
//! [connection]
//! connect_timeout_secs = 10
//!
//! [[handle]]
//! handler = "forward"
//! subjects = ["sensors/+/temp"]
//! to = "archive/temp"
//! ```
//!
//! Each `[[handle]]` block is tagged by its `handler` key; every other key is
//! kept as an option map for the handler's factory.

use crate::context::ContextStore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Context used when token credentials are not in the environment
    #[serde(default)]
    pub context: String,
    /// Directory holding context profiles (default: user config dir)
    pub contexts_dir: Option<PathBuf>,
    #[serde(default)]
    pub connection: ConnectionSection,
    /// Handler blocks in activation order
    #[serde(default, rename = "handle")]
    pub handlers: Vec<HandlerConfig>,
}

/// One tagged handler block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandlerConfig {
    /// Discriminator naming the handler variant
    pub handler: String,
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

/// Transport tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionSection {
    /// How long to wait for the broker to acknowledge the connection
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Upper bound of the delay between reconnect attempts
    #[serde(default = "default_max_reconnect_delay")]
    pub max_reconnect_delay_ms: u64,
}

/// The MQTT client refuses keep-alive intervals below this
pub const MIN_KEEP_ALIVE_SECS: u64 = 5;

fn default_connect_timeout() -> u64 {
    10
}

fn default_keep_alive() -> u64 {
    60
}

fn default_max_reconnect_delay() -> u64 {
    250
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            keep_alive_secs: default_keep_alive(),
            max_reconnect_delay_ms: default_max_reconnect_delay(),
        }
    }
}

impl ConnectionSection {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AppConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, handler) in self.handlers.iter().enumerate() {
            if handler.handler.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "handle[{index}]: handler discriminator must not be empty"
                )));
            }
        }
        if self.connection.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "connection.connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.connection.keep_alive_secs < MIN_KEEP_ALIVE_SECS {
            return Err(ConfigError::InvalidConfig(format!(
                "connection.keep_alive_secs must be at least {MIN_KEEP_ALIVE_SECS}"
            )));
        }
        Ok(())
    }

    /// Context store this configuration points at
    pub fn context_store(&self) -> ContextStore {
        match &self.contexts_dir {
            Some(dir) => ContextStore::new(dir.clone()),
            None => ContextStore::default_location(),
        }
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
context = "test"

[[handle]]
handler = "forward"
subjects = ["in/#"]
to = "out"

[[handle]]
handler = "reply"
subject = "svc/ping"
body = "pong"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}
