// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bridge configuration.
//!
//! Supports both programmatic and file-based (TOML) configuration.
//! Command-line flags in the binary override values loaded from file.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Default authorization server.
pub const DEFAULT_AUTH_URL: &str = "https://auth.optim.cloud";

/// Default messaging API base URL.
pub const DEFAULT_MESSAGING_URL: &str = "https://messaging.optimcloudapis.com/v2";

/// Relay serial speed (8N1).
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Channel ID
// ---------------------------------------------------------------------------

/// Messaging channel identifier: 20 characters of `[0-9a-v]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId(String);

impl ChannelId {
    /// Length of every channel ID.
    pub const LEN: usize = 20;

    /// Accepted form, anchored at both ends.
    pub const PATTERN: &'static str = r"^[0-9a-v]{20}$";

    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        if channel_pattern()?.is_match(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(ConfigError::Invalid(format!(
                "channel id '{}' must be 20 characters of [0-9a-v]",
                s
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn channel_pattern() -> Result<&'static Regex, ConfigError> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    if let Some(re) = PATTERN.get() {
        return Ok(re);
    }
    let re = Regex::new(ChannelId::PATTERN)
        .map_err(|e| ConfigError::Invalid(format!("channel id pattern: {}", e)))?;
    Ok(PATTERN.get_or_init(|| re))
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ChannelId {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ChannelId> for String {
    fn from(id: ChannelId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// Configuration tree
// ---------------------------------------------------------------------------

/// Top-level bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Serial relay settings.
    #[serde(default)]
    pub serial: SerialConfig,

    /// Cloud credentials and endpoints.
    pub cloud: CloudConfig,
}

/// Serial port settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port name (e.g. `/dev/ttyUSB0`, `COM3`).
    #[serde(default)]
    pub port: String,

    /// Baud rate. The relay ships at 115200; other values are only for
    /// relays whose UART speed has been reconfigured.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Cloud settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Device client ID registered with the authorization server.
    pub client_id: String,

    /// Destination channel.
    pub channel_id: ChannelId,

    /// RSA private key (PEM) used to sign client assertions.
    #[serde(default = "default_private_key_path")]
    pub private_key_path: PathBuf,

    /// Authorization server base URL.
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Messaging API base URL.
    #[serde(default = "default_messaging_url")]
    pub messaging_url: String,

    /// Requested OAuth2 scopes.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// HTTP client timeout (seconds).
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_private_key_path() -> PathBuf {
    PathBuf::from("./jwtRS256.key")
}

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_string()
}

fn default_messaging_url() -> String {
    DEFAULT_MESSAGING_URL.to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["messaging.publish".to_string()]
}

fn default_http_timeout_secs() -> u64 {
    10
}

impl CloudConfig {
    /// Cloud settings with default endpoints, key path and scope.
    pub fn new(client_id: impl Into<String>, channel_id: ChannelId) -> Self {
        Self {
            client_id: client_id.into(),
            channel_id,
            private_key_path: default_private_key_path(),
            auth_url: default_auth_url(),
            messaging_url: default_messaging_url(),
            scopes: default_scopes(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl BridgeConfig {
    /// Create a configuration with defaults for everything but the identity.
    pub fn new(port: impl Into<String>, cloud: CloudConfig) -> Self {
        Self {
            log_level: default_log_level(),
            serial: SerialConfig {
                port: port.into(),
                baud_rate: DEFAULT_BAUD_RATE,
            },
            cloud,
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.port.trim().is_empty() {
            return Err(ConfigError::Invalid("No serial port configured".into()));
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Invalid("Baud rate must be non-zero".into()));
        }
        if self.cloud.client_id.trim().is_empty() {
            return Err(ConfigError::Invalid("No client id configured".into()));
        }
        if self.cloud.scopes.is_empty() {
            return Err(ConfigError::Invalid("At least one scope is required".into()));
        }
        if self.cloud.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "HTTP timeout must be at least one second".into(),
            ));
        }
        for (name, url) in [
            ("auth_url", &self.cloud.auth_url),
            ("messaging_url", &self.cloud.messaging_url),
        ] {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be an http(s) URL, got '{}'",
                    name, url
                )));
            }
        }
        Ok(())
    }
}
