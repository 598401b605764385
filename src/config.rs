//! # Configuration Management
//!
//! Centralized configuration for the RPC server.
//!
//! This module provides structured configuration for the listener, the
//! per-connection request pipeline and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()`
//!
//! ## Limits
//! - `max_in_flight` bounds concurrent workers per connection
//! - `max_frame_size` bounds a single encoded header or body
//! - `handshake_timeout` bounds how long a silent client can hold a socket

use crate::error::{RpcError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Marks a wire-rpc negotiation record
pub const MAGIC_NUMBER: u64 = 0x3bef5d;

/// Max allowed size of one encoded header or body (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Max length of the negotiation record line, newline included
pub const MAX_HANDSHAKE_SIZE: usize = 4096;

/// Default bound on concurrent workers per connection
pub const DEFAULT_MAX_IN_FLIGHT: usize = 256;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RpcConfig {
    /// Server-specific configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RpcConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| RpcError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| RpcError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| RpcError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("WIRE_RPC_SERVER_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(limit) = std::env::var("WIRE_RPC_MAX_IN_FLIGHT") {
            config.server.max_in_flight = limit.parse::<usize>().map_err(|e| {
                RpcError::ConfigError(format!("Invalid WIRE_RPC_MAX_IN_FLIGHT '{limit}': {e}"))
            })?;
        }

        if let Ok(policy) = std::env::var("WIRE_RPC_OVERLOAD_POLICY") {
            config.server.overload_policy = match policy.to_ascii_lowercase().as_str() {
                "queue" => OverloadPolicy::Queue,
                "reject" => OverloadPolicy::Reject,
                other => {
                    return Err(RpcError::ConfigError(format!(
                        "Invalid WIRE_RPC_OVERLOAD_POLICY '{other}' (expected 'queue' or 'reject')"
                    )))
                }
            };
        }

        if let Ok(timeout) = std::env::var("WIRE_RPC_HANDSHAKE_TIMEOUT_MS") {
            let millis = timeout.parse::<u64>().map_err(|e| {
                RpcError::ConfigError(format!(
                    "Invalid WIRE_RPC_HANDSHAKE_TIMEOUT_MS '{timeout}': {e}"
                ))
            })?;
            config.server.handshake_timeout = Duration::from_millis(millis);
        }

        if let Ok(level) = std::env::var("WIRE_RPC_LOG_LEVEL") {
            config.logging.log_level = level.parse::<Level>().map_err(|_| {
                RpcError::ConfigError(format!("Invalid WIRE_RPC_LOG_LEVEL '{level}'"))
            })?;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| RpcError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| RpcError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(RpcError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// What a connection does with a request that arrives while
/// `max_in_flight` workers are already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverloadPolicy {
    /// Stop reading until a worker finishes
    #[default]
    Queue,
    /// Answer immediately with a busy error and keep reading
    Reject,
}

/// Server-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server listen address (e.g., "127.0.0.1:9999")
    pub address: String,

    /// Maximum number of concurrently running workers per connection
    pub max_in_flight: usize,

    /// Behavior once `max_in_flight` is reached
    #[serde(default)]
    pub overload_policy: OverloadPolicy,

    /// Maximum size in bytes of one encoded header or body
    pub max_frame_size: usize,

    /// Time allowed for a client to deliver its negotiation record
    #[serde(with = "duration_serde")]
    pub handshake_timeout: Duration,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:9999"),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            overload_policy: OverloadPolicy::Queue,
            max_frame_size: MAX_FRAME_SIZE,
            handshake_timeout: timeout::HANDSHAKE_TIMEOUT,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:9999')",
                self.address
            ));
        }

        if self.max_in_flight == 0 {
            errors.push("Max in-flight requests must be greater than 0".to_string());
        } else if self.max_in_flight > 1_000_000 {
            errors.push(format!(
                "Max in-flight requests too large: {} (max recommended: 1,000,000)",
                self.max_in_flight
            ));
        }

        if self.max_frame_size < 1024 {
            errors.push("Max frame size too small (minimum: 1 KB)".to_string());
        } else if self.max_frame_size > u32::MAX as usize {
            errors.push(format!(
                "Max frame size too large: {} bytes (must fit in a u32 length prefix)",
                self.max_frame_size
            ));
        }

        if self.handshake_timeout.as_millis() < 100 {
            errors.push("Handshake timeout too short (minimum: 100ms)".to_string());
        } else if self.handshake_timeout.as_secs() > 300 {
            errors.push("Handshake timeout too long (maximum: 300s)".to_string());
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("wire-rpc"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
