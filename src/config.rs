//! # Configuration Management
//!
//! Centralized configuration for the UDP transport core.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Direct instantiation with defaults
//! - Environment overrides (`SURVIVAL_NET_*`) via `from_env()` / `apply_env()`
//!
//! ## Sizing Rules
//! - The per-connection ring buffer must hold at least one full receive buffer,
//!   otherwise a single datagram could never be handed to its pump
//! - `max_datagram_size` must leave room for fragment overhead, or nothing
//!   oversized could ever be split

use crate::error::{ProtocolError, Result};
use crate::protocol::multipart::{
    DEFAULT_MAX_FRAGMENTS_PER_GROUP, DEFAULT_MAX_PENDING_BYTES, DEFAULT_MAX_PENDING_GROUPS,
    DEFAULT_REASSEMBLY_TIMEOUT, FRAGMENT_OVERHEAD,
};
use crate::utils::ring_buffer::DEFAULT_RING_CAPACITY;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default UDP listen port
pub const DEFAULT_PORT: u16 = 24816;

/// Datagram size above which outbound packets are fragmented
pub const DEFAULT_MAX_DATAGRAM_SIZE: usize = 512;

/// Default socket receive buffer size
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 8192;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "SURVIVAL_NET_";

/// Main network configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Socket, queue and liveness settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Buffer sizing and fragmentation settings
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from `SURVIVAL_NET_*` variables.
    ///
    /// Unparseable values are rejected rather than ignored.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("SERVER_ADDRESS") {
            self.server.address = addr;
        }
        if let Some(v) = lookup("BACKPRESSURE_LIMIT") {
            self.server.backpressure_limit = parse_env("BACKPRESSURE_LIMIT", &v)?;
        }
        if let Some(v) = lookup("MAX_CONNECTIONS") {
            self.server.max_connections = parse_env("MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = lookup("HEARTBEAT_INTERVAL_MS") {
            self.server.heartbeat_interval =
                Duration::from_millis(parse_env("HEARTBEAT_INTERVAL_MS", &v)?);
        }
        if let Some(v) = lookup("IDLE_TIMEOUT_MS") {
            self.server.idle_timeout = Duration::from_millis(parse_env("IDLE_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = lookup("RING_BUFFER_CAPACITY") {
            self.transport.ring_buffer_capacity = parse_env("RING_BUFFER_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("MAX_DATAGRAM_SIZE") {
            self.transport.max_datagram_size = parse_env("MAX_DATAGRAM_SIZE", &v)?;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.logging.log_level = v
                .parse::<Level>()
                .map_err(|_| ProtocolError::ConfigError(format!("Invalid log level: {v}")))?;
        }
        Ok(())
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
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        ProtocolError::ConfigError(format!("Invalid value for {ENV_PREFIX}{key}: '{value}'"))
    })
}

/// Server-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// UDP listen address (e.g., "0.0.0.0:24816")
    pub address: String,

    /// Capacity of the inbound (to manager) and outbound queues
    pub backpressure_limit: usize,

    /// Capacity of each connection's admin side channel
    pub admin_queue_size: usize,

    /// Liveness tick: heartbeat probe, idle check, reassembly expiry
    #[serde(with = "duration_serde")]
    pub heartbeat_interval: Duration,

    /// Close a connection after this long without inbound bytes
    #[serde(with = "duration_serde")]
    pub idle_timeout: Duration,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Maximum number of concurrent connections
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: format!("0.0.0.0:{DEFAULT_PORT}"),
            backpressure_limit: 1024,
            admin_queue_size: 10,
            heartbeat_interval: timeout::HEARTBEAT_INTERVAL,
            idle_timeout: timeout::IDLE_TIMEOUT,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
            max_connections: 512,
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
                "Invalid server address format: '{}' (expected format: '0.0.0.0:24816')",
                self.address
            ));
        }

        if self.backpressure_limit == 0 {
            errors.push("Backpressure limit must be greater than 0".to_string());
        } else if self.backpressure_limit > 1_000_000 {
            errors.push(format!(
                "Backpressure limit too large: {} (max recommended: 1,000,000)",
                self.backpressure_limit
            ));
        }

        if self.admin_queue_size == 0 {
            errors.push("Admin queue size must be greater than 0".to_string());
        }

        if self.heartbeat_interval.as_millis() < 10 {
            errors.push("Heartbeat interval too short (minimum: 10ms)".to_string());
        } else if self.heartbeat_interval.as_secs() > 3600 {
            errors.push("Heartbeat interval too long (maximum: 1 hour)".to_string());
        }

        if self.idle_timeout < self.heartbeat_interval {
            errors.push(format!(
                "Idle timeout ({}ms) must not be shorter than the heartbeat interval ({}ms)",
                self.idle_timeout.as_millis(),
                self.heartbeat_interval.as_millis()
            ));
        }

        if self.shutdown_timeout.is_zero() {
            errors.push("Shutdown timeout must be greater than 0".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        errors
    }
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Per-connection ring buffer capacity in bytes
    pub ring_buffer_capacity: usize,

    /// Size of the socket receive buffer (largest datagram accepted)
    pub recv_buffer_size: usize,

    /// Packed packets larger than this are split into multipart fragments
    pub max_datagram_size: usize,

    /// How long an incomplete multipart group is kept
    #[serde(with = "duration_serde")]
    pub reassembly_timeout: Duration,

    /// Incomplete multipart groups tracked per connection before the oldest is evicted
    pub max_pending_groups: usize,

    /// Largest `num_parts` an inbound fragment may declare
    pub max_fragments_per_group: u16,

    /// Fragment content buffered per connection across all incomplete groups
    pub max_pending_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ring_buffer_capacity: DEFAULT_RING_CAPACITY,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
            reassembly_timeout: DEFAULT_REASSEMBLY_TIMEOUT,
            max_pending_groups: DEFAULT_MAX_PENDING_GROUPS,
            max_fragments_per_group: DEFAULT_MAX_FRAGMENTS_PER_GROUP,
            max_pending_bytes: DEFAULT_MAX_PENDING_BYTES,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.recv_buffer_size == 0 {
            errors.push("Receive buffer size cannot be 0".to_string());
        } else if self.recv_buffer_size > 65_535 {
            errors.push(format!(
                "Receive buffer size too large: {} bytes (maximum UDP payload: 65535)",
                self.recv_buffer_size
            ));
        }

        if self.ring_buffer_capacity < self.recv_buffer_size {
            errors.push(format!(
                "Ring buffer capacity ({}) smaller than receive buffer size ({})",
                self.ring_buffer_capacity, self.recv_buffer_size
            ));
        }

        if self.max_datagram_size <= FRAGMENT_OVERHEAD {
            errors.push(format!(
                "Max datagram size {} leaves no room for fragment content (overhead: {FRAGMENT_OVERHEAD})",
                self.max_datagram_size
            ));
        } else if self.max_datagram_size > self.recv_buffer_size {
            errors.push(format!(
                "Max datagram size ({}) exceeds receive buffer size ({})",
                self.max_datagram_size, self.recv_buffer_size
            ));
        }

        if self.reassembly_timeout.is_zero() {
            errors.push("Reassembly timeout must be greater than 0".to_string());
        }

        if self.max_pending_groups == 0 {
            errors.push("Max pending groups must be greater than 0".to_string());
        }

        if self.max_fragments_per_group == 0 {
            errors.push("Max fragments per group must be greater than 0".to_string());
        }

        if self.max_pending_bytes == 0 {
            errors.push("Max pending bytes must be greater than 0".to_string());
        }

        errors
    }

    /// Largest fragment content that keeps a fragment datagram within
    /// `max_datagram_size`.
    pub fn max_fragment_content(&self) -> usize {
        self.max_datagram_size.saturating_sub(FRAGMENT_OVERHEAD)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for console logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("survival-net"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
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

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Duration fields are written as whole milliseconds
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
