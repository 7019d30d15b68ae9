//! # Configuration Management
//!
//! Centralized configuration for the arena protocol server.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()`
//!
//! ## Fixed Protocol Constants
//! The header size, payload ceiling and string ceiling are dictated by the
//! game client and are not configurable; they live here as constants.

use crate::error::{ProtocolError, Result};
use crate::service::rotation::{default_schedules, EventSlotSchedule};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Size of the frame header: id (2) + length (3) + version (2)
pub const HEADER_LEN: usize = 7;

/// Largest payload a 24-bit length field can declare
pub const MAX_FRAME_PAYLOAD: usize = 0xFF_FFFF;

/// Largest string body the codec will read or write
pub const MAX_STRING_LENGTH: usize = 900_000;

/// Application secret the stock client keys its cipher with
pub const DEFAULT_CIPHER_KEY: &str = "fhsd6f86f67rt8fw78fw789we78r9789wer6re";

/// Nonce appended to the secret when keying the cipher
pub const DEFAULT_CIPHER_NONCE: &str = "nonce";

/// Address the stock client connects to
pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0:9339";

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ArenaConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub cipher: CipherConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub events: EventsConfig,
}

impl ArenaConfig {
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

    /// Defaults with environment variable overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Overlay `ARENA_*` environment variables onto this configuration
    pub fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("ARENA_SERVER_ADDRESS") {
            self.server.address = addr;
        }

        if let Ok(max) = std::env::var("ARENA_MAX_PAYLOAD") {
            if let Ok(val) = max.parse::<usize>() {
                self.server.max_payload_size = val;
            }
        }

        if let Ok(nonce) = std::env::var("ARENA_CIPHER_NONCE") {
            self.cipher.nonce = nonce;
        }

        if let Ok(level) = std::env::var("ARENA_LOG_LEVEL") {
            if let Ok(val) = level.parse::<Level>() {
                self.logging.log_level = val;
            }
        }
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
        errors.extend(self.cipher.validate());
        errors.extend(self.logging.validate());
        errors.extend(self.events.validate());
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

/// Listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:9339")
    pub address: String,

    /// Largest payload a client frame may declare
    pub max_payload_size: usize,

    /// How long serve() waits for open connections after shutdown is signalled
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Interval between metrics log lines; zero disables them
    #[serde(with = "duration_serde")]
    pub metrics_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from(DEFAULT_SERVER_ADDRESS),
            max_payload_size: MAX_FRAME_PAYLOAD,
            shutdown_timeout: Duration::from_secs(10),
            metrics_interval: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:9339')",
                self.address
            ));
        }

        if self.max_payload_size == 0 {
            errors.push("Max payload size cannot be 0".to_string());
        } else if self.max_payload_size > MAX_FRAME_PAYLOAD {
            errors.push(format!(
                "Max payload size {} exceeds the 24-bit frame limit ({MAX_FRAME_PAYLOAD})",
                self.max_payload_size
            ));
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Cipher keying material shared with the client build
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CipherConfig {
    pub key: String,
    pub nonce: String,
}

impl Default for CipherConfig {
    fn default() -> Self {
        Self {
            key: String::from(DEFAULT_CIPHER_KEY),
            nonce: String::from(DEFAULT_CIPHER_NONCE),
        }
    }
}

impl CipherConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.key.is_empty() && self.nonce.is_empty() {
            errors.push("Cipher key and nonce cannot both be empty".to_string());
        }
        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,

    /// Whether to print the event target (module path)
    pub show_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("arena-server"),
            log_level: Level::INFO,
            json_format: false,
            show_target: false,
        }
    }
}

impl LoggingConfig {
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

/// Event rotation schedules, one per slot
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventsConfig {
    pub slots: Vec<EventSlotSchedule>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            slots: default_schedules(),
        }
    }
}

impl EventsConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.slots.is_empty() {
            errors.push("At least one event slot must be configured".to_string());
        }

        for (index, slot) in self.slots.iter().enumerate() {
            if slot.configs.is_empty() {
                errors.push(format!("Schedule for event slot {index} is empty"));
            }
            if slot.duration.is_zero() {
                errors.push(format!("Event slot {index} has a zero rotation duration"));
            }
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
pub(crate) mod duration_serde {
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
