//! TOML configuration file for the bridge binary.
//!
//! Every field is optional on disk: a missing field takes the same default as
//! [`BridgeConfig::default`], so an empty file is a valid configuration.
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//! read_timeout_ms = 1000
//! write_timeout_ms = 1000
//!
//! [server]
//! bind_address = "0.0.0.0"
//! port = 8765
//! client_queue_capacity = 64
//!
//! [device]
//! id = "5"
//! forward_empty_commands = false
//! max_consecutive_read_errors = 10
//! ```
//!
//! Command-line flags are applied on top of the loaded values in `main.rs`.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::config::{
    BridgeConfig, SerialSettings, DEFAULT_BAUD_RATE, DEFAULT_LISTEN_PORT, DEFAULT_SERIAL_PORT,
};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is not usable.
    #[error("invalid config value: {0}")]
    Invalid(String),
}

// ── Schema ────────────────────────────────────────────────────────────────────

/// On-disk layout of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileConfig {
    #[serde(default)]
    pub serial: SerialSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub device: DeviceSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SerialSection {
    #[serde(default = "default_serial_port")]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub write_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerSection {
    /// IP address to bind to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_listen_port")]
    pub port: u16,
    #[serde(default = "default_queue_capacity")]
    pub client_queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceSection {
    /// Inserted into command frames; absent or blank means none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub forward_empty_commands: bool,
    #[serde(default = "default_max_read_errors")]
    pub max_consecutive_read_errors: u32,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_serial_port() -> String {
    DEFAULT_SERIAL_PORT.to_string()
}
fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}
fn default_timeout_ms() -> u64 {
    1000
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_listen_port() -> u16 {
    DEFAULT_LISTEN_PORT
}
fn default_queue_capacity() -> usize {
    64
}
fn default_max_read_errors() -> u32 {
    10
}

impl Default for SerialSection {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_timeout_ms(),
            write_timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_listen_port(),
            client_queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            id: None,
            forward_empty_commands: false,
            max_consecutive_read_errors: default_max_read_errors(),
        }
    }
}

impl FileConfig {
    /// Converts the file schema into the engine's configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `server.bind_address` is not an IP
    /// address.
    pub fn into_bridge_config(self) -> Result<BridgeConfig, ConfigError> {
        let ip: IpAddr = self.server.bind_address.trim().parse().map_err(|_| {
            ConfigError::Invalid(format!(
                "server.bind_address {:?} is not an IP address",
                self.server.bind_address
            ))
        })?;

        Ok(BridgeConfig {
            serial: SerialSettings {
                port: self.serial.port,
                baud_rate: self.serial.baud_rate,
                read_timeout: Duration::from_millis(self.serial.read_timeout_ms),
                write_timeout: Duration::from_millis(self.serial.write_timeout_ms),
            },
            ws_bind_addr: SocketAddr::new(ip, self.server.port),
            device_id: self.device.id,
            forward_empty_commands: self.device.forward_empty_commands,
            client_queue_capacity: self.server.client_queue_capacity,
            max_consecutive_read_errors: self.device.max_consecutive_read_errors,
        })
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses configuration from TOML text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed or a value has the
/// wrong type.
pub fn parse_config(content: &str) -> Result<FileConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Loads and converts the configuration file at `path`.
///
/// Unlike a settings store, an explicitly named file must exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read, and
/// [`ConfigError::Parse`] / [`ConfigError::Invalid`] for bad content.
pub fn load_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)?.into_bridge_config()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
