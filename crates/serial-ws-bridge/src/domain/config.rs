//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for one bridge session.  It
//! can be built from CLI arguments, from a TOML file (see
//! `infrastructure::config_file`), or from defaults in tests.
//!
//! Configuration is a plain struct: no global state and no environment reads
//! in here.  The infrastructure layer populates it and calls
//! [`BridgeConfig::validate`] before handing it to the engine.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Default serial baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default WebSocket listen port.
pub const DEFAULT_LISTEN_PORT: u16 = 8765;

/// Default serial endpoint for the current platform.
#[cfg(windows)]
pub const DEFAULT_SERIAL_PORT: &str = "COM1";
/// Default serial endpoint for the current platform.
#[cfg(not(windows))]
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";

/// A configuration value is out of range.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid configuration: {0}")]
pub struct InvalidConfig(pub String);

/// Serial link settings.  Framing is always 8 data bits, no parity, 1 stop bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// Platform path or name of the device (`/dev/ttyUSB0`, `COM3`, ...).
    pub port: String,

    /// Line speed in bits per second.
    pub baud_rate: u32,

    /// How long one read may wait for device bytes.
    ///
    /// Expiry is not an error: the read loop simply checks for shutdown and
    /// reads again.  This bounds how long `stop()` can take.
    pub read_timeout: Duration,

    /// How long writing and draining one command may take.
    pub write_timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_secs(1),
        }
    }
}

/// All runtime configuration for one bridge session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Serial device settings.
    pub serial: SerialSettings,

    /// Address the WebSocket server binds to.  Port 0 picks a free port; the
    /// engine reports the actual address from `start`.
    pub ws_bind_addr: SocketAddr,

    /// Device identifier inserted into command frames (`S <id> <CMD>\r`).
    pub device_id: Option<String>,

    /// Whether a client message that is empty after trimming is still sent to
    /// the device as a bare `S\r` frame.  Off by default.
    pub forward_empty_commands: bool,

    /// Per-client outbound queue size.  A client whose queue is full during a
    /// broadcast is treated as failed and disconnected.
    pub client_queue_capacity: usize,

    /// Consecutive non-timeout read failures tolerated before the serial link
    /// is declared lost.
    pub max_consecutive_read_errors: u32,
}

impl Default for BridgeConfig {
    /// | Field                        | Default            |
    /// |------------------------------|--------------------|
    /// | serial.port                  | platform default   |
    /// | serial.baud_rate             | 9600               |
    /// | serial.read_timeout          | 1 second           |
    /// | serial.write_timeout         | 1 second           |
    /// | ws_bind_addr                 | `0.0.0.0:8765`     |
    /// | device_id                    | none               |
    /// | forward_empty_commands       | false              |
    /// | client_queue_capacity        | 64                 |
    /// | max_consecutive_read_errors  | 10                 |
    fn default() -> Self {
        Self {
            serial: SerialSettings::default(),
            ws_bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_LISTEN_PORT)),
            device_id: None,
            forward_empty_commands: false,
            client_queue_capacity: 64,
            max_consecutive_read_errors: 10,
        }
    }
}

impl BridgeConfig {
    /// Returns the device id if one is configured and not blank.
    pub fn device_id(&self) -> Option<&str> {
        self.device_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.serial.port.trim().is_empty() {
            return Err(InvalidConfig("serial port must not be empty".into()));
        }
        if self.serial.baud_rate == 0 {
            return Err(InvalidConfig("baud rate must be greater than zero".into()));
        }
        if self.serial.read_timeout.is_zero() {
            return Err(InvalidConfig("read timeout must be greater than zero".into()));
        }
        if self.serial.write_timeout.is_zero() {
            return Err(InvalidConfig("write timeout must be greater than zero".into()));
        }
        if self.client_queue_capacity == 0 {
            return Err(InvalidConfig(
                "client queue capacity must be greater than zero".into(),
            ));
        }
        if self.max_consecutive_read_errors == 0 {
            return Err(InvalidConfig(
                "max consecutive read errors must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
