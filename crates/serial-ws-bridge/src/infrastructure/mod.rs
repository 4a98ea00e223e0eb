//! Infrastructure layer for serial-ws-bridge.
//!
//! Everything that touches the outside world lives here: the serial port,
//! the WebSocket listener, task spawning, the event channel, and the
//! configuration file.
//!
//! # What does NOT belong here?
//!
//! - Repeat suppression and replay rules (application layer)
//! - Command framing (`serial-ws-core`)
//! - CLI parsing (`main.rs`)

pub mod config_file;
pub mod engine;
pub mod event_bus;
pub mod serial_port;
pub mod serial_pump;
pub mod ws_server;

pub use config_file::{load_config, ConfigError, FileConfig};
pub use engine::{BridgeEngine, BridgeError};
pub use event_bus::EventBus;
pub use serial_port::{NativeSerialConnector, SerialConnector, SerialError, SerialLink};
