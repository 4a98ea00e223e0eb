//! serial-ws-bridge library crate.
//!
//! Connects one line-oriented serial device (a scale, a sensor, a meter) to
//! any number of WebSocket clients.  Readings from the device are broadcast to
//! every client; text commands from clients are framed and written back to
//! the device.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Serial device (CR-terminated readings, "S ..." commands)
//!         ↕
//! [serial-ws-bridge]
//!   ├── domain/            BridgeConfig, BridgeState, BridgeEvent
//!   ├── application/       ClientRegistry, ReadingPipeline, CommandPolicy,
//!   │                      lifecycle transition table
//!   └── infrastructure/
//!         ├── serial_port  tokio-serial adapter + SerialConnector seam
//!         ├── serial_pump  read loop
//!         ├── ws_server    accept loop + per-client sessions (tokio-tungstenite)
//!         ├── engine       BridgeEngine start/stop
//!         └── config_file  TOML configuration
//!         ↕
//! WebSocket clients (binary readings out, text commands in)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `serial-ws-core`; it uses tokio
//!   only for its synchronization primitives.
//! - `infrastructure` depends on everything else.
//!
//! # Example
//!
//! ```no_run
//! use serial_ws_bridge::{BridgeConfig, BridgeEngine};
//!
//! # async fn run() -> Result<(), serial_ws_bridge::BridgeError> {
//! let engine = BridgeEngine::native();
//! let addr = engine.start(BridgeConfig::default()).await?;
//! println!("listening on ws://{addr}");
//! engine.stop().await;
//! # Ok(())
//! # }
//! ```

/// Domain layer: configuration, lifecycle states, events.
pub mod domain;

/// Application layer: client registry, reading pipeline, command policy.
pub mod application;

/// Infrastructure layer: serial port, WebSocket server, engine.
pub mod infrastructure;

pub use domain::{BridgeConfig, BridgeEvent, BridgeState, SerialSettings};
pub use infrastructure::{BridgeEngine, BridgeError, SerialConnector, SerialError, SerialLink};
