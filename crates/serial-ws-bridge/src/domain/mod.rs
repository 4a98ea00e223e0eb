//! Domain layer for serial-ws-bridge.
//!
//! Pure types with no dependencies on I/O, sockets, or the async runtime:
//! configuration, lifecycle states, and the events a front-end consumes.
//! The reading/command protocol itself lives in `serial-ws-core`.

pub mod config;
pub mod events;

pub use config::{BridgeConfig, InvalidConfig, SerialSettings};
pub use events::{BridgeEvent, BridgeState};
