//! Application layer for serial-ws-bridge.
//!
//! Knows *what* the bridge does with readings and client messages, but not
//! *how* bytes move: no sockets, no serial ports, no task spawning.
//!
//! - [`client_registry`] – the set of connected clients and broadcast.
//! - [`pipeline`] – repeat suppression + broadcast + replay-on-connect.
//! - [`command_policy`] – inbound message → pong / device write / ignore.
//! - [`lifecycle`] – the engine's state-transition table.

pub mod client_registry;
pub mod command_policy;
pub mod lifecycle;
pub mod pipeline;

pub use client_registry::{
    BroadcastOutcome, ClientHandle, ClientId, ClientRegistry, Outbound, SendFailure,
    WeakClientHandle,
};
pub use command_policy::{CommandPolicy, InboundAction};
pub use lifecycle::{next_state, Transition};
pub use pipeline::{ReadingOutcome, ReadingPipeline};
