//! # serial-ws-core
//!
//! Shared library for the serial-to-WebSocket bridge containing the reading
//! framer, the repeat-suppression policy, and the device command translator.
//!
//! This crate has zero dependencies on OS APIs, async runtimes, or sockets.
//! Everything in here is a pure function or a small state holder, so the
//! bridge's behaviour can be tested without a serial device attached.
//!
//! # Architecture overview
//!
//! The bridge sits between one line-oriented serial device and any number of
//! WebSocket clients:
//!
//! ```text
//! device ──bytes──► framing ──Reading──► repeat filter ──► broadcast to clients
//! device ◄──"S..\r"── command translator ◄──text── client
//! ```
//!
//! - **`protocol`** – How bytes travel.  Incoming bytes are split into
//!   [`Reading`]s on the carriage-return delimiter; outgoing client text is
//!   turned into the device's `S[ <id>] <COMMAND>\r` command format.
//!
//! - **`domain`** – The policy that decides whether a reading is worth
//!   broadcasting: identical consecutive readings are forwarded up to
//!   [`MAX_REPEATED_READS`] times and then suppressed until the value changes.

pub mod domain;
pub mod protocol;

// Re-export the most-used items at the crate root so callers can write
// `serial_ws_core::Reading` instead of `serial_ws_core::protocol::reading::Reading`.
pub use domain::repeat::{decide_repeat, RepeatDecision, RepeatTracker, MAX_REPEATED_READS};
pub use protocol::command::{classify_inbound, translate_command, InboundMessage, PING_MESSAGE};
pub use protocol::framing::{decode_reading, FrameError, MAX_READING_LEN, READING_DELIMITER};
pub use protocol::reading::Reading;
