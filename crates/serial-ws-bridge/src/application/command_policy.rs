//! Decides what to do with one inbound client text message.
//!
//! The message is classified by `serial-ws-core`; this module adds the
//! per-session settings (device id, empty-command policy) and produces an
//! [`InboundAction`] the WebSocket session executes.

use serial_ws_core::{classify_inbound, translate_command, InboundMessage};

/// What the session should do with an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundAction {
    /// Answer with a protocol-level pong.  Nothing reaches the device.
    Pong,
    /// Write this exact command frame to the serial device.
    Write(String),
    /// Do nothing (the message was empty and empty commands are not forwarded).
    Ignore,
}

/// Per-session command settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandPolicy {
    device_id: Option<String>,
    forward_empty: bool,
}

impl CommandPolicy {
    /// A blank `device_id` is treated as absent.
    pub fn new(device_id: Option<&str>, forward_empty: bool) -> Self {
        Self {
            device_id: device_id
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_owned),
            forward_empty,
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn plan(&self, text: &str) -> InboundAction {
        match classify_inbound(text) {
            InboundMessage::Ping => InboundAction::Pong,
            InboundMessage::Command(_) => {
                InboundAction::Write(translate_command(text, self.device_id()))
            }
            InboundMessage::Empty if self.forward_empty => {
                InboundAction::Write(translate_command(text, self.device_id()))
            }
            InboundMessage::Empty => InboundAction::Ignore,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
