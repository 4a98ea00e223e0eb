//! Lifecycle states and the typed events the engine emits.
//!
//! Front-ends (a tray app, a CLI, a test) never receive callbacks.  They
//! subscribe to a stream of [`BridgeEvent`]s instead, so the engine never
//! waits on a consumer and never knows which front-end is attached.

use std::fmt;

use serde::Serialize;

/// Engine lifecycle state.
///
/// ```text
///          start()              listener bound
///  Idle ─────────────► Starting ───────────────► Running
///   ▲                    │                          │
///   │   open/bind failed │          stop()          │ link lost
///   │                    ▼                          ▼
///   └──────────────── Failed ◄──────────────────────┘
///   ▲                                              │
///   └──────────────── Stopping ◄── stop() ─────────┘
/// ```
///
/// `Failed` after a failed `start` is transient: the engine reports it and
/// immediately returns to `Idle`.  `Failed` after a lost link persists until
/// the caller calls `stop` or `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    Idle,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl BridgeState {
    /// Whether `start` may be called in this state.
    pub fn can_start(self) -> bool {
        matches!(self, Self::Idle | Self::Failed)
    }

    /// Whether `stop` has anything to tear down in this state.
    pub fn can_stop(self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Failed)
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Something a front-end may want to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// Human-readable progress message.
    Log { message: String },
    /// A reading arrived from the device (emitted before repeat suppression).
    Reading { text: String },
    /// A fatal problem: the serial port could not be opened or the link was lost.
    Error { message: String },
    /// The lifecycle state changed.
    StateChanged { state: BridgeState },
    /// A WebSocket client completed its handshake.
    ClientConnected { client_id: String, peer: String },
    /// A WebSocket client left or was dropped.
    ClientDisconnected { client_id: String },
}

impl BridgeEvent {
    pub fn log(message: impl Into<String>) -> Self {
        Self::Log {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

impl fmt::Display for BridgeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Log { message } => write!(f, "[+] {message}"),
            Self::Reading { text } => write!(f, "Last data: {text}"),
            Self::Error { message } => write!(f, "[!] {message}"),
            Self::StateChanged { state } => write!(f, "[state] {state}"),
            Self::ClientConnected { client_id, peer } => {
                write!(f, "[+] client {client_id} connected from {peer}")
            }
            Self::ClientDisconnected { client_id } => {
                write!(f, "[+] client {client_id} disconnected")
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
