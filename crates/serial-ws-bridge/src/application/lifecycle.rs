//! Lifecycle transition table.
//!
//! The engine never assigns a [`BridgeState`] directly: it feeds a
//! [`Transition`] through [`next_state`] and only applies the result if the
//! move is legal.  This keeps the rules in one place and testable without any
//! I/O.

use crate::domain::BridgeState;

/// Something that moves the engine between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// `start` was called.
    Start,
    /// The serial port opened and the listener is bound.
    Ready,
    /// Opening or binding failed, or the serial link was lost.
    Fail,
    /// `stop` was called.
    Stop,
    /// Every task has been torn down.
    Released,
}

/// Returns the state after `transition`, or `None` if it is not allowed
/// from `state`.
///
/// | From      | Start    | Ready   | Fail   | Stop     | Released |
/// |-----------|----------|---------|--------|----------|----------|
/// | Idle      | Starting |         |        |          |          |
/// | Starting  |          | Running | Failed | Stopping |          |
/// | Running   |          |         | Failed | Stopping |          |
/// | Stopping  |          |         |        |          | Idle     |
/// | Failed    | Starting |         |        | Stopping | Idle     |
pub fn next_state(state: BridgeState, transition: Transition) -> Option<BridgeState> {
    use BridgeState::*;
    use Transition::*;

    match (state, transition) {
        (Idle | Failed, Start) => Some(Starting),
        (Starting, Ready) => Some(Running),
        (Starting | Running, Fail) => Some(Failed),
        (Starting | Running | Failed, Stop) => Some(Stopping),
        (Stopping | Failed, Released) => Some(Idle),
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
