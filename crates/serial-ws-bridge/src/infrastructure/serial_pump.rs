//! The serial read loop.
//!
//! Reads one [`Reading`](serial_ws_core::Reading) at a time, reports it to
//! subscribers, and hands it to the [`ReadingPipeline`] for suppression and
//! broadcast.  Transient failures are logged and the loop carries on; only a
//! lost link (or too many failures in a row) ends it.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, trace, warn};

use crate::application::ReadingPipeline;
use crate::domain::BridgeEvent;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::serial_port::{SerialError, SerialReader};

/// Why the read loop returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLoopExit {
    /// Shutdown was requested.
    Shutdown,
    /// The serial link is unusable.
    LinkLost(String),
}

/// Runs until `shutdown` flips to `true` (or its sender is dropped) or the
/// link is lost.
pub async fn run_read_loop(
    mut reader: SerialReader,
    pipeline: Arc<ReadingPipeline>,
    events: EventBus,
    max_consecutive_errors: u32,
    mut shutdown: watch::Receiver<bool>,
) -> ReadLoopExit {
    let mut consecutive_errors = 0u32;

    loop {
        if *shutdown.borrow() {
            return ReadLoopExit::Shutdown;
        }

        let result = tokio::select! {
            _ = shutdown.changed() => return ReadLoopExit::Shutdown,
            result = reader.read_reading() => result,
        };

        match result {
            Ok(reading) => {
                consecutive_errors = 0;
                events.emit(BridgeEvent::Reading {
                    text: reading.to_text_lossy(),
                });
                let outcome = pipeline.handle_reading(&reading).await;
                for id in &outcome.removed {
                    events.emit(BridgeEvent::ClientDisconnected {
                        client_id: id.to_string(),
                    });
                }
            }
            Err(SerialError::Timeout) => {
                trace!("serial read timeout; polling again");
            }
            Err(e) if e.is_link_lost() => {
                error!("serial link lost: {e}");
                return ReadLoopExit::LinkLost(e.to_string());
            }
            Err(e) => {
                consecutive_errors += 1;
                warn!(consecutive_errors, "error reading serial: {e}");
                events.emit(BridgeEvent::log(format!("Error reading serial: {e}")));
                if consecutive_errors >= max_consecutive_errors {
                    return ReadLoopExit::LinkLost(format!(
                        "{consecutive_errors} consecutive serial read errors, last: {e}"
                    ));
                }
            }
        }
    }
}

/// Logs the exit reason at the right level.
pub fn log_exit(exit: &ReadLoopExit) {
    match exit {
        ReadLoopExit::Shutdown => debug!("serial read loop stopped"),
        ReadLoopExit::LinkLost(reason) => error!("serial read loop ended: {reason}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
