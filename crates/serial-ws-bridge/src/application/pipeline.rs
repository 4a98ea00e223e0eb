//! ReadingPipeline: repeat suppression, broadcast, and replay-on-connect.
//!
//! The pipeline owns the one piece of state shared between the serial read
//! loop and the WebSocket accept path: the [`RepeatTracker`] (last broadcast
//! reading + repeat counter).  Both paths take the same lock, which gives two
//! guarantees:
//!
//! - Readings are broadcast in the order they were read.
//! - A new client receives the last broadcast reading exactly once, before
//!   any later reading.  Registration and broadcast cannot interleave, so the
//!   client is either registered before a broadcast (and gets it live) or
//!   after (and gets it as the replay).

use std::sync::Arc;

use serial_ws_core::{Reading, RepeatDecision, RepeatTracker};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::client_registry::{ClientHandle, ClientId, ClientRegistry, Outbound};

/// What happened to one reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingOutcome {
    pub decision: RepeatDecision,
    /// Clients the reading was offered to (0 when suppressed).
    pub attempted: usize,
    /// Clients removed because delivery failed.
    pub removed: Vec<ClientId>,
}

/// Shared reading state plus the client registry.
#[derive(Debug)]
pub struct ReadingPipeline {
    tracker: Mutex<RepeatTracker>,
    registry: Arc<ClientRegistry>,
}

impl ReadingPipeline {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self {
            tracker: Mutex::new(RepeatTracker::new()),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Applies the repeat policy to `reading` and broadcasts it if allowed.
    pub async fn handle_reading(&self, reading: &Reading) -> ReadingOutcome {
        let mut tracker = self.tracker.lock().await;
        let decision = tracker.observe(reading);
        if !decision.should_forward() {
            trace!(?reading, "suppressed repeated reading");
            return ReadingOutcome {
                decision,
                attempted: 0,
                removed: Vec::new(),
            };
        }
        let outcome = self.registry.broadcast(reading).await;
        drop(tracker);

        if matches!(decision, RepeatDecision::Forward) {
            debug!(?reading, clients = outcome.attempted, "new reading");
        } else {
            trace!(?reading, clients = outcome.attempted, "repeated reading");
        }
        ReadingOutcome {
            decision,
            attempted: outcome.attempted,
            removed: outcome.removed,
        }
    }

    /// Registers a newly connected client.
    ///
    /// Queues the last broadcast reading (if any) for this client alone, then
    /// adds it to the registry and resets the repeat counter.  Returns `false`
    /// if the client vanished before it could be registered.
    pub async fn register(&self, client: ClientHandle) -> bool {
        let mut tracker = self.tracker.lock().await;
        if let Some(last) = tracker.last() {
            if client.try_send(Outbound::Reading(last.clone())).is_err() {
                return false;
            }
            debug!(client_id = %client.id(), reading = ?last, "replayed last reading");
        }
        if !self.registry.add(client).await {
            return false;
        }
        tracker.reset_repeats();
        true
    }

    /// Removes a client.  Safe to call for a client that is already gone.
    pub async fn unregister(&self, id: ClientId) -> bool {
        self.registry.remove(id).await.is_some()
    }

    /// The last broadcast reading, if any.
    pub async fn last_reading(&self) -> Option<Reading> {
        self.tracker.lock().await.last().cloned()
    }

    /// The current repeat counter.
    pub async fn repeats(&self) -> u32 {
        self.tracker.lock().await.repeats()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
