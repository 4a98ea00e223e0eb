//! Fire-and-forget fan-out of [`BridgeEvent`]s to any number of subscribers.
//!
//! Built on `tokio::sync::broadcast`: emitting never waits, and a subscriber
//! that falls behind loses the oldest events instead of stalling the engine.

use tokio::sync::broadcast;
use tracing::trace;

use crate::domain::BridgeEvent;

/// Events buffered per subscriber before the oldest are dropped.
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BridgeEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Publishes `event`.  Having no subscribers is not an error.
    pub fn emit(&self, event: BridgeEvent) {
        if self.tx.send(event).is_err() {
            trace!("event dropped: no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
