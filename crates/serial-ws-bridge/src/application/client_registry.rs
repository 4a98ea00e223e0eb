//! ClientRegistry: the set of connected WebSocket clients eligible for broadcast.
//!
//! Every client owns a bounded outbound queue.  A dedicated writer task per
//! client drains that queue into the socket, so a broadcast never waits on the
//! network: it only pushes into queues.  A client whose queue is full (too
//! slow) or closed (its writer task died) counts as a failed delivery and is
//! removed.  The other clients are unaffected.
//!
//! # Concurrency
//!
//! The map lives behind a single `tokio::sync::RwLock`.  Broadcasts take the
//! read lock while they push, then the write lock to evict failures, so a
//! client disconnecting mid-broadcast is either fully present or fully gone.

use std::collections::HashMap;
use std::net::SocketAddr;

use serial_ws_core::Reading;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Opaque identifier of one connected client.
pub type ClientId = Uuid;

/// A message queued for delivery to one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Raw device bytes, sent as a binary frame.
    Reading(Reading),
    /// Protocol-level pong, answering a `ping` text message.
    Pong(Vec<u8>),
}

/// Why a message could not be queued for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// The client is not draining its queue fast enough.
    QueueFull,
    /// The client's writer task has ended.
    Disconnected,
}

/// Send side of one client's outbound queue.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    peer: SocketAddr,
    tx: mpsc::Sender<Outbound>,
}

impl ClientHandle {
    /// Creates a handle with a fresh id and its matching queue receiver.
    pub fn new(peer: SocketAddr, capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: Uuid::new_v4(),
                peer,
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// `false` once the client's writer task has dropped its receiver.
    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queues `msg` without waiting.
    pub fn try_send(&self, msg: Outbound) -> Result<(), SendFailure> {
        queue(&self.tx, msg)
    }

    /// A handle that can queue messages but does not keep the queue open.
    ///
    /// Once every strong handle is dropped (the client was unregistered or
    /// evicted) the queue closes even while weak handles remain.
    pub fn downgrade(&self) -> WeakClientHandle {
        WeakClientHandle {
            id: self.id,
            tx: self.tx.downgrade(),
        }
    }
}

/// Non-owning counterpart of [`ClientHandle`].
#[derive(Debug, Clone)]
pub struct WeakClientHandle {
    id: ClientId,
    tx: mpsc::WeakSender<Outbound>,
}

impl WeakClientHandle {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn try_send(&self, msg: Outbound) -> Result<(), SendFailure> {
        match self.tx.upgrade() {
            Some(tx) => queue(&tx, msg),
            None => Err(SendFailure::Disconnected),
        }
    }
}

fn queue(tx: &mpsc::Sender<Outbound>, msg: Outbound) -> Result<(), SendFailure> {
    tx.try_send(msg).map_err(|e| match e {
        mpsc::error::TrySendError::Full(_) => SendFailure::QueueFull,
        mpsc::error::TrySendError::Closed(_) => SendFailure::Disconnected,
    })
}

/// Result of one [`ClientRegistry::broadcast`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Clients the reading was offered to.
    pub attempted: usize,
    /// Clients that failed and were removed.
    pub removed: Vec<ClientId>,
}

impl BroadcastOutcome {
    pub fn delivered(&self) -> usize {
        self.attempted - self.removed.len()
    }
}

/// In-memory set of connected clients.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, ClientHandle>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a client.  Returns `false` if a client with the same id exists.
    pub async fn add(&self, client: ClientHandle) -> bool {
        let mut clients = self.clients.write().await;
        if clients.contains_key(&client.id) {
            return false;
        }
        debug!(client_id = %client.id, peer = %client.peer, "client registered");
        clients.insert(client.id, client);
        true
    }

    /// Removes a client.  Removing an absent client is a no-op that returns `None`.
    pub async fn remove(&self, id: ClientId) -> Option<ClientHandle> {
        self.clients.write().await.remove(&id)
    }

    /// Queues `reading` for every registered client.
    ///
    /// Failed clients are removed and logged; delivery to the rest continues.
    /// Broadcasting to an empty registry does nothing.
    pub async fn broadcast(&self, reading: &Reading) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();
        {
            let clients = self.clients.read().await;
            for client in clients.values() {
                outcome.attempted += 1;
                if let Err(failure) = client.try_send(Outbound::Reading(reading.clone())) {
                    warn!(
                        client_id = %client.id,
                        peer = %client.peer,
                        ?failure,
                        "dropping client after failed delivery"
                    );
                    outcome.removed.push(client.id);
                }
            }
        }
        if !outcome.removed.is_empty() {
            let mut clients = self.clients.write().await;
            for id in &outcome.removed {
                clients.remove(id);
            }
        }
        if outcome.attempted > 1 {
            debug!(clients = outcome.attempted, "broadcast reading to multiple clients");
        }
        outcome
    }

    pub async fn contains(&self, id: ClientId) -> bool {
        self.clients.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Removes every client, closing their queues.
    pub async fn clear(&self) -> usize {
        let mut clients = self.clients.write().await;
        let n = clients.len();
        clients.clear();
        n
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
