//! BridgeEngine: owns one bridge session and its lifecycle.
//!
//! `start` opens the serial link, binds the WebSocket listener, and spawns two
//! tasks: the serial read loop and the accept loop (which owns every client
//! session).  `stop` signals both through a shared `watch` channel, waits for
//! them, then releases the registry and the serial port.
//!
//! State changes go through the transition table in
//! [`application::lifecycle`](crate::application::lifecycle) and are published
//! both on a `watch` channel (for "wait until Failed" style consumers) and as
//! [`BridgeEvent::StateChanged`] events.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use serial_ws_core::Reading;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::application::{next_state, ClientRegistry, CommandPolicy, ReadingPipeline, Transition};
use crate::domain::{BridgeConfig, BridgeEvent, BridgeState, InvalidConfig};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::serial_port::{
    NativeSerialConnector, SerialConnector, SerialError, SharedSerialWriter,
};
use crate::infrastructure::serial_pump::{log_exit, run_read_loop, ReadLoopExit};
use crate::infrastructure::ws_server::{run_accept_loop, ServerContext};

/// Errors returned by [`BridgeEngine::start`].
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A session is already starting or running.
    #[error("bridge is already {0}")]
    AlreadyRunning(BridgeState),

    #[error(transparent)]
    Config(#[from] InvalidConfig),

    /// The serial endpoint could not be opened.
    #[error("cannot open serial port: {0}")]
    Connection(#[source] SerialError),

    /// The WebSocket listener could not be bound.
    #[error("failed to bind WebSocket listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Resources of a started session.
struct ActiveSession {
    local_addr: SocketAddr,
    shutdown: Arc<watch::Sender<bool>>,
    pipeline: Arc<ReadingPipeline>,
    serial_writer: SharedSerialWriter,
    read_task: JoinHandle<()>,
    server_task: JoinHandle<()>,
}

/// The bridge engine.  One engine drives at most one session at a time.
pub struct BridgeEngine {
    connector: Arc<dyn SerialConnector>,
    events: EventBus,
    state: Arc<watch::Sender<BridgeState>>,
    /// Also serializes `start` and `stop`.
    session: Mutex<Option<ActiveSession>>,
}

impl BridgeEngine {
    pub fn new(connector: Arc<dyn SerialConnector>) -> Self {
        let (state, _) = watch::channel(BridgeState::Idle);
        Self {
            connector,
            events: EventBus::new(),
            state: Arc::new(state),
            session: Mutex::new(None),
        }
    }

    /// An engine that opens real serial ports.
    pub fn native() -> Self {
        Self::new(Arc::new(NativeSerialConnector))
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Starts a session and returns the address the WebSocket server is
    /// listening on.
    ///
    /// From `Failed`, the previous session is released first.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::AlreadyRunning`] if a session is starting or running.
    /// - [`BridgeError::Config`] if `config` does not validate.
    /// - [`BridgeError::Connection`] if the serial port cannot be opened.
    /// - [`BridgeError::Bind`] if the listen address is unavailable.
    ///
    /// After a `Connection` or `Bind` error the engine is back in `Idle`
    /// with nothing left open, so `start` can be retried immediately.
    pub async fn start(&self, config: BridgeConfig) -> Result<SocketAddr, BridgeError> {
        let mut slot = self.session.lock().await;

        let current = self.state();
        if !current.can_start() {
            return Err(BridgeError::AlreadyRunning(current));
        }
        if let Some(failed) = slot.take() {
            debug!("releasing failed session before restart");
            self.teardown(failed).await;
        }
        config.validate()?;

        self.transition(Transition::Start);
        self.events.emit(BridgeEvent::log(format!(
            "Starting bridge on {} at {} baud",
            config.serial.port, config.serial.baud_rate
        )));

        let link = match self.connector.open(&config.serial).await {
            Ok(link) => link,
            Err(e) => return Err(self.fail_start(BridgeError::Connection(e))),
        };

        let addr = config.ws_bind_addr;
        let bound = match TcpListener::bind(addr).await {
            Ok(listener) => listener.local_addr().map(|local| (listener, local)),
            Err(e) => Err(e),
        };
        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(source) => {
                let mut writer = link.writer;
                writer.close().await;
                return Err(self.fail_start(BridgeError::Bind { addr, source }));
            }
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let shutdown = Arc::new(shutdown);
        let pipeline = Arc::new(ReadingPipeline::new(Arc::new(ClientRegistry::new())));
        let serial_writer: SharedSerialWriter = Arc::new(Mutex::new(link.writer));

        let read_task = tokio::spawn(supervise_read_loop(
            run_read_loop(
                link.reader,
                Arc::clone(&pipeline),
                self.events.clone(),
                config.max_consecutive_read_errors,
                shutdown_rx.clone(),
            ),
            Arc::clone(&serial_writer),
            Arc::clone(&shutdown),
            Arc::clone(&self.state),
            self.events.clone(),
        ));

        let ctx = Arc::new(ServerContext {
            pipeline: Arc::clone(&pipeline),
            serial_writer: Arc::clone(&serial_writer),
            policy: CommandPolicy::new(config.device_id(), config.forward_empty_commands),
            events: self.events.clone(),
            queue_capacity: config.client_queue_capacity,
        });
        let server_task = tokio::spawn(run_accept_loop(listener, ctx, shutdown_rx));

        *slot = Some(ActiveSession {
            local_addr,
            shutdown,
            pipeline,
            serial_writer,
            read_task,
            server_task,
        });
        self.transition(Transition::Ready);

        info!("WebSocket server listening on ws://{local_addr}");
        self.events.emit(BridgeEvent::log(format!(
            "Server started on ws://{local_addr}"
        )));
        Ok(local_addr)
    }

    /// Stops the current session and waits until every task has ended and
    /// the serial port is closed.  Does nothing when idle.
    pub async fn stop(&self) {
        let mut slot = self.session.lock().await;
        match slot.take() {
            Some(session) => self.teardown(session).await,
            None => debug!("stop requested while idle"),
        }
    }

    async fn teardown(&self, session: ActiveSession) {
        self.transition(Transition::Stop);
        session.shutdown.send_replace(true);

        if let Err(e) = session.read_task.await {
            warn!("serial read task failed: {e}");
        }
        if let Err(e) = session.server_task.await {
            warn!("WebSocket server task failed: {e}");
        }

        let dropped = session.pipeline.registry().clear().await;
        if dropped > 0 {
            debug!("released {dropped} client handles");
        }
        session.serial_writer.lock().await.close().await;

        self.transition(Transition::Released);
        info!("bridge on ws://{} stopped", session.local_addr);
        self.events.emit(BridgeEvent::log("Server stopped"));
    }

    /// Reports a failed start and returns to `Idle`.
    fn fail_start(&self, err: BridgeError) -> BridgeError {
        error!("bridge start failed: {err}");
        self.transition(Transition::Fail);
        self.events.emit(BridgeEvent::error(err.to_string()));
        self.transition(Transition::Released);
        err
    }

    fn transition(&self, transition: Transition) {
        apply_transition(&self.state, &self.events, transition);
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn is_running(&self) -> bool {
        self.state() == BridgeState::Running
    }

    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<BridgeState> {
        self.state.subscribe()
    }

    /// The last reading broadcast in the current session.
    pub async fn last_reading(&self) -> Option<Reading> {
        let pipeline = self.session.lock().await.as_ref().map(|s| Arc::clone(&s.pipeline));
        match pipeline {
            Some(pipeline) => pipeline.last_reading().await,
            None => None,
        }
    }

    /// Number of clients currently registered for broadcast.
    pub async fn client_count(&self) -> usize {
        let pipeline = self.session.lock().await.as_ref().map(|s| Arc::clone(&s.pipeline));
        match pipeline {
            Some(pipeline) => pipeline.registry().len().await,
            None => 0,
        }
    }

    /// Subscribes to engine events.  Events emitted before this call are not
    /// delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }
}

/// Applies `transition` if it is legal from the current state and publishes
/// the new state.
fn apply_transition(state: &watch::Sender<BridgeState>, events: &EventBus, transition: Transition) {
    let mut changed_to = None;
    state.send_if_modified(|current| match next_state(*current, transition) {
        Some(next) => {
            *current = next;
            changed_to = Some(next);
            true
        }
        None => false,
    });
    match changed_to {
        Some(next) => {
            debug!(?transition, state = %next, "bridge state changed");
            events.emit(BridgeEvent::StateChanged { state: next });
        }
        None => debug!(?transition, "ignored transition"),
    }
}

/// Wraps the read loop: a lost link fails the session and stops the server.
///
/// The read half is dropped when the loop returns and the write half is
/// closed here, so a `Failed` engine holds no device handle.
async fn supervise_read_loop(
    read_loop: impl std::future::Future<Output = ReadLoopExit>,
    serial_writer: SharedSerialWriter,
    shutdown: Arc<watch::Sender<bool>>,
    state: Arc<watch::Sender<BridgeState>>,
    events: EventBus,
) {
    let exit = read_loop.await;
    log_exit(&exit);
    if let ReadLoopExit::LinkLost(reason) = exit {
        serial_writer.lock().await.close().await;
        events.emit(BridgeEvent::error(format!("Serial link lost: {reason}")));
        apply_transition(&state, &events, Transition::Fail);
        shutdown.send_replace(true);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
