//! WebSocket server: accept loop and per-client sessions.
//!
//! This module is responsible for:
//!
//! 1. Accepting TCP connections on a listener the engine has already bound.
//! 2. Upgrading each connection to a WebSocket session.
//! 3. Registering the client with the [`ReadingPipeline`] (which replays the
//!    last reading to it).
//! 4. Running two concurrent halves per session:
//!    - **Queue → Client**: a writer task drains the client's outbound queue
//!      into binary frames (readings) and pong frames.
//!    - **Client → Device**: the session loop classifies each inbound text
//!      message and either answers `ping`, writes a command to the serial
//!      device, or ignores it.
//! 5. Stopping every session when the shutdown signal fires.
//!
//! Sessions are owned by a [`JoinSet`] inside the accept loop, so when the
//! loop returns no session task is left running.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::application::{
    ClientHandle, CommandPolicy, InboundAction, Outbound, ReadingPipeline, WeakClientHandle,
};
use crate::domain::BridgeEvent;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::serial_port::SharedSerialWriter;

/// How long a closing session waits for its writer task to flush.
const WRITER_GRACE: Duration = Duration::from_millis(500);

/// How long a new connection may take to complete the WebSocket upgrade.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;

/// Everything a client session needs, shared by all sessions.
pub struct ServerContext {
    pub pipeline: Arc<ReadingPipeline>,
    pub serial_writer: SharedSerialWriter,
    pub policy: CommandPolicy,
    pub events: EventBus,
    pub queue_capacity: usize,
}

// ── Accept loop ───────────────────────────────────────────────────────────────

/// Accepts clients until `shutdown` becomes `true`, then waits for every
/// session to finish.
pub async fn run_accept_loop(
    listener: TcpListener,
    ctx: Arc<ServerContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    let local = listener.local_addr().ok();
    let mut sessions = JoinSet::new();

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("new TCP connection from {peer}");
                    sessions.spawn(handle_client(
                        stream,
                        peer,
                        Arc::clone(&ctx),
                        shutdown.clone(),
                    ));
                }
                // Transient (e.g. out of file descriptors); keep serving.
                Err(e) => error!("accept error: {e}"),
            },
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
        }
    }

    // Closing the listener before draining refuses new connections at once.
    drop(listener);
    if let Some(addr) = local {
        info!("WebSocket server on {addr} stopped accepting");
    }
    while let Some(res) = sessions.join_next().await {
        if let Err(e) = res {
            warn!("client session task failed: {e}");
        }
    }
}

// ── Per-client session ────────────────────────────────────────────────────────

async fn handle_client(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ServerContext>,
    shutdown: watch::Receiver<bool>,
) {
    match run_session(stream, peer, &ctx, shutdown).await {
        Ok(()) => info!("client {peer} closed normally"),
        Err(e) => warn!("client {peer} closed with error: {e:#}"),
    }
}

async fn run_session(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: &ServerContext,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    if *shutdown.borrow() {
        return Ok(());
    }
    // A peer that never sends the upgrade request must not hold up shutdown.
    let ws = tokio::select! {
        _ = shutdown.changed() => {
            debug!("shutdown during WebSocket handshake with {peer}");
            return Ok(());
        }
        res = timeout(HANDSHAKE_TIMEOUT, accept_async(stream)) => match res {
            Ok(handshake) => {
                handshake.with_context(|| format!("WebSocket handshake failed with {peer}"))?
            }
            Err(_) => anyhow::bail!("WebSocket handshake with {peer} timed out"),
        },
    };

    let (client, queue) = ClientHandle::new(peer, ctx.queue_capacity);
    let id = client.id();
    // Lets the session queue pongs without keeping the queue open: once the
    // registry drops the client (disconnect or eviction) the writer ends.
    let own = client.downgrade();
    if !ctx.pipeline.register(client).await {
        anyhow::bail!("client {peer} could not be registered");
    }

    info!(client_id = %id, "client connected from {peer}");
    ctx.events.emit(BridgeEvent::ClientConnected {
        client_id: id.to_string(),
        peer: peer.to_string(),
    });

    let (ws_tx, mut ws_rx) = ws.split();
    let mut writer = tokio::spawn(forward_outbound(ws_tx, queue));
    let mut writer_finished = false;

    let result: anyhow::Result<()> = loop {
        if *shutdown.borrow() {
            break Ok(());
        }

        tokio::select! {
            _ = shutdown.changed() => break Ok(()),
            res = &mut writer, if !writer_finished => {
                writer_finished = true;
                break match res {
                    Ok(inner) => inner.with_context(|| format!("sending to {peer}")),
                    Err(e) => Err(anyhow::anyhow!("writer task for {peer} failed: {e}")),
                };
            }
            msg = ws_rx.next() => match msg {
                None => break Ok(()),
                Some(Err(e)) => break Err(e).with_context(|| format!("receiving from {peer}")),
                Some(Ok(WsMessage::Text(text))) => handle_inbound(ctx, &own, &text).await,
                Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => handle_inbound(ctx, &own, &text).await,
                    Err(_) => debug!(client_id = %id, "ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(WsMessage::Close(_))) => break Ok(()),
                // Ping/Pong frames are answered by tungstenite itself.
                Some(Ok(_)) => {}
            },
        }
    };

    // ── Teardown ─────────────────────────────────────────────────────────────
    // An evicted client was already reported by the read loop.
    if ctx.pipeline.unregister(id).await {
        ctx.events.emit(BridgeEvent::ClientDisconnected {
            client_id: id.to_string(),
        });
    } else {
        debug!(client_id = %id, "client was evicted before its session ended");
    }
    // The queue is closed now, so the writer sends a Close frame and ends.
    if !writer_finished {
        match timeout(WRITER_GRACE, &mut writer).await {
            Ok(Ok(Err(e))) => debug!(client_id = %id, "writer ended with error: {e}"),
            Ok(_) => {}
            Err(_) => {
                debug!(client_id = %id, "writer did not finish in time; aborting");
                writer.abort();
            }
        }
    }

    result
}

/// Executes what the command policy decides for one inbound message.
///
/// A write holds the shared serial writer for the whole write + drain, so
/// commands from different clients never interleave and this client's next
/// message is not read until its previous command is fully sent.
async fn handle_inbound(ctx: &ServerContext, client: &WeakClientHandle, text: &str) {
    let id = client.id();
    match ctx.policy.plan(text) {
        InboundAction::Pong => {
            if let Err(failure) = client.try_send(Outbound::Pong(Vec::new())) {
                debug!(client_id = %id, ?failure, "could not queue pong");
            }
        }
        InboundAction::Write(frame) => {
            let result = ctx
                .serial_writer
                .lock()
                .await
                .write_command(frame.as_bytes())
                .await;
            match result {
                Ok(()) => {
                    debug!(client_id = %id, command = %frame.trim_end(), "command sent to device");
                    ctx.events
                        .emit(BridgeEvent::log(format!("Sent command: {}", frame.trim_end())));
                }
                Err(e) => {
                    warn!(client_id = %id, "error writing serial: {e}");
                    ctx.events
                        .emit(BridgeEvent::log(format!("Error writing serial: {e}")));
                }
            }
        }
        InboundAction::Ignore => debug!(client_id = %id, "ignoring empty command"),
    }
}

/// Drains one client's queue into its socket, then closes the socket.
async fn forward_outbound(
    mut ws_tx: WsSink,
    mut queue: mpsc::Receiver<Outbound>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    while let Some(msg) = queue.recv().await {
        let frame = match msg {
            Outbound::Reading(reading) => WsMessage::Binary(reading.to_vec()),
            Outbound::Pong(payload) => WsMessage::Pong(payload),
        };
        ws_tx.send(frame).await?;
    }
    // Best effort: the peer may already be gone.
    let _ = ws_tx.send(WsMessage::Close(None)).await;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use tokio::sync::Mutex;
    use tokio_tungstenite::connect_async;

    use super::*;
    use crate::application::ClientRegistry;
    use crate::domain::SerialSettings;
    use crate::infrastructure::serial_port::SerialLink;

    struct Harness {
        addr: SocketAddr,
        ctx: Arc<ServerContext>,
        shutdown: watch::Sender<bool>,
        server: tokio::task::JoinHandle<()>,
        device: tokio::io::DuplexStream,
    }

    async fn start_server(device_id: Option<&str>) -> Harness {
        let (device, host) = tokio::io::duplex(1024);
        let link = SerialLink::from_stream(host, &SerialSettings::default());
        let ctx = Arc::new(ServerContext {
            pipeline: Arc::new(ReadingPipeline::new(Arc::new(ClientRegistry::new()))),
            serial_writer: Arc::new(Mutex::new(link.writer)),
            policy: CommandPolicy::new(device_id, false),
            events: EventBus::new(),
            queue_capacity: 16,
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, rx) = watch::channel(false);
        let server = tokio::spawn(run_accept_loop(listener, Arc::clone(&ctx), rx));
        Harness {
            addr,
            ctx,
            shutdown,
            server,
            device,
        }
    }

    async fn wait_for_clients(ctx: &ServerContext, n: usize) {
        for _ in 0..200 {
            if ctx.pipeline.registry().len().await == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} registered clients");
    }

    #[tokio::test]
    async fn test_command_is_translated_and_written_to_device() {
        // Arrange
        let mut h = start_server(Some("5")).await;
        let (mut ws, _) = connect_async(format!("ws://{}", h.addr)).await.unwrap();

        // Act
        ws.send(WsMessage::Text("abc".into())).await.unwrap();
        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(
            Duration::from_secs(2),
            tokio::io::AsyncReadExt::read(&mut h.device, &mut buf),
        )
        .await
        .unwrap()
        .unwrap();

        // Assert
        assert_eq!(&buf[..n], b"S 5 ABC\r");
        h.shutdown.send_replace(true);
        h.server.await.unwrap();
    }

    #[tokio::test]
    async fn test_ping_is_answered_with_pong() {
        let h = start_server(None).await;
        let (mut ws, _) = connect_async(format!("ws://{}", h.addr)).await.unwrap();

        ws.send(WsMessage::Text("ping".into())).await.unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert!(matches!(reply, WsMessage::Pong(_)));
        assert_eq!(h.ctx.serial_writer.lock().await.commands_written(), 0);
        h.shutdown.send_replace(true);
        h.server.await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_removes_client() {
        let h = start_server(None).await;
        let (mut ws, _) = connect_async(format!("ws://{}", h.addr)).await.unwrap();
        wait_for_clients(&h.ctx, 1).await;

        ws.close(None).await.unwrap();

        wait_for_clients(&h.ctx, 0).await;
        h.shutdown.send_replace(true);
        h.server.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_ends_session_stuck_in_handshake() {
        // Arrange: a TCP peer that never sends the upgrade request
        let h = start_server(None).await;
        let _silent = TcpStream::connect(h.addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Act
        h.shutdown.send_replace(true);
        let finished = tokio::time::timeout(Duration::from_secs(2), h.server).await;

        // Assert
        assert!(finished.is_ok(), "accept loop waited on an unfinished handshake");
        assert_eq!(h.ctx.pipeline.registry().len().await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_open_sessions() {
        let h = start_server(None).await;
        let (mut ws, _) = connect_async(format!("ws://{}", h.addr)).await.unwrap();
        wait_for_clients(&h.ctx, 1).await;

        h.shutdown.send_replace(true);
        tokio::time::timeout(Duration::from_secs(2), h.server)
            .await
            .unwrap()
            .unwrap();

        // The client sees the server close the connection.
        let next = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .unwrap();
        assert!(matches!(next, None | Some(Ok(WsMessage::Close(_))) | Some(Err(_))));
    }
}
