//! End-to-end tests: a real WebSocket client talks to a running engine whose
//! serial port is an in-memory duplex stream.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use serial_ws_bridge::{
    BridgeConfig, BridgeEngine, BridgeEvent, BridgeState, SerialConnector, SerialError,
    SerialLink, SerialSettings,
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(3);

// ── Test doubles ──────────────────────────────────────────────────────────────

/// Hands out queued in-memory links; fails like a missing device when empty.
#[derive(Default)]
struct DuplexConnector {
    hosts: Mutex<VecDeque<DuplexStream>>,
}

impl DuplexConnector {
    /// Queues a new link and returns the device end of it.
    fn plug_in(&self) -> DuplexStream {
        let (device, host) = tokio::io::duplex(4096);
        self.hosts.lock().unwrap().push_back(host);
        device
    }
}

#[async_trait]
impl SerialConnector for DuplexConnector {
    async fn open(&self, settings: &SerialSettings) -> Result<SerialLink, SerialError> {
        match self.hosts.lock().unwrap().pop_front() {
            Some(host) => Ok(SerialLink::from_stream(host, settings)),
            None => Err(SerialError::Open {
                port: settings.port.clone(),
                reason: "No such file or directory".to_string(),
            }),
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn config() -> BridgeConfig {
    BridgeConfig {
        serial: SerialSettings {
            port: "/dev/ttyTEST0".to_string(),
            read_timeout: Duration::from_millis(50),
            write_timeout: Duration::from_millis(500),
            ..SerialSettings::default()
        },
        ws_bind_addr: "127.0.0.1:0".parse().unwrap(),
        client_queue_capacity: 256,
        ..BridgeConfig::default()
    }
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = tokio::time::timeout(WAIT, connect_async(format!("ws://{addr}")))
        .await
        .expect("connect timed out")
        .expect("connect failed");
    ws
}

async fn wait_for_clients(engine: &BridgeEngine, n: usize) {
    tokio::time::timeout(WAIT, async {
        while engine.client_count().await != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected {n} connected clients"));
}

/// Next reading frame from the server.
async fn recv_reading(ws: &mut Client) -> Vec<u8> {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("no message from server")
            .expect("connection closed")
            .expect("websocket error");
        match msg {
            Message::Binary(bytes) => return bytes,
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

async fn read_device(device: &mut DuplexStream, expected_len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; expected_len];
    tokio::time::timeout(WAIT, device.read_exact(&mut buf))
        .await
        .expect("device received nothing")
        .expect("device read failed");
    buf
}

// ── Broadcast ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_reading_is_broadcast_to_every_client() {
    // Arrange
    let connector = Arc::new(DuplexConnector::default());
    let mut device = connector.plug_in();
    let engine = BridgeEngine::new(connector);
    let addr = engine.start(config()).await.unwrap();
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    wait_for_clients(&engine, 2).await;

    // Act
    device.write_all(b"12.5\r").await.unwrap();

    // Assert: exact device bytes, delimiter included
    assert_eq!(recv_reading(&mut a).await, b"12.5\r");
    assert_eq!(recv_reading(&mut b).await, b"12.5\r");
    engine.stop().await;
}

#[tokio::test]
async fn test_new_client_receives_last_reading_before_live_ones() {
    // Arrange: one client sees reading A
    let connector = Arc::new(DuplexConnector::default());
    let mut device = connector.plug_in();
    let engine = BridgeEngine::new(connector);
    let addr = engine.start(config()).await.unwrap();
    let mut first = connect(addr).await;
    wait_for_clients(&engine, 1).await;
    device.write_all(b"A\r").await.unwrap();
    assert_eq!(recv_reading(&mut first).await, b"A\r");

    // Act: a second client joins, then reading B arrives
    let mut second = connect(addr).await;
    assert_eq!(recv_reading(&mut second).await, b"A\r");
    device.write_all(b"B\r").await.unwrap();

    // Assert
    assert_eq!(recv_reading(&mut second).await, b"B\r");
    assert_eq!(recv_reading(&mut first).await, b"B\r");
    engine.stop().await;
}

#[tokio::test]
async fn test_idle_run_is_capped_then_next_change_flows() {
    // Arrange
    let connector = Arc::new(DuplexConnector::default());
    let mut device = connector.plug_in();
    let engine = BridgeEngine::new(connector);
    let addr = engine.start(config()).await.unwrap();
    let mut ws = connect(addr).await;
    wait_for_clients(&engine, 1).await;

    // Act: 150 identical readings, then a different one
    let mut burst = b"0\r".repeat(150);
    burst.extend_from_slice(b"1\r");
    device.write_all(&burst).await.unwrap();

    // Assert: only the first 100 identical readings reach the client
    let mut zeros = 0;
    loop {
        let reading = recv_reading(&mut ws).await;
        if reading == b"1\r" {
            break;
        }
        assert_eq!(reading, b"0\r");
        zeros += 1;
    }
    assert_eq!(zeros, 100);
    assert_eq!(
        engine.last_reading().await.map(|r| r.to_vec()),
        Some(b"1\r".to_vec())
    );
    engine.stop().await;
}

// ── Commands ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ping_is_answered_and_never_written_to_device() {
    // Arrange
    let connector = Arc::new(DuplexConnector::default());
    let mut device = connector.plug_in();
    let engine = BridgeEngine::new(connector);
    let addr = engine.start(config()).await.unwrap();
    let mut ws = connect(addr).await;

    // Act
    ws.send(Message::Text("ping".into())).await.unwrap();
    let reply = tokio::time::timeout(WAIT, ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    ws.send(Message::Text("quit".into())).await.unwrap();

    // Assert: the first bytes the device sees belong to the real command
    assert!(matches!(reply, Message::Pong(_)));
    assert_eq!(read_device(&mut device, 6).await, b"SQUIT\r");
    engine.stop().await;
}

#[tokio::test]
async fn test_command_is_framed_with_device_id() {
    let connector = Arc::new(DuplexConnector::default());
    let mut device = connector.plug_in();
    let engine = BridgeEngine::new(connector);
    let cfg = BridgeConfig {
        device_id: Some("5".to_string()),
        ..config()
    };
    let addr = engine.start(cfg).await.unwrap();
    let mut ws = connect(addr).await;

    ws.send(Message::Text(" abc ".into())).await.unwrap();

    assert_eq!(read_device(&mut device, 8).await, b"S 5 ABC\r");
    engine.stop().await;
}

#[tokio::test]
async fn test_commands_from_one_client_arrive_in_order() {
    let connector = Arc::new(DuplexConnector::default());
    let mut device = connector.plug_in();
    let engine = BridgeEngine::new(connector);
    let addr = engine.start(config()).await.unwrap();
    let mut ws = connect(addr).await;

    for cmd in ["t", "z", "p"] {
        ws.send(Message::Text(cmd.into())).await.unwrap();
    }

    assert_eq!(read_device(&mut device, 9).await, b"ST\rSZ\rSP\r");
    engine.stop().await;
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stop_then_start_on_same_port_resumes_broadcasting() {
    // Arrange
    let connector = Arc::new(DuplexConnector::default());
    let _old_device = connector.plug_in();
    let mut device = connector.plug_in();
    let engine = BridgeEngine::new(Arc::clone(&connector) as Arc<dyn SerialConnector>);
    let addr = engine.start(config()).await.unwrap();

    // Act
    engine.stop().await;
    let cfg = BridgeConfig {
        ws_bind_addr: addr,
        ..config()
    };
    let restarted = engine.start(cfg).await.unwrap();

    // Assert
    assert_eq!(restarted, addr);
    let mut ws = connect(restarted).await;
    wait_for_clients(&engine, 1).await;
    device.write_all(b"7\r").await.unwrap();
    assert_eq!(recv_reading(&mut ws).await, b"7\r");
    engine.stop().await;
}

#[tokio::test]
async fn test_failed_open_can_be_retried() {
    // Arrange: nothing plugged in yet
    let connector = Arc::new(DuplexConnector::default());
    let engine = BridgeEngine::new(Arc::clone(&connector) as Arc<dyn SerialConnector>);
    let mut events = engine.subscribe();

    // Act
    let first = engine.start(config()).await;
    let _device = connector.plug_in();
    let second = engine.start(config()).await;

    // Assert
    assert!(matches!(
        first,
        Err(serial_ws_bridge::BridgeError::Connection(_))
    ));
    assert!(second.is_ok());
    assert!(engine.is_running());
    let mut saw_error = false;
    while let Ok(event) = events.try_recv() {
        saw_error |= matches!(event, BridgeEvent::Error { .. });
    }
    assert!(saw_error);
    engine.stop().await;
}

#[tokio::test]
async fn test_unplugged_device_fails_engine_and_closes_clients() {
    // Arrange
    let connector = Arc::new(DuplexConnector::default());
    let device = connector.plug_in();
    let engine = BridgeEngine::new(connector);
    let addr = engine.start(config()).await.unwrap();
    let mut ws = connect(addr).await;
    wait_for_clients(&engine, 1).await;
    let mut state = engine.watch_state();

    // Act
    drop(device);

    // Assert
    tokio::time::timeout(WAIT, state.wait_for(|s| *s == BridgeState::Failed))
        .await
        .unwrap()
        .unwrap();
    let closed = tokio::time::timeout(WAIT, ws.next()).await.unwrap();
    assert!(matches!(
        closed,
        None | Some(Ok(Message::Close(_))) | Some(Err(_))
    ));
    engine.stop().await;
    assert_eq!(engine.state(), BridgeState::Idle);
}

#[tokio::test]
async fn test_stop_closes_clients_and_is_idempotent() {
    // Arrange
    let connector = Arc::new(DuplexConnector::default());
    let _device = connector.plug_in();
    let engine = BridgeEngine::new(connector);
    let addr = engine.start(config()).await.unwrap();
    let mut ws = connect(addr).await;
    wait_for_clients(&engine, 1).await;

    // Act
    engine.stop().await;
    engine.stop().await;

    // Assert
    assert_eq!(engine.state(), BridgeState::Idle);
    assert!(!engine.is_running());
    assert_eq!(engine.client_count().await, 0);
    let closed = tokio::time::timeout(WAIT, ws.next()).await.unwrap();
    assert!(matches!(
        closed,
        None | Some(Ok(Message::Close(_))) | Some(Err(_))
    ));
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_client_events_are_emitted() {
    let connector = Arc::new(DuplexConnector::default());
    let _device = connector.plug_in();
    let engine = BridgeEngine::new(connector);
    let mut events = engine.subscribe();
    let addr = engine.start(config()).await.unwrap();

    let mut ws = connect(addr).await;
    wait_for_clients(&engine, 1).await;
    ws.close(None).await.unwrap();
    wait_for_clients(&engine, 0).await;
    engine.stop().await;

    let mut connected = 0;
    let mut disconnected = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            BridgeEvent::ClientConnected { .. } => connected += 1,
            BridgeEvent::ClientDisconnected { .. } => disconnected += 1,
            _ => {}
        }
    }
    assert_eq!(connected, 1);
    assert_eq!(disconnected, 1);
}
