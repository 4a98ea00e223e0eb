//! Serial-to-WebSocket bridge: entry point.
//!
//! Opens a serial device, serves its readings to WebSocket clients, and
//! forwards client commands back to the device until Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! serial-ws-bridge [OPTIONS]
//!
//! Options:
//!   --port <PORT>              Serial port [default: /dev/ttyUSB0 or COM1]
//!   --baud <BAUD>              Baud rate [default: 9600]
//!   --listen-port <PORT>       WebSocket listener port [default: 8765]
//!   --bind <IP>                WebSocket bind address [default: 0.0.0.0]
//!   --device-id <ID>           Device id inserted into commands
//!   --forward-empty-commands   Send blank client messages as "S\r"
//!   --config <FILE>            TOML configuration file
//!   --event-format <FORMAT>    text | json [default: text]
//! ```
//!
//! # Precedence
//!
//! Command-line flags (or their environment variables) override values from
//! `--config`, which override built-in defaults.
//!
//! | Variable                | Flag            |
//! |-------------------------|-----------------|
//! | `SERIAL_WS_PORT`        | `--port`        |
//! | `SERIAL_WS_BAUD`        | `--baud`        |
//! | `SERIAL_WS_LISTEN_PORT` | `--listen-port` |
//! | `SERIAL_WS_BIND`        | `--bind`        |
//! | `SERIAL_WS_DEVICE_ID`   | `--device-id`   |
//! | `SERIAL_WS_CONFIG`      | `--config`      |
//!
//! Log verbosity is controlled separately with `RUST_LOG` (default `info`).

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use serial_ws_bridge::infrastructure::load_config;
use serial_ws_bridge::{BridgeConfig, BridgeEngine, BridgeEvent, BridgeState};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// How engine events are printed to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EventFormat {
    /// One human-readable line per event.
    Text,
    /// One JSON object per line.
    Json,
}

/// Serial-to-WebSocket bridge.
///
/// Broadcasts every reading from a serial device to all connected WebSocket
/// clients and writes client commands back to the device.
#[derive(Debug, Parser)]
#[command(
    name = "serial-ws-bridge",
    about = "Bridges a line-oriented serial device to WebSocket clients",
    version
)]
struct Cli {
    /// Serial port name or path (e.g. /dev/ttyUSB0, COM3).
    #[arg(long, env = "SERIAL_WS_PORT")]
    port: Option<String>,

    /// Serial baud rate.
    #[arg(long, env = "SERIAL_WS_BAUD")]
    baud: Option<u32>,

    /// TCP port for the WebSocket server.  0 picks a free port.
    #[arg(long, env = "SERIAL_WS_LISTEN_PORT")]
    listen_port: Option<u16>,

    /// IP address to bind the WebSocket server to.
    ///
    /// Use `0.0.0.0` to accept connections on every interface, or `127.0.0.1`
    /// for local clients only.
    #[arg(long, env = "SERIAL_WS_BIND")]
    bind: Option<String>,

    /// Device identifier inserted into command frames (`S <id> <CMD>`).
    #[arg(long, env = "SERIAL_WS_DEVICE_ID")]
    device_id: Option<String>,

    /// Forward client messages that are blank after trimming as a bare `S`.
    #[arg(long)]
    forward_empty_commands: bool,

    /// TOML configuration file.
    #[arg(long, env = "SERIAL_WS_CONFIG")]
    config: Option<PathBuf>,

    /// Output format for engine events.
    #[arg(long, value_enum, default_value_t = EventFormat::Text)]
    event_format: EventFormat,
}

impl Cli {
    /// Builds the engine configuration: defaults, then `--config`, then flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded, `--bind` is not
    /// an IP address, or the result does not validate.
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => BridgeConfig::default(),
        };

        if let Some(port) = self.port {
            config.serial.port = port;
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(bind) = &self.bind {
            let ip: IpAddr = bind
                .trim()
                .parse()
                .with_context(|| format!("invalid WebSocket bind address: '{bind}'"))?;
            config.ws_bind_addr = SocketAddr::new(ip, config.ws_bind_addr.port());
        }
        if let Some(listen_port) = self.listen_port {
            config.ws_bind_addr.set_port(listen_port);
        }
        if self.device_id.is_some() {
            config.device_id = self.device_id;
        }
        if self.forward_empty_commands {
            config.forward_empty_commands = true;
        }

        config.validate()?;
        Ok(config)
    }
}

fn print_event(event: &BridgeEvent, format: EventFormat) {
    match format {
        EventFormat::Text => println!("{event}"),
        EventFormat::Json => match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!("failed to serialize event: {e}"),
        },
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let format = cli.event_format;
    let config = cli.into_bridge_config()?;

    info!(
        "serial-ws-bridge starting: serial={} @ {} baud, ws={}",
        config.serial.port, config.serial.baud_rate, config.ws_bind_addr
    );

    let engine = BridgeEngine::native();

    // Prints until the engine (the last event sender) is dropped.
    let mut events = engine.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event, format),
                Err(RecvError::Lagged(n)) => warn!("event printer skipped {n} events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut state = engine.watch_state();
    let outcome = match engine.start(config).await {
        Ok(addr) => {
            info!("bridge running on ws://{addr}; press Ctrl+C to stop");
            let failed = tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    match res {
                        Ok(()) => info!("received Ctrl+C, shutting down"),
                        Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
                    }
                    false
                }
                res = state.wait_for(|s| *s == BridgeState::Failed) => res.is_ok(),
            };
            engine.stop().await;
            if failed {
                Err(anyhow::anyhow!("serial link lost"))
            } else {
                Ok(())
            }
        }
        Err(e) => Err(anyhow::Error::new(e).context("failed to start bridge")),
    };

    drop(engine);
    if let Err(e) = printer.await {
        warn!("event printer task failed: {e}");
    }

    info!("serial-ws-bridge stopped");
    outcome
}

// ── Tests ─────────────────────────────────────────────────────────────────────
