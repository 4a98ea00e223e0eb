//! Serial transport adapter.
//!
//! Opens the device with `tokio-serial` (8 data bits, no parity, 1 stop bit,
//! no flow control) and splits it into a [`SerialReader`] that yields framed
//! [`Reading`]s and a [`SerialWriter`] that writes and drains command frames.
//!
//! # Read timeouts
//!
//! Every read is bounded by `SerialSettings::read_timeout`.  Expiry returns
//! [`SerialError::Timeout`], which callers treat as "nothing yet, try again".
//! Partially received bytes stay buffered across timeouts.
//!
//! # Testability
//!
//! The engine never calls `tokio-serial` directly: it goes through the
//! [`SerialConnector`] trait.  Tests plug in connectors that return in-memory
//! streams (`tokio::io::duplex`, `tokio_test::io::Builder`).

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serial_ws_core::{decode_reading, FrameError, Reading, READING_DELIMITER};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info};

use crate::domain::SerialSettings;

/// Bytes requested from the device per read call.
const READ_CHUNK: usize = 1024;

/// Errors raised by the serial transport.
#[derive(Debug, Error)]
pub enum SerialError {
    /// The endpoint does not exist, is busy, or cannot be configured.
    #[error("failed to open serial port {port}: {reason}")]
    Open { port: String, reason: String },

    /// No complete reading arrived within the read timeout.
    #[error("serial read timed out")]
    Timeout,

    /// A transient read or write failure.
    #[error("serial I/O error: {0}")]
    Io(#[source] io::Error),

    /// The device is gone (unplugged, closed, or persistently failing).
    #[error("serial link lost: {0}")]
    LinkLost(String),

    /// The device sent a line longer than the framer accepts.
    #[error("serial framing error: {0}")]
    Framing(#[from] FrameError),
}

impl SerialError {
    /// `true` when the link cannot be used any more.
    pub fn is_link_lost(&self) -> bool {
        matches!(self, Self::LinkLost(_))
    }

    /// `true` for errors the read loop logs and moves past.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Io(_) | Self::Framing(_))
    }
}

impl From<io::Error> for SerialError {
    fn from(e: io::Error) -> Self {
        use io::ErrorKind::*;
        match e.kind() {
            TimedOut | WouldBlock | Interrupted => Self::Timeout,
            BrokenPipe | NotConnected | ConnectionAborted | ConnectionReset | UnexpectedEof
            | NotFound => Self::LinkLost(e.to_string()),
            _ => Self::Io(e),
        }
    }
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An open serial connection, split into its two directions.
pub struct SerialLink {
    pub reader: SerialReader,
    pub writer: SerialWriter,
}

impl SerialLink {
    /// Splits a bidirectional stream into a link.
    pub fn from_stream<S>(stream: S, settings: &SerialSettings) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_parts(reader, writer, settings)
    }

    /// Builds a link from independent read and write halves.
    pub fn from_parts<R, W>(reader: R, writer: W, settings: &SerialSettings) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: SerialReader::new(Box::new(reader), settings.read_timeout),
            writer: SerialWriter::new(Box::new(writer), settings.write_timeout),
        }
    }
}

/// Opens serial links.  The seam between the engine and real hardware.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SerialConnector: Send + Sync {
    /// Opens the endpoint described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`SerialError::Open`] if the endpoint is missing, busy, or
    /// rejects the requested configuration.
    async fn open(&self, settings: &SerialSettings) -> Result<SerialLink, SerialError>;
}

/// [`SerialConnector`] backed by the operating system's serial ports.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeSerialConnector;

#[async_trait]
impl SerialConnector for NativeSerialConnector {
    async fn open(&self, settings: &SerialSettings) -> Result<SerialLink, SerialError> {
        debug!("opening serial port {} at {} baud", settings.port, settings.baud_rate);

        // On Unix the port is opened in exclusive mode, so a second bridge on
        // the same endpoint fails here instead of stealing bytes.
        let stream = tokio_serial::new(&settings.port, settings.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(settings.read_timeout)
            .open_native_async()
            .map_err(|e| SerialError::Open {
                port: settings.port.clone(),
                reason: e.to_string(),
            })?;

        info!("opened serial port {}", settings.port);
        Ok(SerialLink::from_stream(stream, settings))
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// Read half of a serial link, yielding one [`Reading`] per call.
pub struct SerialReader {
    inner: BoxedReader,
    read_timeout: Duration,
    /// Accumulates bytes across reads until a delimiter arrives.
    recv_buf: Vec<u8>,
    read_tmp: Vec<u8>,
    /// Set after an overlong line; bytes are dropped up to the next delimiter.
    resyncing: bool,
}

impl SerialReader {
    fn new(inner: BoxedReader, read_timeout: Duration) -> Self {
        Self {
            inner,
            read_timeout,
            recv_buf: Vec::with_capacity(READ_CHUNK),
            read_tmp: vec![0u8; READ_CHUNK],
            resyncing: false,
        }
    }

    /// Reads until one complete reading is available.
    ///
    /// # Errors
    ///
    /// - [`SerialError::Timeout`] when no complete reading arrived in time.
    /// - [`SerialError::Framing`] when a line exceeded the size limit; the
    ///   reader skips to the next delimiter before producing more readings.
    /// - [`SerialError::LinkLost`] on end-of-stream or a disconnect error.
    /// - [`SerialError::Io`] for other read failures.
    pub async fn read_reading(&mut self) -> Result<Reading, SerialError> {
        loop {
            if !self.resyncing {
                match decode_reading(&self.recv_buf) {
                    Ok((reading, consumed)) => {
                        self.recv_buf.drain(..consumed);
                        return Ok(reading);
                    }
                    Err(FrameError::Incomplete { .. }) => {}
                    Err(e @ FrameError::TooLong { .. }) => {
                        self.discard_overlong();
                        return Err(SerialError::Framing(e));
                    }
                }
            }

            let n = match timeout(self.read_timeout, self.inner.read(&mut self.read_tmp)).await {
                Err(_) => return Err(SerialError::Timeout),
                Ok(Ok(0)) => {
                    return Err(SerialError::LinkLost(
                        "serial device closed the connection".to_string(),
                    ))
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(e.into()),
            };
            self.recv_buf.extend_from_slice(&self.read_tmp[..n]);

            if self.resyncing {
                self.skip_to_delimiter();
            }
        }
    }

    fn discard_overlong(&mut self) {
        self.resyncing = true;
        self.skip_to_delimiter();
    }

    fn skip_to_delimiter(&mut self) {
        match self.recv_buf.iter().position(|&b| b == READING_DELIMITER) {
            Some(idx) => {
                self.recv_buf.drain(..=idx);
                self.resyncing = false;
            }
            None => self.recv_buf.clear(),
        }
    }
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Write half of a serial link, shared by every client session.
pub type SharedSerialWriter = Arc<Mutex<SerialWriter>>;

/// Write half of a serial link.
pub struct SerialWriter {
    inner: BoxedWriter,
    write_timeout: Duration,
    commands_written: u64,
    closed: bool,
}

impl SerialWriter {
    fn new(inner: BoxedWriter, write_timeout: Duration) -> Self {
        Self {
            inner,
            write_timeout,
            commands_written: 0,
            closed: false,
        }
    }

    /// Writes one command frame and drains it to the device.
    ///
    /// # Errors
    ///
    /// Returns [`SerialError::Timeout`] if the write does not complete within
    /// the write timeout, or the classified I/O error otherwise.
    pub async fn write_command(&mut self, frame: &[u8]) -> Result<(), SerialError> {
        if self.closed {
            return Err(SerialError::LinkLost("serial writer is closed".to_string()));
        }
        let inner = &mut self.inner;
        let write = async {
            inner.write_all(frame).await?;
            inner.flush().await
        };
        match timeout(self.write_timeout, write).await {
            Err(_) => Err(SerialError::Timeout),
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(())) => {
                self.commands_written += 1;
                Ok(())
            }
        }
    }

    /// Number of command frames fully written so far.
    pub fn commands_written(&self) -> u64 {
        self.commands_written
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Shuts the write half down and drops the device handle it holds.
    /// Calling it again does nothing.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.inner.shutdown().await {
            debug!("serial writer shutdown: {e}");
        }
        self.inner = Box::new(tokio::io::sink());
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
