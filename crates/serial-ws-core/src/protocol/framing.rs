//! Carriage-return framing for the serial byte stream.
//!
//! A serial port is a *stream*: one `read()` may return half a reading, or
//! three readings and the start of a fourth.  The serial adapter therefore
//! accumulates bytes in a buffer and calls [`decode_reading`] in a loop,
//! exactly like a binary codec is driven over TCP:
//!
//! ```text
//! loop {
//!     match decode_reading(&buf) {
//!         Ok((reading, consumed)) => { buf.drain(..consumed); emit(reading) }
//!         Err(FrameError::Incomplete { .. }) => read more bytes,
//!         Err(FrameError::TooLong { .. }) => discard buffer, report error,
//!     }
//! }
//! ```

use thiserror::Error;

use super::reading::Reading;

/// Byte that terminates every reading sent by the device.
pub const READING_DELIMITER: u8 = b'\r';

/// Upper bound on a single reading, delimiter included.
///
/// A device that streams bytes without ever sending a carriage return would
/// otherwise grow the accumulation buffer forever.
pub const MAX_READING_LEN: usize = 4096;

/// Errors produced by [`decode_reading`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// No delimiter in the buffer yet; more bytes are needed.
    #[error("incomplete reading: {available} bytes buffered without a delimiter")]
    Incomplete { available: usize },

    /// The buffer exceeds [`MAX_READING_LEN`] and still holds no delimiter.
    #[error("reading exceeds {max} bytes without a delimiter (buffered {len})")]
    TooLong { len: usize, max: usize },
}

/// Decodes one [`Reading`] from the beginning of `buf`.
///
/// Returns the reading (delimiter retained) and the number of bytes consumed
/// so the caller can advance its buffer.
///
/// # Errors
///
/// - [`FrameError::Incomplete`] when `buf` holds no delimiter yet.
/// - [`FrameError::TooLong`] when `buf` holds no delimiter within the first
///   [`MAX_READING_LEN`] bytes.
///
/// # Examples
///
/// ```rust
/// use serial_ws_core::protocol::decode_reading;
///
/// let (reading, consumed) = decode_reading(b"21.7\r22.").unwrap();
/// assert_eq!(reading.as_bytes(), b"21.7\r");
/// assert_eq!(consumed, 5);
/// ```
pub fn decode_reading(buf: &[u8]) -> Result<(Reading, usize), FrameError> {
    match buf.iter().position(|&b| b == READING_DELIMITER) {
        Some(idx) if idx < MAX_READING_LEN => {
            let consumed = idx + 1;
            Ok((Reading::from(&buf[..consumed]), consumed))
        }
        Some(idx) => Err(FrameError::TooLong {
            len: idx + 1,
            max: MAX_READING_LEN,
        }),
        None if buf.len() >= MAX_READING_LEN => Err(FrameError::TooLong {
            len: buf.len(),
            max: MAX_READING_LEN,
        }),
        None => Err(FrameError::Incomplete {
            available: buf.len(),
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
