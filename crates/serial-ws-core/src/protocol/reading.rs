//! The [`Reading`] value type.
//!
//! A reading is one complete message from the serial device, exactly as the
//! device sent it, including the trailing carriage return.  Clients receive
//! these bytes verbatim, so the framer never strips or re-encodes anything.
//!
//! # Why `Arc<[u8]>`?
//!
//! A single reading is fanned out to every connected client.  Storing the
//! bytes behind an `Arc` makes each clone a reference-count bump instead of a
//! full copy, no matter how many clients are listening.

use std::fmt;
use std::sync::Arc;

use super::framing::READING_DELIMITER;

/// One delimiter-terminated message read from the serial device.
///
/// Readings are immutable.  Equality compares the raw bytes, which is what the
/// repeat-suppression policy needs: `"12.5\r"` and `"12.50\r"` are different
/// readings even if they mean the same number.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Reading {
    bytes: Arc<[u8]>,
}

impl Reading {
    /// Wraps raw device bytes.  The bytes are stored as given.
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// The exact bytes received from the device, delimiter included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes in the reading, delimiter included.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the reading holds no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The reading without its trailing delimiter.
    pub fn payload(&self) -> &[u8] {
        match self.bytes.split_last() {
            Some((&last, rest)) if last == READING_DELIMITER => rest,
            _ => &self.bytes,
        }
    }

    /// A display-friendly view of the payload.
    ///
    /// Invalid UTF-8 sequences are replaced with U+FFFD so a noisy line never
    /// prevents the status display from updating.
    pub fn to_text_lossy(&self) -> String {
        String::from_utf8_lossy(self.payload()).into_owned()
    }

    /// Copies the bytes into an owned vector (for APIs that need `Vec<u8>`).
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }
}

impl fmt::Debug for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reading({:?})", String::from_utf8_lossy(&self.bytes))
    }
}

impl From<&[u8]> for Reading {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

impl From<Vec<u8>> for Reading {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&str> for Reading {
    fn from(text: &str) -> Self {
        Self::new(text.as_bytes())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
