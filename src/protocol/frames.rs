//! Command and response frames.
//!
//! The ThermoBeacon speaks a simple write-then-read protocol over two
//! characteristics. A command frame is written to the tx characteristic and
//! the matching response is read back from rx.
//!
//! Command layouts:
//! - Count query: `01 00 00 00 00`
//! - Sample query: `07 <idx_lo> <idx_hi> 00 00 03`

use bytes::Bytes;
use std::fmt;

use crate::protocol::hex::to_hex_string;

/// Opcode for the "how many samples are stored" query.
pub const COUNT_QUERY_OPCODE: u8 = 0x01;

/// Opcode for the "send me the samples at index N" query.
pub const SAMPLE_QUERY_OPCODE: u8 = 0x07;

/// Trailing bytes of every sample query.
pub const SAMPLE_QUERY_SUFFIX: [u8; 3] = [0x00, 0x00, 0x03];

/// Length of a sample query frame in bytes.
pub const SAMPLE_QUERY_LEN: usize = 6;

/// An outgoing command, ready to be written to the tx characteristic.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CommandFrame(Bytes);

impl CommandFrame {
    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of bytes in the frame.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the frame is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for CommandFrame {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for CommandFrame {
    fn from(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }
}

impl AsRef<[u8]> for CommandFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandFrame[{}]", to_hex_string(&self.0))
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_hex_string(&self.0))
    }
}

/// A response read back from the rx characteristic.
///
/// Treated as an opaque buffer until handed to one of the decoders.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ResponseFrame(Bytes);

impl ResponseFrame {
    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of bytes in the frame.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the frame is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for ResponseFrame {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl AsRef<[u8]> for ResponseFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::ops::Deref for ResponseFrame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ResponseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResponseFrame[{}]", to_hex_string(&self.0))
    }
}

impl fmt::Display for ResponseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_hex_string(&self.0))
    }
}

/// Build the "request sample count" command.
pub fn build_count_query() -> CommandFrame {
    static COUNT_QUERY: [u8; 5] = [COUNT_QUERY_OPCODE, 0x00, 0x00, 0x00, 0x00];
    CommandFrame::from(&COUNT_QUERY[..])
}

/// Build the command requesting the samples stored at `index`.
///
/// The index goes on the wire as a little-endian `u16`, low byte first.
///
/// ```
/// use thermobeacon_ble::protocol::build_sample_query;
///
/// let frame = build_sample_query(0x0102);
/// assert_eq!(frame.as_bytes(), &[0x07, 0x02, 0x01, 0x00, 0x00, 0x03]);
/// ```
pub fn build_sample_query(index: u16) -> CommandFrame {
    let mut bytes = Vec::with_capacity(SAMPLE_QUERY_LEN);
    bytes.push(SAMPLE_QUERY_OPCODE);
    bytes.extend_from_slice(&index.to_le_bytes());
    bytes.extend_from_slice(&SAMPLE_QUERY_SUFFIX);
    CommandFrame::from(bytes)
}
