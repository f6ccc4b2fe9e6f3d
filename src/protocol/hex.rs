//! Hex text encoding for command frames.
//!
//! Commands are written down as hex strings (`"0100000000"`) and responses
//! are logged as space-separated lowercase pairs (`"01 00 00 00 00"`).

use crate::error::{Error, Result};
use crate::protocol::frames::CommandFrame;

/// Parse a hex string into a command frame.
///
/// The input must contain an even number of hexadecimal digits (either case),
/// with no separators. Each pair of digits becomes one byte, high nibble first.
///
/// # Errors
///
/// Returns [`Error::MalformedHex`] if the length is odd or a character is not
/// a hex digit.
///
/// # Example
///
/// ```
/// use thermobeacon_ble::protocol::encode_command;
///
/// let frame = encode_command("07aB00").unwrap();
/// assert_eq!(frame.as_bytes(), &[0x07, 0xAB, 0x00]);
/// ```
pub fn encode_command(hex: &str) -> Result<CommandFrame> {
    if hex.len() % 2 != 0 {
        return Err(Error::MalformedHex {
            input: hex.to_string(),
            reason: format!("odd length {}", hex.len()),
        });
    }

    let mut bytes = Vec::with_capacity(hex.len() / 2);

    for (i, pair) in hex.as_bytes().chunks_exact(2).enumerate() {
        let high = nibble(pair[0]).ok_or_else(|| bad_digit(hex, i * 2))?;
        let low = nibble(pair[1]).ok_or_else(|| bad_digit(hex, i * 2 + 1))?;
        bytes.push((high << 4) | low);
    }

    Ok(CommandFrame::from(bytes))
}

/// Format bytes as space-separated lowercase hex pairs.
///
/// Used for diagnostics only.
///
/// ```
/// use thermobeacon_ble::protocol::to_hex_string;
///
/// assert_eq!(to_hex_string(&[0x07, 0xAB, 0x00]), "07 ab 00");
/// assert_eq!(to_hex_string(&[]), "");
/// ```
pub fn to_hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn nibble(c: u8) -> Option<u8> {
    (c as char).to_digit(16).map(|d| d as u8)
}

fn bad_digit(input: &str, position: usize) -> Error {
    Error::MalformedHex {
        input: input.to_string(),
        reason: format!("non-hex character at position {}", position),
    }
}
