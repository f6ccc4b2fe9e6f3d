//! Decoding of count and sample responses.
//!
//! Sample responses carry a 6-byte header followed by six little-endian
//! 16-bit raw values. Each raw value is a fixed-point number in 1/16 units
//! (°C or %RH). Values above 2048 wrap around to negative by subtracting 4096.
//! Slot 0 is the temperature and slot 3 the relative humidity. The remaining
//! slots are not used by this device profile.

use std::fmt;

use crate::error::{Error, Result};

/// Minimum length of a count response.
pub const COUNT_RESPONSE_MIN_LEN: usize = 3;

/// Header bytes preceding the value slots in a sample response.
pub const READINGS_HEADER_LEN: usize = 6;

/// Number of 16-bit value slots in a sample response.
pub const READING_SLOTS: usize = 6;

/// Minimum length of a sample response.
pub const READINGS_RESPONSE_MIN_LEN: usize = READINGS_HEADER_LEN + READING_SLOTS * 2;

/// Slot holding the temperature.
pub const TEMPERATURE_SLOT: usize = 0;

/// Slot holding the relative humidity.
pub const HUMIDITY_SLOT: usize = 3;

/// Raw values above this (2048 in physical units) are negative.
const RAW_WRAP_THRESHOLD: i32 = 0x8000;

/// Span subtracted from raw values above the threshold (4096 in physical units).
const RAW_SPAN: i32 = 0x1_0000;

/// A signed decimal with exactly two fractional digits.
///
/// Stored as a whole number of hundredths, so formatting and comparison are
/// exact.
///
/// # Example
///
/// ```
/// use thermobeacon_ble::protocol::Centi;
///
/// // 0x0158 = 344 sixteenths = 21.5
/// let value = Centi::from_raw(0x0158);
/// assert_eq!(value.to_string(), "21.50");
/// assert_eq!(value.hundredths(), 2150);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Centi(i32);

impl Centi {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Create from a whole number of hundredths.
    pub const fn from_hundredths(hundredths: i32) -> Self {
        Self(hundredths)
    }

    /// Convert a raw 1/16-unit sensor value.
    ///
    /// Applies the wraparound for values above 2048, then rounds to two
    /// decimal places with ties going away from zero (0.125 -> 0.13,
    /// -0.125 -> -0.13).
    pub fn from_raw(raw: u16) -> Self {
        let mut sixteenths = raw as i32;
        if sixteenths > RAW_WRAP_THRESHOLD {
            sixteenths -= RAW_SPAN;
        }

        // value = sixteenths / 16 = sixteenths * 25 / 4 hundredths.
        let quarters = sixteenths.abs() * 25;
        let rounded = (quarters + 2) / 4;

        Self(if sixteenths < 0 { -rounded } else { rounded })
    }

    /// The value as a whole number of hundredths.
    pub fn hundredths(&self) -> i32 {
        self.0
    }

    /// The value as a float.
    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for Centi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

/// One decoded temperature/humidity sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reading {
    /// Temperature in degrees Celsius.
    pub temperature: Centi,
    /// Relative humidity in percent.
    pub humidity: Centi,
}

impl Reading {
    /// Build a reading from the six decoded slots of a sample response.
    pub fn from_slots(slots: &[Centi; READING_SLOTS]) -> Self {
        Self {
            temperature: slots[TEMPERATURE_SLOT],
            humidity: slots[HUMIDITY_SLOT],
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°C, {}%RH", self.temperature, self.humidity)
    }
}

/// Decode the number of stored samples from a count response.
///
/// Byte 0 is a status/echo byte and is ignored. Bytes 1-2 hold the count,
/// little-endian.
///
/// # Errors
///
/// Returns [`Error::FrameTooShort`] for responses under 3 bytes.
pub fn decode_available_count(response: &[u8]) -> Result<u16> {
    ensure_len(response, COUNT_RESPONSE_MIN_LEN)?;
    Ok(u16::from_le_bytes([response[1], response[2]]))
}

/// Decode all six value slots of a sample response.
///
/// # Errors
///
/// Returns [`Error::FrameTooShort`] for responses under 18 bytes.
pub fn decode_slots(response: &[u8]) -> Result<[Centi; READING_SLOTS]> {
    ensure_len(response, READINGS_RESPONSE_MIN_LEN)?;

    let mut slots = [Centi::ZERO; READING_SLOTS];
    for (v, slot) in slots.iter_mut().enumerate() {
        let offset = READINGS_HEADER_LEN + v * 2;
        let raw = u16::from_le_bytes([response[offset], response[offset + 1]]);
        *slot = Centi::from_raw(raw);
    }

    Ok(slots)
}

/// Decode the temperature and humidity from a sample response.
///
/// # Errors
///
/// Returns [`Error::FrameTooShort`] for responses under 18 bytes.
pub fn decode_readings(response: &[u8]) -> Result<Reading> {
    decode_slots(response).map(|slots| Reading::from_slots(&slots))
}

fn ensure_len(response: &[u8], expected: usize) -> Result<()> {
    if response.len() < expected {
        return Err(Error::FrameTooShort {
            expected,
            actual: response.len(),
        });
    }
    Ok(())
}
