//! Error types for the thermobeacon-ble crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// A command string was not valid hexadecimal.
    #[error("Malformed hex command {input:?}: {reason}")]
    MalformedHex {
        /// The offending input.
        input: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A response frame was shorter than its format requires.
    #[error("Frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum length for the format being decoded.
        expected: usize,
        /// Length actually received.
        actual: usize,
    },

    /// The target device never showed up during discovery.
    #[error("Device {address} not found after {attempts} scans")]
    DeviceNotFound {
        /// The address that was searched for.
        address: String,
        /// Number of scans performed.
        attempts: u32,
    },

    /// Failed to establish a connection to the device.
    #[error("Connection to {address} failed: {reason}")]
    ConnectFailed {
        /// The device address.
        address: String,
        /// Description of why the connection failed.
        reason: String,
    },

    /// The device does not expose the requested service.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The UUID of the service that was not found.
        uuid: String,
    },

    /// The rx and/or tx characteristic is missing from the service.
    #[error("Characteristics not found (rx found: {rx_found}, tx found: {tx_found})")]
    CharacteristicsNotFound {
        /// Whether the read characteristic was present.
        rx_found: bool,
        /// Whether the write characteristic was present.
        tx_found: bool,
    },

    /// A transport read/write or enumeration failed.
    #[error("Transport error: {reason}")]
    Transport {
        /// Description of the failure.
        reason: String,
    },

    /// A transport call did not complete in time.
    #[error("Timed out during {operation}")]
    Timeout {
        /// The operation that timed out.
        operation: &'static str,
    },

    /// The operation was interrupted by a cancellation signal.
    #[error("Cancelled")]
    Cancelled,
}

impl Error {
    /// Check if this error is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this error happened while establishing a session.
    pub fn is_resolution_failure(&self) -> bool {
        matches!(
            self,
            Self::DeviceNotFound { .. }
                | Self::ConnectFailed { .. }
                | Self::ServiceNotFound { .. }
                | Self::CharacteristicsNotFound { .. }
        )
    }

    /// Process exit code for this error.
    ///
    /// Each session-establishment failure maps to its own nonzero code so
    /// that scripts can tell them apart.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::DeviceNotFound { .. } => 2,
            Self::ConnectFailed { .. } => 3,
            Self::ServiceNotFound { .. } => 4,
            Self::CharacteristicsNotFound { .. } => 5,
            Self::Bluetooth(_) | Self::BluetoothUnavailable => 6,
            Self::Cancelled => 130,
            _ => 1,
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
