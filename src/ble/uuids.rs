//! BLE Service and Characteristic UUIDs.
//!
//! Contains the UUID constants used for ThermoBeacon communication.

use uuid::Uuid;

/// ThermoBeacon data service UUID.
pub const THERMOBEACON_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_ffe0_0000_1000_8000_00805f9b34fb);
/// Response characteristic UUID (read from device).
pub const THERMOBEACON_RX_UUID: Uuid = Uuid::from_u128(0x0000_fff3_0000_1000_8000_00805f9b34fb);
/// Command characteristic UUID (write to device).
pub const THERMOBEACON_TX_UUID: Uuid = Uuid::from_u128(0x0000_fff5_0000_1000_8000_00805f9b34fb);

/// The service and characteristic pair a session binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GattProfile {
    /// Service containing both characteristics.
    pub service: Uuid,
    /// Characteristic responses are read from.
    pub rx: Uuid,
    /// Characteristic commands are written to.
    pub tx: Uuid,
}

impl GattProfile {
    /// The ThermoBeacon command/response profile.
    pub const fn thermobeacon() -> Self {
        Self {
            service: THERMOBEACON_SERVICE_UUID,
            rx: THERMOBEACON_RX_UUID,
            tx: THERMOBEACON_TX_UUID,
        }
    }
}

impl Default for GattProfile {
    fn default() -> Self {
        Self::thermobeacon()
    }
}
