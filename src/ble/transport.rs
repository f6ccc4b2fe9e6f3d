//! Transport capability.
//!
//! The resolver and poller never talk to a radio stack directly. They consume
//! these traits, which cover device enumeration, connection, GATT service and
//! characteristic lookup, and characteristic read/write. The btleplug-backed
//! implementation lives in [`crate::ble::adapter`].

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

/// Characteristic type reachable from a device type.
pub type CharacteristicOf<D> = <<D as GattDevice>::Service as GattService>::Characteristic;

/// Entry point to a BLE stack: discovery and the device list.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Device handle type.
    type Device: GattDevice;

    /// Put the adapter into discovery mode. Returns whether discovery started.
    async fn start_discovery(&self) -> Result<bool>;

    /// Leave discovery mode.
    async fn stop_discovery(&self) -> Result<()>;

    /// All devices known to the adapter so far.
    async fn devices(&self) -> Result<Vec<Self::Device>>;

    /// Normalize a user-supplied address to the form [`GattDevice::address`] returns.
    fn canonical_address(&self, address: &str) -> String {
        address.to_string()
    }
}

/// A remote peripheral.
#[async_trait]
pub trait GattDevice: Send + Sync {
    /// Service handle type.
    type Service: GattService;

    /// Hardware address of the device.
    fn address(&self) -> String;

    /// Advertised name, if known.
    async fn name(&self) -> Option<String>;

    /// Whether the device is currently connected.
    async fn is_connected(&self) -> bool;

    /// Connect. Returns `false` if the device refused.
    async fn connect(&self) -> Result<bool>;

    /// Disconnect. Returns `false` if the device was not connected.
    async fn disconnect(&self) -> Result<bool>;

    /// Services discovered on the device so far.
    ///
    /// May be empty for a while after connecting, until the stack has
    /// finished service discovery.
    async fn services(&self) -> Result<Vec<Self::Service>>;
}

/// A GATT service on a connected device.
pub trait GattService: Send + Sync {
    /// Characteristic handle type.
    type Characteristic: GattCharacteristic;

    /// Service UUID.
    fn uuid(&self) -> Uuid;

    /// Characteristics belonging to this service.
    fn characteristics(&self) -> Vec<Self::Characteristic>;
}

/// A GATT characteristic on a connected device.
#[async_trait]
pub trait GattCharacteristic: Send + Sync {
    /// Characteristic UUID.
    fn uuid(&self) -> Uuid;

    /// Write a value.
    async fn write(&self, data: &[u8]) -> Result<()>;

    /// Read the current value.
    async fn read(&self) -> Result<Vec<u8>>;
}
