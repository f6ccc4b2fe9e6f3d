//! btleplug-backed transport.
//!
//! Wraps the first available system Bluetooth adapter and exposes it through
//! the [`Transport`] traits.

use async_trait::async_trait;
use btleplug::api::{
    BDAddr, Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, Service, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use std::future::Future;
use std::str::FromStr;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::ble::transport::{GattCharacteristic, GattDevice, GattService, Transport};
use crate::error::{Error, Result};

/// Transport over the host's Bluetooth adapter.
pub struct BtleplugTransport {
    /// The BLE adapter to use for scanning.
    adapter: Adapter,
}

impl BtleplugTransport {
    /// Create a transport on the first available adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self { adapter })
    }

    /// Create a transport on a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }
}

#[async_trait]
impl Transport for BtleplugTransport {
    type Device = BtleplugDevice;

    async fn start_discovery(&self) -> Result<bool> {
        info!("Starting BLE scan");

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)?;

        Ok(true)
    }

    async fn stop_discovery(&self) -> Result<()> {
        info!("Stopping BLE scan");
        self.adapter.stop_scan().await.map_err(Error::Bluetooth)
    }

    async fn devices(&self) -> Result<Vec<BtleplugDevice>> {
        let peripherals = self.adapter.peripherals().await.map_err(Error::Bluetooth)?;
        trace!("Adapter knows {} peripherals", peripherals.len());
        Ok(peripherals.into_iter().map(BtleplugDevice::new).collect())
    }

    fn canonical_address(&self, address: &str) -> String {
        canonicalize_address(address)
    }
}

/// Normalize a hardware address to the form btleplug reports.
///
/// Input that does not parse as a [`BDAddr`] is returned unchanged.
pub fn canonicalize_address(address: &str) -> String {
    BDAddr::from_str(address)
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| address.to_string())
}

/// List services, running GATT discovery first if the table is empty.
///
/// btleplug only fills the service table from `discover_services`, so an
/// empty table would otherwise stay empty. A failed discovery is logged and
/// yields whatever the table holds afterwards.
async fn list_or_discover<S, L, D, F>(list: L, discover: D) -> Vec<S>
where
    L: Fn() -> Vec<S>,
    D: FnOnce() -> F,
    F: Future<Output = btleplug::Result<()>>,
{
    let services = list();
    if !services.is_empty() {
        return services;
    }

    debug!("Service table empty, running service discovery");
    if let Err(e) = discover().await {
        warn!("Failed to discover services: {}", e);
    }

    list()
}

/// A peripheral seen by the adapter.
#[derive(Debug, Clone)]
pub struct BtleplugDevice {
    peripheral: Peripheral,
}

impl BtleplugDevice {
    /// Wrap a btleplug peripheral.
    pub fn new(peripheral: Peripheral) -> Self {
        Self { peripheral }
    }

    /// Get the peripheral.
    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }
}

#[async_trait]
impl GattDevice for BtleplugDevice {
    type Service = BtleplugService;

    fn address(&self) -> String {
        self.peripheral.address().to_string()
    }

    async fn name(&self) -> Option<String> {
        self.peripheral
            .properties()
            .await
            .ok()
            .flatten()
            .and_then(|p| p.local_name)
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn connect(&self) -> Result<bool> {
        // Check if already connected at BLE level
        if self.is_connected().await {
            info!("Peripheral already connected at BLE level");
        } else {
            self.peripheral.connect().await.map_err(Error::Bluetooth)?;
            info!("Successfully connected to {}", self.address());
        }

        // Discover services
        if let Err(e) = self.peripheral.discover_services().await {
            warn!("Failed to discover services: {}", e);
        }

        Ok(true)
    }

    async fn disconnect(&self) -> Result<bool> {
        if !self.is_connected().await {
            debug!("{} not connected, nothing to disconnect", self.address());
            return Ok(false);
        }

        self.peripheral
            .disconnect()
            .await
            .map_err(Error::Bluetooth)?;
        info!("Successfully disconnected from {}", self.address());

        Ok(true)
    }

    async fn services(&self) -> Result<Vec<BtleplugService>> {
        let services = list_or_discover(
            || self.peripheral.services().into_iter().collect::<Vec<_>>(),
            || self.peripheral.discover_services(),
        )
        .await;

        Ok(services
            .into_iter()
            .map(|service| BtleplugService {
                peripheral: self.peripheral.clone(),
                service,
            })
            .collect())
    }
}

/// A GATT service on a btleplug peripheral.
#[derive(Debug, Clone)]
pub struct BtleplugService {
    peripheral: Peripheral,
    service: Service,
}

impl GattService for BtleplugService {
    type Characteristic = BtleplugCharacteristic;

    fn uuid(&self) -> Uuid {
        self.service.uuid
    }

    fn characteristics(&self) -> Vec<BtleplugCharacteristic> {
        self.service
            .characteristics
            .iter()
            .map(|characteristic| BtleplugCharacteristic {
                peripheral: self.peripheral.clone(),
                characteristic: characteristic.clone(),
            })
            .collect()
    }
}

/// A GATT characteristic on a btleplug peripheral.
#[derive(Debug, Clone)]
pub struct BtleplugCharacteristic {
    peripheral: Peripheral,
    characteristic: Characteristic,
}

#[async_trait]
impl GattCharacteristic for BtleplugCharacteristic {
    fn uuid(&self) -> Uuid {
        self.characteristic.uuid
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        self.peripheral
            .write(&self.characteristic, data, WriteType::WithResponse)
            .await
            .map_err(Error::Bluetooth)?;

        trace!(
            "Wrote {} bytes to characteristic {}",
            data.len(),
            self.characteristic.uuid
        );

        Ok(())
    }

    async fn read(&self) -> Result<Vec<u8>> {
        let data = self
            .peripheral
            .read(&self.characteristic)
            .await
            .map_err(Error::Bluetooth)?;

        trace!(
            "Read {} bytes from characteristic {}",
            data.len(),
            self.characteristic.uuid
        );

        Ok(data)
    }
}
