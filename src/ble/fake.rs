//! Scriptable in-memory transport for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use uuid::Uuid;

use crate::ble::transport::{GattCharacteristic, GattDevice, GattService, Transport};
use crate::ble::uuids::{THERMOBEACON_RX_UUID, THERMOBEACON_SERVICE_UUID, THERMOBEACON_TX_UUID};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct TransportState {
    /// Devices and the number of scans before each becomes visible.
    devices: Vec<(FakeDevice, u32)>,
    scans: u32,
    start_calls: u32,
    stop_calls: u32,
    fail_stop: bool,
    /// Number of leading scans whose device listing errors out.
    failing_scans: u32,
    hang_scans: bool,
}

/// Fake adapter. Clones share state.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeTransport {
    state: Arc<Mutex<TransportState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device that shows up in the device list from scan `hidden_for + 1` on.
    pub fn add_device(&self, device: FakeDevice, hidden_for: u32) {
        self.state.lock().devices.push((device, hidden_for));
    }

    pub fn fail_stop_discovery(&self) {
        self.state.lock().fail_stop = true;
    }

    /// Make the first `scans` device listings fail.
    pub fn fail_scans(&self, scans: u32) {
        self.state.lock().failing_scans = scans;
    }

    /// Make every subsequent device listing block forever.
    pub fn hang_scans(&self) {
        self.state.lock().hang_scans = true;
    }

    pub fn scans(&self) -> u32 {
        self.state.lock().scans
    }

    pub fn start_calls(&self) -> u32 {
        self.state.lock().start_calls
    }

    pub fn stop_calls(&self) -> u32 {
        self.state.lock().stop_calls
    }
}

#[async_trait]
impl Transport for FakeTransport {
    type Device = FakeDevice;

    async fn start_discovery(&self) -> Result<bool> {
        self.state.lock().start_calls += 1;
        Ok(true)
    }

    async fn stop_discovery(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.stop_calls += 1;
        if state.fail_stop {
            return Err(Error::Transport {
                reason: "adapter busy".to_string(),
            });
        }
        Ok(())
    }

    async fn devices(&self) -> Result<Vec<FakeDevice>> {
        let listing = {
            let mut state = self.state.lock();
            state.scans += 1;
            let scans = state.scans;

            if state.hang_scans {
                None
            } else if scans <= state.failing_scans {
                Some(Err(Error::Transport {
                    reason: "adapter went away".to_string(),
                }))
            } else {
                Some(Ok(state
                    .devices
                    .iter()
                    .filter(|(_, hidden_for)| scans > *hidden_for)
                    .map(|(device, _)| device.clone())
                    .collect()))
            }
        };

        match listing {
            Some(result) => result,
            None => futures::future::pending().await,
        }
    }
}

#[derive(Debug)]
struct DeviceState {
    services: Vec<FakeService>,
    /// Number of listings that return an empty service table.
    services_hidden_for: u32,
    listings: u32,
    refuse_connect: bool,
    hang_connect: bool,
    connected: bool,
    disconnect_calls: u32,
}

/// Fake peripheral. Clones share state.
#[derive(Debug, Clone)]
pub(crate) struct FakeDevice {
    address: String,
    state: Arc<Mutex<DeviceState>>,
}

impl FakeDevice {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            state: Arc::new(Mutex::new(DeviceState {
                services: Vec::new(),
                services_hidden_for: 0,
                listings: 0,
                refuse_connect: false,
                hang_connect: false,
                connected: false,
                disconnect_calls: 0,
            })),
        }
    }

    pub fn with_service(self, service: FakeService) -> Self {
        self.state.lock().services.push(service);
        self
    }

    /// Return an empty service table for the first `listings` calls.
    pub fn services_hidden_for(self, listings: u32) -> Self {
        self.state.lock().services_hidden_for = listings;
        self
    }

    pub fn refuse_connect(self) -> Self {
        self.state.lock().refuse_connect = true;
        self
    }

    /// Make `connect` block forever.
    pub fn hang_connect(self) -> Self {
        self.state.lock().hang_connect = true;
        self
    }

    pub fn connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn listings(&self) -> u32 {
        self.state.lock().listings
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.state.lock().disconnect_calls
    }
}

#[async_trait]
impl GattDevice for FakeDevice {
    type Service = FakeService;

    fn address(&self) -> String {
        self.address.clone()
    }

    async fn name(&self) -> Option<String> {
        Some("ThermoBeacon".to_string())
    }

    async fn is_connected(&self) -> bool {
        self.connected()
    }

    async fn connect(&self) -> Result<bool> {
        let outcome = {
            let mut state = self.state.lock();
            if state.hang_connect {
                None
            } else if state.refuse_connect {
                Some(false)
            } else {
                state.connected = true;
                Some(true)
            }
        };

        match outcome {
            Some(connected) => Ok(connected),
            None => futures::future::pending().await,
        }
    }

    async fn disconnect(&self) -> Result<bool> {
        let mut state = self.state.lock();
        state.disconnect_calls += 1;
        let was_connected = state.connected;
        state.connected = false;
        Ok(was_connected)
    }

    async fn services(&self) -> Result<Vec<FakeService>> {
        let mut state = self.state.lock();
        state.listings += 1;
        if state.listings <= state.services_hidden_for {
            return Ok(Vec::new());
        }
        Ok(state.services.clone())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FakeService {
    uuid: Uuid,
    characteristics: Vec<FakeCharacteristic>,
}

impl FakeService {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            characteristics: Vec::new(),
        }
    }

    pub fn with_characteristic(mut self, characteristic: FakeCharacteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }
}

impl GattService for FakeService {
    type Characteristic = FakeCharacteristic;

    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn characteristics(&self) -> Vec<FakeCharacteristic> {
        self.characteristics.clone()
    }
}

#[derive(Debug, Default)]
struct CharacteristicState {
    writes: Vec<Vec<u8>>,
    responses: VecDeque<Result<Vec<u8>>>,
    hang_reads: bool,
}

/// Fake characteristic with scripted reads. Clones share state.
#[derive(Debug, Clone)]
pub(crate) struct FakeCharacteristic {
    uuid: Uuid,
    state: Arc<Mutex<CharacteristicState>>,
}

impl FakeCharacteristic {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            state: Arc::new(Mutex::new(CharacteristicState::default())),
        }
    }

    pub fn push_response(&self, data: Vec<u8>) {
        self.state.lock().responses.push_back(Ok(data));
    }

    pub fn push_error(&self, reason: &str) {
        self.state.lock().responses.push_back(Err(Error::Transport {
            reason: reason.to_string(),
        }));
    }

    /// Make every subsequent read block forever.
    pub fn hang_reads(&self) {
        self.state.lock().hang_reads = true;
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().writes.clone()
    }
}

#[async_trait]
impl GattCharacteristic for FakeCharacteristic {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        self.state.lock().writes.push(data.to_vec());
        Ok(())
    }

    async fn read(&self) -> Result<Vec<u8>> {
        let next = {
            let mut state = self.state.lock();
            if state.hang_reads {
                None
            } else {
                Some(state.responses.pop_front().unwrap_or_else(|| {
                    Err(Error::Transport {
                        reason: "no scripted response".to_string(),
                    })
                }))
            }
        };

        match next {
            Some(result) => result,
            None => futures::future::pending().await,
        }
    }
}

/// A ThermoBeacon with the standard profile, visible on the first scan.
pub(crate) struct FakeBeacon {
    pub transport: FakeTransport,
    pub device: FakeDevice,
    pub rx: FakeCharacteristic,
    pub tx: FakeCharacteristic,
}

pub(crate) const BEACON_ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

impl FakeBeacon {
    pub fn new() -> Self {
        let rx = FakeCharacteristic::new(THERMOBEACON_RX_UUID);
        let tx = FakeCharacteristic::new(THERMOBEACON_TX_UUID);
        let device = FakeDevice::new(BEACON_ADDRESS).with_service(
            FakeService::new(THERMOBEACON_SERVICE_UUID)
                .with_characteristic(rx.clone())
                .with_characteristic(tx.clone()),
        );

        let transport = FakeTransport::new();
        transport.add_device(FakeDevice::new("11:22:33:44:55:66"), 0);
        transport.add_device(device.clone(), 0);

        Self {
            transport,
            device,
            rx,
            tx,
        }
    }
}
