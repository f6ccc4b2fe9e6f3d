//! Device discovery and session resolution.
//!
//! Drives a [`Transport`] from "nothing known" to a bound [`Session`]:
//!
//! ```text
//! Idle -> Discovering -> DeviceFound -> ServiceSearching -> ServiceFound
//!      -> CharacteristicsResolved -> Connected
//! ```
//!
//! Any step may end in `Failed`, or in `Cancelled` when the shared
//! [`CancellationSignal`] is raised.

use futures::future::join_all;
use parking_lot::RwLock;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ble::session::Session;
use crate::ble::transport::{
    CharacteristicOf, GattCharacteristic, GattDevice, GattService, Transport,
};
use crate::ble::uuids::GattProfile;
use crate::cancel::CancellationSignal;
use crate::error::{Error, Result};

/// Resolution progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResolverState {
    /// Nothing started yet.
    #[default]
    Idle,
    /// Scanning for the target device.
    Discovering,
    /// Target device seen in the device list.
    DeviceFound,
    /// Connected, waiting for the service table.
    ServiceSearching,
    /// Target service located.
    ServiceFound,
    /// Both characteristics located.
    CharacteristicsResolved,
    /// Session bound and ready.
    Connected,
    /// Resolution failed.
    Failed,
    /// Resolution was cancelled.
    Cancelled,
}

impl ResolverState {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Connected | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for ResolverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Discovering => write!(f, "Discovering"),
            Self::DeviceFound => write!(f, "DeviceFound"),
            Self::ServiceSearching => write!(f, "ServiceSearching"),
            Self::ServiceFound => write!(f, "ServiceFound"),
            Self::CharacteristicsResolved => write!(f, "CharacteristicsResolved"),
            Self::Connected => write!(f, "Connected"),
            Self::Failed => write!(f, "Failed"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Retry parameters for resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Number of device-list scans before giving up.
    pub max_attempts: u32,
    /// Wait between device-list scans.
    pub attempt_interval: Duration,
    /// Wait between service-table listings while the table is empty.
    pub service_poll_interval: Duration,
}

impl ResolverConfig {
    /// Default number of device-list scans.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 15;
    /// Default wait between scans and between service listings (4 seconds).
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(4);

    /// Set the number of device-list scans.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the wait between device-list scans.
    pub fn with_attempt_interval(mut self, interval: Duration) -> Self {
        self.attempt_interval = interval;
        self
    }

    /// Set the wait between service-table listings.
    pub fn with_service_poll_interval(mut self, interval: Duration) -> Self {
        self.service_poll_interval = interval;
        self
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            attempt_interval: Self::DEFAULT_INTERVAL,
            service_poll_interval: Self::DEFAULT_INTERVAL,
        }
    }
}

/// Finds a device and binds a [`Session`] to it.
pub struct Resolver<T: Transport> {
    transport: T,
    config: ResolverConfig,
    signal: CancellationSignal,
    state: RwLock<ResolverState>,
}

impl<T: Transport> Resolver<T> {
    /// Create a resolver with the default retry parameters.
    pub fn new(transport: T, signal: CancellationSignal) -> Self {
        Self::with_config(transport, ResolverConfig::default(), signal)
    }

    /// Create a resolver with custom retry parameters.
    pub fn with_config(transport: T, config: ResolverConfig, signal: CancellationSignal) -> Self {
        Self {
            transport,
            config,
            signal,
            state: RwLock::new(ResolverState::Idle),
        }
    }

    /// Get the current state.
    pub fn state(&self) -> ResolverState {
        *self.state.read()
    }

    /// Get the retry parameters.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Get the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Scan for the device with the given address.
    ///
    /// Starts discovery, then lists the adapter's devices up to
    /// `max_attempts` times, `attempt_interval` apart. Discovery is stopped
    /// before returning, whatever the outcome; a failure to stop is only logged.
    ///
    /// # Errors
    ///
    /// - [`Error::DeviceNotFound`] once every scan has come up empty
    /// - [`Error::Cancelled`] if the signal is raised
    pub async fn discover_device(&self, address: &str) -> Result<T::Device> {
        if let Err(e) = self.signal.check() {
            return Err(self.fail(e));
        }

        self.set_state(ResolverState::Discovering);
        let target = self.transport.canonical_address(address);

        match self.cancellable(self.transport.start_discovery()).await {
            Ok(Ok(started)) => info!("The discovery started: {}", started),
            Ok(Err(e)) => warn!("Failed to start discovery: {}", e),
            Err(e) => {
                self.stop_discovery().await;
                return Err(self.fail(e));
            }
        }

        let result = self.scan_for(&target).await;
        self.stop_discovery().await;

        match result {
            Ok(device) => {
                self.set_state(ResolverState::DeviceFound);
                Ok(device)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Connect to a discovered device.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectFailed`] if the device refuses or the transport
    ///   reports an error
    /// - [`Error::Cancelled`] if the signal is raised before the connect
    ///   completes
    pub async fn connect(&self, device: &T::Device) -> Result<()> {
        let address = device.address();

        let connected = match self.cancellable(device.connect()).await {
            Ok(connected) => connected,
            Err(e) => return Err(self.fail(e)),
        };

        match connected {
            Ok(true) => {
                info!("Sensor with the provided address connected: {}", address);
                Ok(())
            }
            Ok(false) => Err(self.fail(Error::ConnectFailed {
                address,
                reason: "device refused the connection".to_string(),
            })),
            Err(e) => Err(self.fail(Error::ConnectFailed {
                address,
                reason: e.to_string(),
            })),
        }
    }

    /// Locate a service on a connected device.
    ///
    /// The service table may still be filling in after connect, so while the
    /// device reports no services at all this keeps listing them every
    /// `service_poll_interval`. The first non-empty table is scanned exactly
    /// once; a table without the target service is not retried.
    ///
    /// # Errors
    ///
    /// - [`Error::ServiceNotFound`] if a non-empty table lacks the service
    /// - [`Error::Cancelled`] if the signal is raised while waiting
    pub async fn resolve_service(
        &self,
        device: &T::Device,
        uuid: Uuid,
    ) -> Result<<T::Device as GattDevice>::Service> {
        self.set_state(ResolverState::ServiceSearching);

        let result = self.await_service(device, uuid).await;

        match result {
            Ok(service) => {
                info!("Found service {}", service.uuid());
                self.set_state(ResolverState::ServiceFound);
                Ok(service)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Find a characteristic in a resolved service.
    ///
    /// Single pass, no retry. Returns `None` if the service does not have it.
    pub fn resolve_characteristic(
        &self,
        service: &<T::Device as GattDevice>::Service,
        uuid: Uuid,
    ) -> Option<CharacteristicOf<T::Device>> {
        service
            .characteristics()
            .into_iter()
            .find(|characteristic| characteristic.uuid() == uuid)
    }

    /// Discover, connect and bind a session for `profile`.
    ///
    /// If anything fails after the device is connected, the device is
    /// disconnected (best effort) before the error is returned.
    ///
    /// # Errors
    ///
    /// Any error from [`discover_device`](Self::discover_device),
    /// [`connect`](Self::connect) or [`resolve_service`](Self::resolve_service),
    /// or [`Error::CharacteristicsNotFound`] if rx or tx is missing.
    pub async fn build_session(
        &self,
        address: &str,
        profile: &GattProfile,
    ) -> Result<Session<T::Device>> {
        let device = self.discover_device(address).await?;
        info!("Found device: {}", device.address());

        self.connect(&device).await?;

        match self.bind(&device, profile).await {
            Ok((tx, rx)) => {
                self.set_state(ResolverState::Connected);
                Ok(Session::new(device, tx, rx))
            }
            Err(e) => {
                match device.disconnect().await {
                    Ok(_) => debug!("Disconnected {} after failed resolution", device.address()),
                    Err(disconnect_err) => {
                        warn!("Failed to disconnect {}: {}", device.address(), disconnect_err)
                    }
                }
                Err(self.fail(e))
            }
        }
    }

    async fn bind(
        &self,
        device: &T::Device,
        profile: &GattProfile,
    ) -> Result<(CharacteristicOf<T::Device>, CharacteristicOf<T::Device>)> {
        let service = self.resolve_service(device, profile.service).await?;

        let rx = self.resolve_characteristic(&service, profile.rx);
        let tx = self.resolve_characteristic(&service, profile.tx);

        match (tx, rx) {
            (Some(tx), Some(rx)) => {
                info!("Found the temperature characteristics");
                self.set_state(ResolverState::CharacteristicsResolved);
                Ok((tx, rx))
            }
            (tx, rx) => Err(Error::CharacteristicsNotFound {
                rx_found: rx.is_some(),
                tx_found: tx.is_some(),
            }),
        }
    }

    async fn scan_for(&self, target: &str) -> Result<T::Device> {
        let max_attempts = self.config.max_attempts;

        for attempt in 1..=max_attempts {
            self.signal.check()?;

            match self.cancellable(self.transport.devices()).await? {
                Ok(devices) => {
                    log_devices(&devices).await;

                    if let Some(device) = devices.into_iter().find(|d| d.address() == target) {
                        return Ok(device);
                    }
                }
                Err(e) => warn!("Device enumeration failed on attempt {}: {}", attempt, e),
            }

            debug!(
                "Device {} not seen yet (attempt {} of {})",
                target, attempt, max_attempts
            );

            if attempt < max_attempts {
                self.signal.wait(self.config.attempt_interval).await?;
            }
        }

        Err(Error::DeviceNotFound {
            address: target.to_string(),
            attempts: max_attempts,
        })
    }

    async fn await_service(
        &self,
        device: &T::Device,
        uuid: Uuid,
    ) -> Result<<T::Device as GattDevice>::Service> {
        loop {
            self.signal.check()?;

            let services = self.cancellable(device.services()).await??;

            if !services.is_empty() {
                for service in &services {
                    debug!("Service UUID: {}", service.uuid());
                }

                return services
                    .into_iter()
                    .find(|service| service.uuid() == uuid)
                    .ok_or(Error::ServiceNotFound {
                        uuid: uuid.to_string(),
                    });
            }

            debug!("No services reported yet by {}", device.address());
            self.signal.wait(self.config.service_poll_interval).await?;
        }
    }

    /// Run a transport call, abandoning it if the signal is raised first.
    async fn cancellable<F: Future>(&self, call: F) -> Result<F::Output> {
        self.signal.check()?;

        tokio::select! {
            _ = self.signal.cancelled() => Err(Error::Cancelled),
            output = call => Ok(output),
        }
    }

    async fn stop_discovery(&self) {
        if let Err(e) = self.transport.stop_discovery().await {
            warn!("Discovery could not be stopped: {}", e);
        }
    }

    /// Record a failure and hand the error back.
    fn fail(&self, error: Error) -> Error {
        if error.is_cancelled() {
            self.set_state(ResolverState::Cancelled);
        } else {
            self.set_state(ResolverState::Failed);
        }
        error
    }

    fn set_state(&self, new_state: ResolverState) {
        let old_state = std::mem::replace(&mut *self.state.write(), new_state);

        if old_state != new_state {
            debug!("Resolver state changed: {} -> {}", old_state, new_state);
        }
    }
}

async fn log_devices<D: GattDevice>(devices: &[D]) {
    let details = join_all(
        devices
            .iter()
            .map(|device| async move { (device.name().await, device.is_connected().await) }),
    )
    .await;

    for (device, (name, connected)) in devices.iter().zip(details) {
        debug!(
            "Address = {} Name = {} Connected = {}",
            device.address(),
            name.as_deref().unwrap_or("<unknown>"),
            connected
        );
    }
}
