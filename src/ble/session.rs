//! A bound command/response session.

use tracing::{trace, warn};

use crate::ble::transport::{CharacteristicOf, GattCharacteristic, GattDevice};
use crate::error::Result;
use crate::protocol::{CommandFrame, ResponseFrame};

/// A connected device with its tx/rx characteristic pair resolved.
///
/// Only the [`Resolver`](crate::ble::Resolver) creates sessions, and it always
/// takes both characteristics from the same service instance. A session
/// stays valid until the device disconnects.
pub struct Session<D: GattDevice> {
    address: String,
    device: D,
    tx: CharacteristicOf<D>,
    rx: CharacteristicOf<D>,
}

impl<D: GattDevice> Session<D> {
    pub(crate) fn new(device: D, tx: CharacteristicOf<D>, rx: CharacteristicOf<D>) -> Self {
        Self {
            address: device.address(),
            device,
            tx,
            rx,
        }
    }

    /// Address of the bound device.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The bound device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The characteristic commands are written to.
    pub fn tx(&self) -> &CharacteristicOf<D> {
        &self.tx
    }

    /// The characteristic responses are read from.
    pub fn rx(&self) -> &CharacteristicOf<D> {
        &self.rx
    }

    /// Write a command to tx, then read the response from rx.
    pub async fn exchange(&self, command: &CommandFrame) -> Result<ResponseFrame> {
        trace!("-> {}", command);
        self.tx.write(command.as_bytes()).await?;

        let response = ResponseFrame::from(self.rx.read().await?);
        trace!("<- {}", response);

        Ok(response)
    }

    /// Disconnect the device.
    pub async fn disconnect(&self) -> Result<()> {
        if !self.device.disconnect().await? {
            warn!("{} was already disconnected", self.address);
        }
        Ok(())
    }
}

impl<D: GattDevice> std::fmt::Debug for Session<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.address)
            .field("tx", &self.tx.uuid())
            .field("rx", &self.rx.uuid())
            .finish()
    }
}
