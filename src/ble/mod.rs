//! BLE communication module.
//!
//! This module provides the transport abstraction, its btleplug-backed
//! implementation, and the resolver that turns a device address into a
//! bound command/response session.

pub mod adapter;
pub mod resolver;
pub mod session;
pub mod transport;
pub mod uuids;

#[cfg(test)]
pub(crate) mod fake;

pub use adapter::{BtleplugCharacteristic, BtleplugDevice, BtleplugService, BtleplugTransport};
pub use resolver::{Resolver, ResolverConfig, ResolverState};
pub use session::Session;
pub use transport::{CharacteristicOf, GattCharacteristic, GattDevice, GattService, Transport};
pub use uuids::*;
