// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # thermobeacon-ble
//!
//! A Rust library for reading ThermoBeacon temperature/humidity loggers
//! over Bluetooth Low Energy.
//!
//! The device keeps a ring of logged samples and answers a simple
//! write-then-read protocol on two characteristics of service `ffe0`:
//! a count query returns how many samples are stored, and an indexed
//! sample query returns the fixed-point values at that index.
//!
//! ## Features
//!
//! - **Discovery**: Find a device by hardware address, with retries
//! - **Resolution**: Connect and bind the command/response characteristic pair
//! - **Polling**: Fetch and decode the newest sample on a fixed interval
//! - **Cancellation**: Every wait is interruptible for prompt shutdown
//! - **Pluggable transport**: btleplug by default, any [`ble::Transport`] impl otherwise
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use thermobeacon_ble::{
//!     BtleplugTransport, CancellationSignal, GattProfile, Poller, Resolver, Result, Sample,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let signal = CancellationSignal::new();
//!
//!     let transport = BtleplugTransport::new().await?;
//!     let resolver = Resolver::new(transport, signal.clone());
//!     let session = resolver
//!         .build_session("AA:BB:CC:DD:EE:FF", &GattProfile::thermobeacon())
//!         .await?;
//!
//!     let poller = Poller::new(session, signal);
//!     let print = |sample: &Sample| println!("{:04}: {}", sample.index, sample.reading);
//!     poller.run(&print).await;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### macOS
//! Requires Bluetooth permission. CoreBluetooth hides hardware addresses,
//! so matching by address does not work there.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod cancel;
pub mod error;
pub mod poller;
pub mod protocol;

// Re-exports for convenience
pub use ble::adapter::BtleplugTransport;
pub use ble::resolver::{Resolver, ResolverConfig, ResolverState};
pub use ble::session::Session;
pub use ble::uuids::GattProfile;
pub use cancel::CancellationSignal;
pub use error::{Error, Result};
pub use poller::{CycleOutcome, PollSummary, Poller, PollerConfig, ReadingSink, Sample};
pub use protocol::{Centi, CommandFrame, Reading, ResponseFrame};
