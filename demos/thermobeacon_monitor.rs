//! ThermoBeacon monitor example
//!
//! Connects to the ThermoBeacon with the given address and prints its newest
//! logged sample every second until Ctrl+C.
//!
//! Run with: cargo run --example thermobeacon_monitor -- <device_address>

use thermobeacon_ble::{
    BtleplugTransport, CancellationSignal, GattProfile, Poller, ReadingSink, ResponseFrame,
    Result, Resolver, Sample,
};
use tracing_subscriber::EnvFilter;

struct ConsoleSink;

impl ReadingSink for ConsoleSink {
    fn on_sample(&self, sample: &Sample) {
        let slots: Vec<String> = sample.slots.iter().map(|v| v.to_string()).collect();
        println!("{:04}: {}", sample.index, slots.join(", "));
        println!(
            "Temperature: {}°C  Humidity: {}%",
            sample.reading.temperature, sample.reading.humidity
        );
    }

    fn on_frame(&self, frame: &ResponseFrame) {
        println!("{}", frame);
    }

    fn on_status(&self, status: &str) {
        println!("{}", status);
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let Some(address) = std::env::args().nth(1) else {
        eprintln!("Run with <device_address> argument");
        std::process::exit(1);
    };

    if let Err(e) = run(&address).await {
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(address: &str) -> Result<()> {
    let signal = CancellationSignal::new();

    let ctrl_c = signal.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nExiting...");
            ctrl_c.cancel();
        }
    });

    println!("Looking for {}...", address);

    let transport = BtleplugTransport::new().await?;
    let resolver = Resolver::new(transport, signal.clone());
    let session = resolver
        .build_session(address, &GattProfile::thermobeacon())
        .await?;

    println!("Connected to {}. Press Ctrl+C to exit.\n", session.address());

    let poller = Poller::new(session, signal);
    let summary = poller.run(&ConsoleSink).await;

    println!("{}", summary);

    Ok(())
}
