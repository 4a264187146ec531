//! Example: Walking a lit bit across every port of a real module
//!
//! Run with: cargo run --example port_walk -- [address] [kind]
//!
//! `address` defaults to the factory address 10.10.10.10:2424 and `kind` to
//! IO24T. Set `RUST_LOG=etherio=debug` to watch retries.
//!
//! This example demonstrates:
//! - Opening a device from an address string
//! - Identifying the module
//! - Configuring directions and driving outputs
//! - Reading the statistics afterwards

use std::thread;
use std::time::Duration;

use etherio::utils::format_binary;
use etherio::{Device, DeviceConfig, DeviceKind, DIR_ALL_OUTPUT};
use tracing_subscriber::EnvFilter;

fn main() -> etherio::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_default();
    let kind: DeviceKind = args.next().as_deref().unwrap_or("IO24T").parse()?;

    // =========================================================================
    // Connect
    // =========================================================================

    let config = DeviceConfig::parse(&addr, kind)?
        .with_timeout(Duration::from_millis(200))
        .with_retries(5);
    println!("Connecting to {} at {}", kind, config.addr);
    let mut dev = Device::connect(config)?;

    let info = dev.identify()?;
    println!("Found {}\n", info);

    // =========================================================================
    // Walk
    // =========================================================================

    for &id in dev.ports() {
        let mut port = dev.port(id)?;
        port.set_dir(DIR_ALL_OUTPUT)?;
        for bit in 0..8 {
            let value = 1u8 << bit;
            port.set_val(value)?;
            println!("{}: {}", id, format_binary(port.get_val()?));
            thread::sleep(Duration::from_millis(100));
        }
        port.set_val(0)?;
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    println!("\n{}", dev.stats());
    Ok(())
}
