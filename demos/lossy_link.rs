//! Example: Watching the retry policy absorb a bad link
//!
//! Run with: RUST_LOG=etherio=debug cargo run --example lossy_link
//!
//! No hardware needed; the module is emulated in memory. This example
//! demonstrates:
//! - Scripting faults on a simulated link
//! - How lost replies, corrupted read-backs and lost writes are retried
//! - Telling a dead device apart from one that ignores writes
//! - Reading and clearing statistics

use std::time::Duration;

use etherio::sim::SimTransport;
use etherio::{Device, DeviceKind, EioError, PortId, ReliabilityConfig};
use tracing_subscriber::EnvFilter;

fn main() -> etherio::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ReliabilityConfig::default()
        .with_retries(3)
        .with_retry_delay(Duration::from_millis(1));
    let mut dev = Device::with_transport(DeviceKind::Io24T, SimTransport::new(DeviceKind::Io24T), config);

    // =========================================================================
    // Transient faults are absorbed
    // =========================================================================

    println!("=== Lost replies ===");
    dev.transport_mut().drop_replies(2);
    let value = dev.port(PortId::A)?.get_val()?;
    println!("read 0x{:02X}: {}\n", value, dev.stats());
    dev.stats_clear();

    println!("=== Corrupted read-backs ===");
    dev.transport_mut().corrupt_replies(2);
    dev.port(PortId::B)?.set_val(0xA5)?;
    println!("write applied: {}\n", dev.stats());
    dev.stats_clear();

    println!("=== One lost write ===");
    dev.transport_mut().lose_writes(1);
    dev.port(PortId::C)?.set_val(0x3C)?;
    println!("write applied: {}\n", dev.stats());
    dev.stats_clear();

    // =========================================================================
    // Persistent faults surface as distinct errors
    // =========================================================================

    println!("=== Device ignores writes ===");
    dev.transport_mut().lose_writes(u32::MAX);
    match dev.port(PortId::A)?.set_val(0xFF) {
        Err(EioError::VerifyFailed { expected, actual, attempts }) => println!(
            "gave up after {} attempts: wrote 0x{:02X}, device holds 0x{:02X}",
            attempts, expected, actual
        ),
        other => println!("unexpected: {:?}", other),
    }
    dev.transport_mut().lose_writes(0);

    println!("\n=== Device unplugged ===");
    dev.transport_mut().set_unresponsive(true);
    match dev.port(PortId::A)?.get_val() {
        Err(e) if e.is_timeout() => println!("{}", e),
        other => println!("unexpected: {:?}", other),
    }

    println!("\n{}", dev.stats());
    Ok(())
}
