//! # Elexol Ether IO Library
//!
//! A Rust library for reliable register access on Elexol Ether IO24 and IO72
//! digital IO modules over UDP.
//!
//! The modules speak a tiny unacknowledged datagram protocol: a read gets one
//! reply, a write gets none, and nothing carries a request identifier. This
//! library turns that into register access you can rely on by retrying lost
//! exchanges and reading back every write until it sticks.
//!
//! ## Features
//!
//! - **Write-verify-retry** - every register write is read back and re-sent
//!   until it matches or the retry budget runs out
//! - **Per-device policy** - retries, delays, timeouts and validation are
//!   configured per [`Device`], never globally
//! - **Distinct failures** - "device unreachable" ([`EioError::TimedOut`]) and
//!   "device not applying the write" ([`EioError::VerifyFailed`]) are separate
//!   errors
//! - **Statistics** - sends, retries, timeouts and verify failures per device
//! - **No I/O on bad arguments** - ports, lines and registers are checked
//!   against the [`DeviceKind`] first
//! - **Offline testing** - the [`sim`] module emulates a device with
//!   scripted faults
//!
//! ## Quick Start
//!
//! ```no_run
//! use etherio::{Device, DeviceConfig, DeviceKind, PortId, DIR_ALL_OUTPUT};
//! use std::net::Ipv4Addr;
//!
//! fn main() -> etherio::Result<()> {
//!     // Factory default address of a fresh module
//!     let config = DeviceConfig::new(Ipv4Addr::new(10, 10, 10, 10), DeviceKind::Io24T);
//!     let mut dev = Device::connect(config)?;
//!
//!     // Make port A all outputs and drive a pattern
//!     let mut port = dev.port(PortId::A)?;
//!     port.set_dir(DIR_ALL_OUTPUT)?;
//!     port.set_val(0b1010_0101)?;
//!
//!     // Port B as inputs
//!     let inputs = dev.port(PortId::B)?.get_val()?;
//!     println!("port B = 0x{:02X}", inputs);
//!
//!     println!("{}", dev.stats());
//!     Ok(())
//! }
//! ```
//!
//! ## Device Variants
//!
//! | Variant | Ports | Lines | Extra registers |
//! |---------|-------|-------|-----------------|
//! | [`DeviceKind::Io24R`] | A-C | 24 | threshold, schmitt trigger |
//! | [`DeviceKind::Io24T`] | A-C | 24 | |
//! | [`DeviceKind::Io72T`] | A-I | 72 | |
//!
//! Every port has value, direction and pull-up registers. A direction bit of
//! 1 makes the line an input.
//!
//! ## Core Operations
//!
//! ### Ports and Lines
//!
//! ```
//! # use etherio::sim::SimTransport;
//! # use etherio::{Device, DeviceKind, PortId, ReliabilityConfig};
//! use etherio::utils::Level;
//!
//! # let sim = SimTransport::new(DeviceKind::Io24T);
//! # let mut dev = Device::with_transport(DeviceKind::Io24T, sim, ReliabilityConfig::default());
//! dev.port_by_name("portc")?.set_val(0x0F)?;
//! dev.write_line(0, Level::High)?;
//! assert!(dev.read_line(0)?);
//! assert_eq!(dev.port(PortId::C)?.get_val()?, 0x0F);
//! # Ok::<(), etherio::EioError>(())
//! ```
//!
//! ### EEPROM
//!
//! ```no_run
//! # use etherio::{Device, DeviceConfig, DeviceKind};
//! # use std::net::Ipv4Addr;
//! # let mut dev = Device::connect(DeviceConfig::new(Ipv4Addr::new(10, 10, 10, 10), DeviceKind::Io24T))?;
//! let mut eeprom = dev.eeprom();
//! println!("stored address {}", eeprom.ipaddr()?);
//! eeprom.set_ipaddr(Ipv4Addr::new(192, 168, 1, 20))?;
//! eeprom.set_ipmask(Ipv4Addr::new(255, 255, 255, 0))?;
//! # Ok::<(), etherio::EioError>(())
//! ```
//!
//! ### Housekeeping
//!
//! ```no_run
//! # use etherio::{Device, DeviceConfig, DeviceKind};
//! # use std::net::Ipv4Addr;
//! # let mut dev = Device::connect(DeviceConfig::new(Ipv4Addr::new(10, 10, 10, 10), DeviceKind::Io24T))?;
//! let info = dev.identify()?;
//! println!("{}", info);
//!
//! dev.reset()?;
//! dev.stats_clear();
//! # Ok::<(), etherio::EioError>(())
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, EioError>`]. Transient faults (a lost
//! reply, a garbled frame, a mismatched read-back) are absorbed as retries;
//! only an exhausted budget or a socket error reaches the caller.
//!
//! ```no_run
//! use etherio::{Device, DeviceConfig, DeviceKind, EioError, PortId};
//! use std::net::Ipv4Addr;
//!
//! let config = DeviceConfig::new(Ipv4Addr::new(10, 10, 10, 10), DeviceKind::Io24T);
//! let mut dev = Device::connect(config)?;
//!
//! match dev.port(PortId::A)?.set_val(0xFF) {
//!     Ok(()) => println!("applied"),
//!     Err(EioError::TimedOut { attempts }) => println!("no answer after {} attempts", attempts),
//!     Err(EioError::VerifyFailed { expected, actual, .. }) => {
//!         println!("wrote 0x{:02X}, device holds 0x{:02X}", expected, actual);
//!     }
//!     Err(e) => println!("error: {}", e),
//! }
//! # Ok::<(), EioError>(())
//! ```
//!
//! ## Configuration
//!
//! ```
//! use etherio::{DeviceConfig, DeviceKind};
//! use std::net::Ipv4Addr;
//! use std::time::Duration;
//!
//! let config = DeviceConfig::new(Ipv4Addr::new(192, 168, 1, 20), DeviceKind::Io72T)
//!     .with_port(2424)                               // UDP port (default: 2424)
//!     .with_timeout(Duration::from_millis(250))      // per reply (default: 1s)
//!     .with_retries(3)                               // after the first try (default: 10)
//!     .with_retry_delay(Duration::from_millis(20))   // between tries (default: 10ms)
//!     .with_write_validate(true);                    // read back writes (default: on)
//! ```
//!
//! ## Usage Contract
//!
//! Every call blocks for its whole attempt sequence, at most
//! `attempts × (timeout + retry_delay)`. Replies are matched to requests by
//! order alone, so a device must never have two operations in flight. All
//! methods take `&mut self`, which enforces this within a thread; share a
//! device between threads only behind a `Mutex`.
//!
//! ## Logging
//!
//! The library logs through [`tracing`]: frames at `trace`, retries at
//! `debug`, exhausted budgets and socket errors at `warn`. Install any
//! subscriber to see them.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod client;
mod command;
mod eeprom;
mod error;
mod kind;
mod port;
mod register;
mod reliability;
mod response;
pub mod sim;
mod stats;
mod transport;
pub mod utils;

// Public re-exports
pub use client::{Device, DeviceConfig};
pub use command::{Command, EepromField, EEPROM_WORDS, SETTLE_TIME};
pub use eeprom::Eeprom;
pub use error::{EioError, Result};
pub use kind::DeviceKind;
pub use port::Port;
pub use register::{PortId, Register, DIR_ALL_INPUT, DIR_ALL_OUTPUT};
pub use reliability::{
    Controller, ReliabilityConfig, DEFAULT_RETRIES, DEFAULT_RETRY_DELAY, DEFAULT_TIMEOUT,
};
pub use response::{
    decode_echo, decode_eeprom_word, decode_identify, decode_register, DeviceInfo, EepromReply,
    RegisterReply, EEPROM_REPLY_SIZE, MIN_IDENTIFY_SIZE,
};
pub use stats::{StatEvent, Stats, StatsRecord};
pub use transport::{
    TcpTransport, Transport, UdpTransport, DEFAULT_DEVICE_IP, DEFAULT_UDP_PORT, MAX_PACKET_SIZE,
};
pub use utils::Level;
