//! High-level device handle.
//!
//! This module provides [`Device`], the primary interface for talking to an
//! Ether IO module, and [`DeviceConfig`], the builder used to open one.
//!
//! # Overview
//!
//! A device owns:
//! - one [`Transport`] (a UDP socket by default)
//! - one retry/verify [`Controller`] with its own [`ReliabilityConfig`]
//! - one statistics collector
//!
//! Port and EEPROM access goes through short-lived [`Port`] and [`Eeprom`]
//! handles borrowed from the device. Port names, line numbers and registers
//! are checked against the [`DeviceKind`] before anything is sent, so a bad
//! argument never costs a round trip.
//!
//! # Example
//!
//! ```no_run
//! use etherio::{Device, DeviceConfig, DeviceKind, PortId, DIR_ALL_OUTPUT};
//! use std::net::Ipv4Addr;
//!
//! let config = DeviceConfig::new(Ipv4Addr::new(192, 168, 1, 20), DeviceKind::Io24T);
//! let mut dev = Device::connect(config)?;
//!
//! dev.reset()?;
//! let mut port = dev.port(PortId::A)?;
//! port.set_dir(DIR_ALL_OUTPUT)?;
//! port.set_val(0x55)?;
//!
//! println!("{}", dev.stats());
//! # Ok::<(), etherio::EioError>(())
//! ```
//!
//! # Thread Safety
//!
//! A `Device` has exactly one operation in flight at a time and matches
//! replies to requests by order alone. All methods take `&mut self`; to
//! share a device between threads put it behind a `Mutex`.

use std::net::{Ipv4Addr, SocketAddr};
use std::thread;
use std::time::Duration;

use tracing::info;

use crate::command::{Command, SETTLE_TIME};
use crate::eeprom::Eeprom;
use crate::error::{EioError, Result};
use crate::kind::DeviceKind;
use crate::port::Port;
use crate::register::PortId;
use crate::reliability::{Controller, ReliabilityConfig};
use crate::response::{decode_identify, DeviceInfo};
use crate::stats::StatsRecord;
use crate::transport::{Transport, UdpTransport, DEFAULT_UDP_PORT};
use crate::utils::{line_to_port, parse_device_addr, Level};

/// Configuration for opening a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Device IP address and UDP port.
    pub addr: SocketAddr,
    /// Hardware variant.
    pub kind: DeviceKind,
    /// Retry and verify policy.
    pub reliability: ReliabilityConfig,
}

impl DeviceConfig {
    /// Creates a configuration with the default port and reliability policy.
    ///
    /// # Example
    ///
    /// ```
    /// use etherio::{DeviceConfig, DeviceKind};
    /// use std::net::Ipv4Addr;
    ///
    /// let config = DeviceConfig::new(Ipv4Addr::new(192, 168, 1, 20), DeviceKind::Io72T);
    /// assert_eq!(config.addr.port(), 2424);
    /// assert_eq!(config.reliability.retries, 10);
    /// ```
    pub fn new(ip: Ipv4Addr, kind: DeviceKind) -> Self {
        Self::from_addr(SocketAddr::from((ip, DEFAULT_UDP_PORT)), kind)
    }

    /// Creates a configuration for a full socket address.
    pub fn from_addr(addr: SocketAddr, kind: DeviceKind) -> Self {
        Self {
            addr,
            kind,
            reliability: ReliabilityConfig::default(),
        }
    }

    /// Creates a configuration from an address string.
    ///
    /// See [`parse_device_addr`] for the accepted forms.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if `addr` cannot be parsed.
    ///
    /// # Example
    ///
    /// ```
    /// use etherio::{DeviceConfig, DeviceKind};
    ///
    /// let config = DeviceConfig::parse("192.168.1.20:2525", DeviceKind::Io24R)?;
    /// assert_eq!(config.addr.port(), 2525);
    /// # Ok::<(), etherio::EioError>(())
    /// ```
    pub fn parse(addr: &str, kind: DeviceKind) -> Result<Self> {
        Ok(Self::from_addr(parse_device_addr(addr)?, kind))
    }

    /// Sets a custom UDP port (default is 2424).
    pub fn with_port(mut self, port: u16) -> Self {
        self.addr.set_port(port);
        self
    }

    /// Sets the reply timeout (default is 1 second).
    ///
    /// # Example
    ///
    /// ```
    /// use etherio::{DeviceConfig, DeviceKind};
    /// use std::net::Ipv4Addr;
    /// use std::time::Duration;
    ///
    /// let config = DeviceConfig::new(Ipv4Addr::new(192, 168, 1, 20), DeviceKind::Io24T)
    ///     .with_timeout(Duration::from_millis(100))
    ///     .with_retries(2);
    /// assert_eq!(config.reliability.attempts(), 3);
    /// ```
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.reliability.timeout = timeout;
        self
    }

    /// Sets the number of retries after the first attempt (default is 10).
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.reliability.retries = retries;
        self
    }

    /// Sets the pause between attempts (default is 10 ms).
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.reliability.retry_delay = retry_delay;
        self
    }

    /// Enables or disables write read-back (default is enabled).
    pub fn with_write_validate(mut self, write_validate: bool) -> Self {
        self.reliability.write_validate = write_validate;
        self
    }

    /// Replaces the whole reliability policy.
    pub fn with_reliability(mut self, reliability: ReliabilityConfig) -> Self {
        self.reliability = reliability;
        self
    }
}

/// Handle to one Ether IO module.
///
/// Every register access is a blocking network round trip that may take up
/// to [`ReliabilityConfig::worst_case`] before failing.
pub struct Device<T: Transport = UdpTransport> {
    kind: DeviceKind,
    link: Controller<T>,
}

impl Device<UdpTransport> {
    /// Opens a UDP session to the device.
    ///
    /// No datagram is sent; the first register access is the first contact.
    ///
    /// # Errors
    ///
    /// Returns a `Transport` error if the local socket cannot be created.
    pub fn connect(config: DeviceConfig) -> Result<Self> {
        let transport = UdpTransport::new(config.addr)?;
        info!(addr = %config.addr, kind = %config.kind, "device opened");
        Ok(Self::with_transport(config.kind, transport, config.reliability))
    }
}

impl<T: Transport> Device<T> {
    /// Builds a device over any transport.
    ///
    /// # Example
    ///
    /// ```
    /// use etherio::sim::SimTransport;
    /// use etherio::{Device, DeviceKind, ReliabilityConfig};
    ///
    /// let sim = SimTransport::new(DeviceKind::Io72T);
    /// let dev = Device::with_transport(DeviceKind::Io72T, sim, ReliabilityConfig::default());
    /// assert_eq!(dev.line_count(), 72);
    /// ```
    pub fn with_transport(kind: DeviceKind, transport: T, reliability: ReliabilityConfig) -> Self {
        Self {
            kind,
            link: Controller::new(transport, reliability),
        }
    }

    /// Returns the hardware variant.
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Returns the ports this variant has.
    pub fn ports(&self) -> &'static [PortId] {
        self.kind.ports()
    }

    /// Returns a handle to one port.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error, without any I/O, if the variant has
    /// no such port.
    pub fn port(&mut self, id: PortId) -> Result<Port<'_, T>> {
        self.kind.check_port(id)?;
        Ok(Port::new(&mut self.link, self.kind, id))
    }

    /// Returns a handle to a port given by name (`"a"`, `"portb"`, ...).
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error for unknown or missing ports.
    pub fn port_by_name(&mut self, name: &str) -> Result<Port<'_, T>> {
        let id = name.parse()?;
        self.port(id)
    }

    /// Returns a handle to a port given by index (0 = port A).
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error for indexes past the last port.
    pub fn port_index(&mut self, index: usize) -> Result<Port<'_, T>> {
        let id = PortId::from_index(index)?;
        self.port(id)
    }

    /// Returns a handle to the configuration EEPROM.
    pub fn eeprom(&mut self) -> Eeprom<'_, T> {
        Eeprom::new(&mut self.link, self.kind)
    }

    /// Resets the module to its power-on state.
    ///
    /// Every line becomes an input. The command is not acknowledged or
    /// verified; the call waits briefly for the module to settle.
    ///
    /// # Errors
    ///
    /// Returns a `Transport` error if the command could not be sent.
    pub fn reset(&mut self) -> Result<()> {
        self.link.send(&Command::reset(self.kind))?;
        thread::sleep(SETTLE_TIME);
        info!(kind = %self.kind, "device reset");
        Ok(())
    }

    /// Asks the module for its MAC address and firmware version.
    ///
    /// # Errors
    ///
    /// `TimedOut` if the module never answered, `Protocol` if a different
    /// model answered.
    pub fn identify(&mut self) -> Result<DeviceInfo> {
        let kind = self.kind;
        self.link
            .query(&Command::identify(kind), |data| decode_identify(kind, data))
    }

    /// Returns the number of IO lines.
    pub fn line_count(&self) -> usize {
        self.kind.line_count()
    }

    /// Reads one line (0 = port A bit 0).
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error, without any I/O, if the line does
    /// not exist on this variant.
    pub fn read_line(&mut self, line: usize) -> Result<bool> {
        let (port, bit) = self.locate_line(line)?;
        self.port(port)?.get_line(bit)
    }

    /// Drives one line, leaving the rest of its port unchanged.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error, without any I/O, if the line does
    /// not exist on this variant.
    pub fn write_line(&mut self, line: usize, level: Level) -> Result<()> {
        let (port, bit) = self.locate_line(line)?;
        self.port(port)?.set_line(bit, level)
    }

    fn locate_line(&self, line: usize) -> Result<(PortId, u8)> {
        if line >= self.line_count() {
            return Err(EioError::configuration(
                "line",
                format!("{} has no line {} (0-{})", self.kind, line, self.line_count() - 1),
            ));
        }
        line_to_port(line)
    }

    /// Returns a copy of the statistics.
    pub fn stats(&self) -> StatsRecord {
        self.link.stats()
    }

    /// Resets every statistic to zero.
    pub fn stats_clear(&mut self) {
        self.link.clear_stats();
    }

    /// Returns the retry and verify policy.
    pub fn reliability(&self) -> &ReliabilityConfig {
        self.link.config()
    }

    /// Returns the retry and verify policy for adjustment.
    ///
    /// # Example
    ///
    /// ```
    /// use etherio::sim::SimTransport;
    /// use etherio::{Device, DeviceKind, ReliabilityConfig};
    ///
    /// let sim = SimTransport::new(DeviceKind::Io24T);
    /// let mut dev = Device::with_transport(DeviceKind::Io24T, sim, ReliabilityConfig::default());
    /// dev.reliability_mut().write_validate = false;
    /// assert!(!dev.reliability().write_validate);
    /// ```
    pub fn reliability_mut(&mut self) -> &mut ReliabilityConfig {
        self.link.config_mut()
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        self.link.transport()
    }

    /// Returns the transport mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        self.link.transport_mut()
    }
}

impl<T: Transport + std::fmt::Debug> std::fmt::Debug for Device<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("kind", &self.kind)
            .field("link", &self.link)
            .finish()
    }
}
