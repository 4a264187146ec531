//! Register accessors for one IO port.
//!
//! A [`Port`] is a short-lived handle borrowed from a
//! [`Device`](crate::Device). Nothing is cached: every getter is a fresh
//! remote read and every setter a fresh remote write, each passing through
//! the device's retry and verify policy. The handle only exists for ports
//! the device variant actually has.
//!
//! # Example
//!
//! ```
//! use etherio::sim::SimTransport;
//! use etherio::{Device, DeviceKind, PortId, ReliabilityConfig, DIR_ALL_OUTPUT};
//!
//! let sim = SimTransport::new(DeviceKind::Io24T);
//! let mut dev = Device::with_transport(DeviceKind::Io24T, sim, ReliabilityConfig::default());
//!
//! let mut port = dev.port(PortId::B)?;
//! port.set_dir(DIR_ALL_OUTPUT)?;
//! port.set_val(0b0000_0110)?;
//! assert_eq!(port.get_val()?, 0b0000_0110);
//! assert!(port.get_line(1)?);
//! # Ok::<(), etherio::EioError>(())
//! ```

use crate::error::{EioError, Result};
use crate::kind::DeviceKind;
use crate::register::{PortId, Register};
use crate::reliability::Controller;
use crate::transport::Transport;
use crate::utils::{get_bit, set_bit, Level};

/// Handle to one port of a device.
pub struct Port<'a, T> {
    link: &'a mut Controller<T>,
    kind: DeviceKind,
    id: PortId,
}

impl<'a, T: Transport> Port<'a, T> {
    pub(crate) fn new(link: &'a mut Controller<T>, kind: DeviceKind, id: PortId) -> Self {
        Self { link, kind, id }
    }

    /// Returns which port this handle addresses.
    pub fn id(&self) -> PortId {
        self.id
    }

    /// Reads any register of this port.
    ///
    /// # Errors
    ///
    /// `Configuration` without any I/O if the variant lacks `register`,
    /// otherwise whatever the read returns.
    pub fn get(&mut self, register: Register) -> Result<u8> {
        self.kind.check_register(register)?;
        self.link.read_register(register, self.id)
    }

    /// Writes any register of this port.
    ///
    /// # Errors
    ///
    /// `Configuration` without any I/O if the variant lacks `register`,
    /// otherwise whatever the write returns.
    pub fn set(&mut self, register: Register, value: u8) -> Result<()> {
        self.kind.check_register(register)?;
        self.link.write_register(register, self.id, value)
    }

    /// Reads the line levels.
    ///
    /// Output lines report the driven level and input lines the sensed one.
    pub fn get_val(&mut self) -> Result<u8> {
        self.get(Register::Value)
    }

    /// Drives the output lines.
    pub fn set_val(&mut self, value: u8) -> Result<()> {
        self.set(Register::Value, value)
    }

    /// Reads the direction mask (bit set = input).
    pub fn get_dir(&mut self) -> Result<u8> {
        self.get(Register::Direction)
    }

    /// Writes the direction mask (bit set = input).
    pub fn set_dir(&mut self, mask: u8) -> Result<()> {
        self.set(Register::Direction, mask)
    }

    /// Reads the pull-up mask.
    pub fn get_pullup(&mut self) -> Result<u8> {
        self.get(Register::PullUp)
    }

    /// Writes the pull-up mask.
    pub fn set_pullup(&mut self, mask: u8) -> Result<()> {
        self.set(Register::PullUp, mask)
    }

    /// Reads the input threshold mask. IO24R only.
    pub fn get_threshold(&mut self) -> Result<u8> {
        self.get(Register::Threshold)
    }

    /// Writes the input threshold mask. IO24R only.
    pub fn set_threshold(&mut self, mask: u8) -> Result<()> {
        self.set(Register::Threshold, mask)
    }

    /// Reads the schmitt-trigger mask. IO24R only.
    pub fn get_schmitt(&mut self) -> Result<u8> {
        self.get(Register::Schmitt)
    }

    /// Writes the schmitt-trigger mask. IO24R only.
    pub fn set_schmitt(&mut self, mask: u8) -> Result<()> {
        self.set(Register::Schmitt, mask)
    }

    /// Reads one line of this port.
    ///
    /// # Errors
    ///
    /// `Configuration` without any I/O if `bit` is not in 0-7.
    pub fn get_line(&mut self, bit: u8) -> Result<bool> {
        check_bit(bit)?;
        Ok(get_bit(self.get_val()?, bit))
    }

    /// Sets one line of this port, leaving the others as read.
    ///
    /// This is a read-modify-write of the value register, so it costs a
    /// read on top of the (verified) write.
    pub fn set_line(&mut self, bit: u8, level: Level) -> Result<()> {
        check_bit(bit)?;
        let current = self.get_val()?;
        self.set_val(set_bit(current, bit, level.is_high()))
    }
}

fn check_bit(bit: u8) -> Result<()> {
    if bit < 8 {
        Ok(())
    } else {
        Err(EioError::configuration(
            "bit",
            format!("{} is not in 0-7", bit),
        ))
    }
}

impl<T> std::fmt::Debug for Port<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reliability::ReliabilityConfig;
    use crate::sim::SimTransport;
    use std::time::Duration;

    fn link(kind: DeviceKind) -> Controller<SimTransport> {
        let config = ReliabilityConfig::default().with_retry_delay(Duration::ZERO);
        Controller::new(SimTransport::new(kind), config)
    }

    #[test]
    fn test_value_and_direction() {
        let mut link = link(DeviceKind::Io24T);
        let mut port = Port::new(&mut link, DeviceKind::Io24T, PortId::C);
        port.set_val(0x3C).unwrap();
        port.set_dir(0xF0).unwrap();
        assert_eq!(port.get_dir().unwrap(), 0xF0);
        assert_eq!(port.id(), PortId::C);

        assert_eq!(link.transport().register(Register::Value, PortId::C), 0x3C);
        assert_eq!(link.transport().register(Register::Direction, PortId::C), 0xF0);
    }

    #[test]
    fn test_pullup() {
        let mut link = link(DeviceKind::Io72T);
        let mut port = Port::new(&mut link, DeviceKind::Io72T, PortId::I);
        port.set_pullup(0xAA).unwrap();
        assert_eq!(port.get_pullup().unwrap(), 0xAA);
        assert_eq!(link.transport().sent()[0], b"@I\xAA".to_vec());
    }

    #[test]
    fn test_conditioning_registers_on_io24r() {
        let mut link = link(DeviceKind::Io24R);
        let mut port = Port::new(&mut link, DeviceKind::Io24R, PortId::A);
        port.set_threshold(0x0F).unwrap();
        port.set_schmitt(0xF0).unwrap();
        assert_eq!(port.get_threshold().unwrap(), 0x0F);
        assert_eq!(port.get_schmitt().unwrap(), 0xF0);
    }

    #[test]
    fn test_conditioning_registers_rejected_elsewhere() {
        let mut link = link(DeviceKind::Io24T);
        let mut port = Port::new(&mut link, DeviceKind::Io24T, PortId::A);
        assert!(matches!(
            port.set_threshold(0x01),
            Err(EioError::Configuration { .. })
        ));
        assert!(port.get_schmitt().is_err());
        assert!(link.transport().sent().is_empty());
        assert_eq!(link.stats().operations, 0);
    }

    #[test]
    fn test_lines() {
        let mut link = link(DeviceKind::Io24T);
        let mut port = Port::new(&mut link, DeviceKind::Io24T, PortId::A);
        port.set_val(0b1000_0001).unwrap();
        port.set_line(3, Level::High).unwrap();
        port.set_line(7, Level::Low).unwrap();
        assert_eq!(port.get_val().unwrap(), 0b0000_1001);
        assert!(port.get_line(0).unwrap());
        assert!(!port.get_line(7).unwrap());
        assert!(port.get_line(8).is_err());
    }
}
