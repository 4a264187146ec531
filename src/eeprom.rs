//! Access to the configuration EEPROM.
//!
//! The module keeps its network settings in a 64-word EEPROM. The IP
//! address, netmask and gateway each span two words. Reads go through the
//! device's retry policy; writes are sent once per word and followed by a
//! short settle delay, but are not read back.
//!
//! On the IO24R the EEPROM is write-protected until
//! [`enable_writes`](Eeprom::enable_writes) is sent. The field setters
//! take care of this themselves; raw [`write_word`](Eeprom::write_word)
//! calls do not.
//!
//! # Example
//!
//! ```
//! use etherio::sim::SimTransport;
//! use etherio::{Device, DeviceKind, ReliabilityConfig};
//! use std::net::Ipv4Addr;
//!
//! let sim = SimTransport::new(DeviceKind::Io24R);
//! let mut dev = Device::with_transport(DeviceKind::Io24R, sim, ReliabilityConfig::default());
//!
//! let mut eeprom = dev.eeprom();
//! eeprom.set_ipaddr(Ipv4Addr::new(192, 168, 1, 20))?;
//! assert_eq!(eeprom.ipaddr()?, Ipv4Addr::new(192, 168, 1, 20));
//! # Ok::<(), etherio::EioError>(())
//! ```

use std::net::Ipv4Addr;
use std::thread;

use tracing::debug;

use crate::command::{words_to_ip, Command, EepromField, EEPROM_WORDS, SETTLE_TIME};
use crate::error::{EioError, Result};
use crate::kind::DeviceKind;
use crate::reliability::Controller;
use crate::response::decode_eeprom_word;
use crate::transport::Transport;

/// Handle to the EEPROM of a device.
pub struct Eeprom<'a, T> {
    link: &'a mut Controller<T>,
    kind: DeviceKind,
}

impl<'a, T: Transport> Eeprom<'a, T> {
    pub(crate) fn new(link: &'a mut Controller<T>, kind: DeviceKind) -> Self {
        Self { link, kind }
    }

    /// Reads an IP field.
    ///
    /// # Errors
    ///
    /// `TimedOut` or `Protocol` if a word could not be read.
    pub fn get(&mut self, field: EepromField) -> Result<Ipv4Addr> {
        let [first, second] = Command::read_eeprom_field(field);
        let [a1, a2] = field.word_addresses();
        let w1 = self.link.query(&first, |data| decode_eeprom_word(a1, data))?;
        let w2 = self.link.query(&second, |data| decode_eeprom_word(a2, data))?;
        Ok(words_to_ip(w1, w2))
    }

    /// Writes an IP field.
    ///
    /// The module only applies new network settings after a power cycle. On
    /// the IO24R write protection is restored once it was lifted, even if a
    /// word failed to send.
    ///
    /// # Errors
    ///
    /// `Transport` if a frame could not be sent. The first error wins.
    pub fn set(&mut self, field: EepromField, ip: Ipv4Addr) -> Result<()> {
        if self.kind.uses_guarded_commands() {
            self.enable_writes()?;
            let written = self.write_field(field, ip);
            let disabled = self.disable_writes();
            written.and(disabled)?;
        } else {
            self.write_field(field, ip)?;
        }
        debug!(field = %field, ip = %ip, "eeprom field written");
        Ok(())
    }

    fn write_field(&mut self, field: EepromField, ip: Ipv4Addr) -> Result<()> {
        for command in Command::write_eeprom_field(field, ip) {
            self.link.send(&command)?;
            thread::sleep(SETTLE_TIME);
        }
        Ok(())
    }

    /// Reads the stored IP address.
    pub fn ipaddr(&mut self) -> Result<Ipv4Addr> {
        self.get(EepromField::IpAddress)
    }

    /// Writes the stored IP address.
    pub fn set_ipaddr(&mut self, ip: Ipv4Addr) -> Result<()> {
        self.set(EepromField::IpAddress, ip)
    }

    /// Reads the stored netmask.
    pub fn ipmask(&mut self) -> Result<Ipv4Addr> {
        self.get(EepromField::IpMask)
    }

    /// Writes the stored netmask.
    pub fn set_ipmask(&mut self, mask: Ipv4Addr) -> Result<()> {
        self.set(EepromField::IpMask, mask)
    }

    /// Reads the stored gateway.
    pub fn ipgway(&mut self) -> Result<Ipv4Addr> {
        self.get(EepromField::IpGateway)
    }

    /// Writes the stored gateway.
    pub fn set_ipgway(&mut self, gateway: Ipv4Addr) -> Result<()> {
        self.set(EepromField::IpGateway, gateway)
    }

    /// Reads one raw word.
    ///
    /// # Errors
    ///
    /// `Configuration` without any I/O if `address` is out of range.
    pub fn read_word(&mut self, address: u8) -> Result<[u8; 2]> {
        let command = Command::read_eeprom_word(address)?;
        self.link
            .query(&command, |data| decode_eeprom_word(address, data))
    }

    /// Writes one raw word and waits for the EEPROM to settle.
    ///
    /// # Errors
    ///
    /// `Configuration` without any I/O if `address` is out of range.
    pub fn write_word(&mut self, address: u8, word: [u8; 2]) -> Result<()> {
        let command = Command::write_eeprom_word(address, word)?;
        self.link.send(&command)?;
        thread::sleep(SETTLE_TIME);
        Ok(())
    }

    /// Reads the whole EEPROM, high byte first per word.
    pub fn image(&mut self) -> Result<Vec<u8>> {
        let mut image = Vec::with_capacity(usize::from(EEPROM_WORDS) * 2);
        for address in 0..EEPROM_WORDS {
            image.extend_from_slice(&self.read_word(address)?);
        }
        Ok(image)
    }

    /// Lifts the IO24R write protection.
    ///
    /// # Errors
    ///
    /// `Configuration` on variants without write protection.
    pub fn enable_writes(&mut self) -> Result<()> {
        self.check_guarded()?;
        self.link.send(&Command::EepromWriteEnable)
    }

    /// Restores the IO24R write protection.
    ///
    /// # Errors
    ///
    /// `Configuration` on variants without write protection.
    pub fn disable_writes(&mut self) -> Result<()> {
        self.check_guarded()?;
        self.link.send(&Command::EepromWriteDisable)
    }

    fn check_guarded(&self) -> Result<()> {
        if self.kind.uses_guarded_commands() {
            Ok(())
        } else {
            Err(EioError::configuration(
                "eeprom",
                format!("{} has no write protection to toggle", self.kind),
            ))
        }
    }
}

impl<T> std::fmt::Debug for Eeprom<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Eeprom").field("kind", &self.kind).finish()
    }
}
