//! Legacy command set encoding.
//!
//! Every request the driver can send is a [`Command`]. A command is a small
//! value object that knows how to serialize itself into the vendor's binary
//! frame and whether the device answers it. The encoding is identical for
//! every supported variant; checking that a port or register exists on a
//! given variant is left to [`Device`](crate::Device).
//!
//! # Frame Layout
//!
//! | Command | Frame | Reply |
//! |---------|-------|-------|
//! | register read | `prefix` `a`..`i` | `prefix` `A`..`I` `value` |
//! | register write | `prefix` `A`..`I` `value` | none (echo if enabled) |
//! | EEPROM read word | `'R` `addr` `00` `00` | `R` `addr` `hi` `lo` |
//! | EEPROM write word | `'W` `addr` `hi` `lo` | none |
//! | EEPROM write enable | `'1` `00` `AA` `55` | none |
//! | EEPROM write disable | `'0` `00` `AA` `55` | none |
//! | reset | `'@` (IO24R: `'@` `00` `AA` `55`) | none |
//! | identify | `IO24` (IO72T: `'IO72`) | tag, MAC, firmware |
//!
//! # Example
//!
//! ```
//! use etherio::{Command, PortId, Register};
//!
//! let read = Command::read_port(PortId::A);
//! assert_eq!(read.to_bytes(), b"a");
//! assert!(read.expects_reply());
//!
//! let write = Command::write_dir(PortId::B, 0x0F);
//! assert_eq!(write.to_bytes(), b"!B\x0F");
//! assert_eq!(write.verify_read(), Some(Command::read_register(Register::Direction, PortId::B)));
//! ```

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::error::{EioError, Result};
use crate::kind::DeviceKind;
use crate::register::{PortId, Register};

/// Number of 16-bit words in the configuration EEPROM.
pub const EEPROM_WORDS: u8 = 64;

/// Guard bytes that must follow destructive IO24R housekeeping commands.
pub(crate) const GUARD: [u8; 3] = [0x00, 0xAA, 0x55];

/// Time the module needs after an EEPROM write or a reset.
pub const SETTLE_TIME: Duration = Duration::from_millis(10);

/// Network configuration field stored in the device EEPROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EepromField {
    /// Boot IP address.
    IpAddress,
    /// Subnet mask.
    IpMask,
    /// Default gateway.
    IpGateway,
}

impl EepromField {
    /// EEPROM word addresses holding the four octets.
    pub fn word_addresses(self) -> [u8; 2] {
        match self {
            EepromField::IpAddress => [6, 7],
            EepromField::IpMask => [25, 26],
            EepromField::IpGateway => [27, 28],
        }
    }
}

impl std::fmt::Display for EepromField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EepromField::IpAddress => write!(f, "ipaddr"),
            EepromField::IpMask => write!(f, "ipmask"),
            EepromField::IpGateway => write!(f, "ipgway"),
        }
    }
}

/// Splits an address into the two EEPROM words that store it.
///
/// Each word carries its octets low byte first.
pub(crate) fn ip_to_words(ip: Ipv4Addr) -> [[u8; 2]; 2] {
    let [a, b, c, d] = ip.octets();
    [[b, a], [d, c]]
}

/// Reassembles an address from the two EEPROM words that store it.
pub(crate) fn words_to_ip(first: [u8; 2], second: [u8; 2]) -> Ipv4Addr {
    Ipv4Addr::new(first[1], first[0], second[1], second[0])
}

/// A single request in the legacy command set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Read one register of one port.
    ReadRegister {
        /// Register bank.
        register: Register,
        /// Target port.
        port: PortId,
    },
    /// Write one register of one port.
    WriteRegister {
        /// Register bank.
        register: Register,
        /// Target port.
        port: PortId,
        /// Byte to write.
        value: u8,
    },
    /// Read one 16-bit EEPROM word.
    ReadEepromWord {
        /// Word address, 0-63.
        address: u8,
    },
    /// Write one 16-bit EEPROM word.
    WriteEepromWord {
        /// Word address, 0-63.
        address: u8,
        /// Word bytes in wire order.
        word: [u8; 2],
    },
    /// Allow EEPROM writes (IO24R).
    EepromWriteEnable,
    /// Forbid EEPROM writes (IO24R).
    EepromWriteDisable,
    /// Reset the module to its power-on state.
    Reset {
        /// Append the `00 AA 55` guard (IO24R form).
        guarded: bool,
    },
    /// Ask the module for its model tag, MAC and firmware version.
    Identify {
        /// Variant being identified; selects the request tag.
        kind: DeviceKind,
    },
}

impl Command {
    /// Reads the value register of `port`.
    pub fn read_port(port: PortId) -> Self {
        Self::read_register(Register::Value, port)
    }

    /// Writes `value` to the value register of `port`.
    pub fn write_port(port: PortId, value: u8) -> Self {
        Self::write_register(Register::Value, port, value)
    }

    /// Reads the direction register of `port`.
    pub fn read_dir(port: PortId) -> Self {
        Self::read_register(Register::Direction, port)
    }

    /// Writes `mask` to the direction register of `port`.
    pub fn write_dir(port: PortId, mask: u8) -> Self {
        Self::write_register(Register::Direction, port, mask)
    }

    /// Reads any register of `port`.
    pub fn read_register(register: Register, port: PortId) -> Self {
        Self::ReadRegister { register, port }
    }

    /// Writes any register of `port`.
    pub fn write_register(register: Register, port: PortId, value: u8) -> Self {
        Self::WriteRegister {
            register,
            port,
            value,
        }
    }

    /// Reads one EEPROM word.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if `address` is not below [`EEPROM_WORDS`].
    pub fn read_eeprom_word(address: u8) -> Result<Self> {
        check_eeprom_address(address)?;
        Ok(Self::ReadEepromWord { address })
    }

    /// Writes one EEPROM word.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if `address` is not below [`EEPROM_WORDS`].
    pub fn write_eeprom_word(address: u8, word: [u8; 2]) -> Result<Self> {
        check_eeprom_address(address)?;
        Ok(Self::WriteEepromWord { address, word })
    }

    /// Reads both words of an EEPROM field.
    pub fn read_eeprom_field(field: EepromField) -> [Self; 2] {
        let [first, second] = field.word_addresses();
        [
            Self::ReadEepromWord { address: first },
            Self::ReadEepromWord { address: second },
        ]
    }

    /// Writes both words of an EEPROM field.
    pub fn write_eeprom_field(field: EepromField, ip: Ipv4Addr) -> [Self; 2] {
        let [first, second] = field.word_addresses();
        let [w1, w2] = ip_to_words(ip);
        [
            Self::WriteEepromWord {
                address: first,
                word: w1,
            },
            Self::WriteEepromWord {
                address: second,
                word: w2,
            },
        ]
    }

    /// Reset command in the form `kind` understands.
    pub fn reset(kind: DeviceKind) -> Self {
        Self::Reset {
            guarded: kind.uses_guarded_commands(),
        }
    }

    /// Identify command for `kind`.
    pub fn identify(kind: DeviceKind) -> Self {
        Self::Identify { kind }
    }

    /// Returns whether the device sends a reply to this command.
    ///
    /// Writes are unacknowledged in the legacy command set.
    pub fn expects_reply(&self) -> bool {
        matches!(
            self,
            Self::ReadRegister { .. } | Self::ReadEepromWord { .. } | Self::Identify { .. }
        )
    }

    /// Returns the read that observes what this command wrote.
    ///
    /// Only register writes can be verified.
    pub fn verify_read(&self) -> Option<Self> {
        match *self {
            Self::WriteRegister { register, port, .. } => {
                Some(Self::ReadRegister { register, port })
            }
            _ => None,
        }
    }

    /// Serializes the command to bytes for transmission.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(5);
        match *self {
            Self::ReadRegister { register, port } => {
                bytes.extend_from_slice(register.prefix());
                bytes.push(port.lower());
            }
            Self::WriteRegister {
                register,
                port,
                value,
            } => {
                bytes.extend_from_slice(register.prefix());
                bytes.push(port.upper());
                bytes.push(value);
            }
            Self::ReadEepromWord { address } => {
                bytes.extend_from_slice(&[b'\'', b'R', address, 0x00, 0x00]);
            }
            Self::WriteEepromWord { address, word } => {
                bytes.extend_from_slice(&[b'\'', b'W', address, word[0], word[1]]);
            }
            Self::EepromWriteEnable => {
                bytes.extend_from_slice(b"'1");
                bytes.extend_from_slice(&GUARD);
            }
            Self::EepromWriteDisable => {
                bytes.extend_from_slice(b"'0");
                bytes.extend_from_slice(&GUARD);
            }
            Self::Reset { guarded } => {
                bytes.extend_from_slice(b"'@");
                if guarded {
                    bytes.extend_from_slice(&GUARD);
                }
            }
            Self::Identify { kind } => {
                if kind == DeviceKind::Io72T {
                    bytes.push(b'\'');
                }
                bytes.extend_from_slice(kind.model_tag());
            }
        }
        bytes
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadRegister { register, port } => write!(f, "read {}.{}", port, register),
            Self::WriteRegister {
                register,
                port,
                value,
            } => write!(f, "write {}.{} = 0x{:02X}", port, register, value),
            Self::ReadEepromWord { address } => write!(f, "read eeprom[{}]", address),
            Self::WriteEepromWord { address, word } => {
                write!(f, "write eeprom[{}] = {:02X}{:02X}", address, word[0], word[1])
            }
            Self::EepromWriteEnable => write!(f, "eeprom write enable"),
            Self::EepromWriteDisable => write!(f, "eeprom write disable"),
            Self::Reset { .. } => write!(f, "reset"),
            Self::Identify { kind } => write!(f, "identify {}", kind),
        }
    }
}

fn check_eeprom_address(address: u8) -> Result<()> {
    if address < EEPROM_WORDS {
        Ok(())
    } else {
        Err(EioError::configuration(
            "eeprom address",
            format!("{} is not in 0-{}", address, EEPROM_WORDS - 1),
        ))
    }
}
