//! Reply parsing and validation.
//!
//! The device answers read commands with a frame that echoes the command
//! context followed by the data. Because the link carries no request
//! identifiers, the echoed context is the only way to tell a reply to the
//! outstanding command from a late reply to an earlier one, so every
//! decoder checks it.
//!
//! # Reply Structure
//!
//! | Reply | Size | Layout |
//! |-------|------|--------|
//! | value register | 2 bytes | `A`..`I`, value |
//! | other register | 3 bytes | prefix, `A`..`I`, value |
//! | EEPROM word | 4 bytes | `R`, address, hi, lo |
//! | identify | 10 or 12 bytes | model tag, MAC (6), firmware (2, optional) |
//!
//! # Example
//!
//! ```
//! use etherio::{PortId, Register, RegisterReply};
//!
//! let reply = RegisterReply::from_bytes(b"!B\x0F").unwrap();
//! assert_eq!(reply.register, Register::Direction);
//! assert_eq!(reply.port, PortId::B);
//! assert_eq!(reply.value, 0x0F);
//!
//! assert!(reply.check_matches(Register::Direction, PortId::B).is_ok());
//! assert!(reply.check_matches(Register::Value, PortId::B).is_err());
//! ```

use crate::command::Command;
use crate::error::{EioError, Result};
use crate::kind::DeviceKind;
use crate::register::{PortId, Register};

/// Size of an EEPROM word reply.
pub const EEPROM_REPLY_SIZE: usize = 4;

/// Size of an identify reply without the firmware version.
pub const MIN_IDENTIFY_SIZE: usize = 10;

/// Parsed register reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterReply {
    /// Register the reply is for.
    pub register: Register,
    /// Port the reply is for.
    pub port: PortId,
    /// Register contents.
    pub value: u8,
}

impl RegisterReply {
    /// Parses a register reply from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns a `Protocol` error if the frame length or context bytes are
    /// not those of a register reply.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (register, letter, value) = match *data {
            [letter, value] => (Register::Value, letter, value),
            [prefix, letter, value] => {
                let register = Register::from_prefix(prefix).ok_or_else(|| {
                    EioError::protocol(format!("unknown register prefix 0x{:02X}", prefix))
                })?;
                (register, letter, value)
            }
            _ => {
                return Err(EioError::protocol(format!(
                    "register reply must be 2 or 3 bytes, got {}",
                    data.len()
                )))
            }
        };

        let port = PortId::from_upper(letter).ok_or_else(|| {
            EioError::protocol(format!("invalid port byte 0x{:02X} in reply", letter))
        })?;

        Ok(Self {
            register,
            port,
            value,
        })
    }

    /// Validates that the reply answers a read of `register` on `port`.
    ///
    /// # Errors
    ///
    /// Returns a `Protocol` error describing the mismatch.
    pub fn check_matches(&self, register: Register, port: PortId) -> Result<()> {
        if self.register == register && self.port == port {
            Ok(())
        } else {
            Err(EioError::protocol(format!(
                "reply for {}.{} while waiting for {}.{}",
                self.port, self.register, port, register
            )))
        }
    }
}

/// Parsed EEPROM word reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EepromReply {
    /// Word address echoed by the device.
    pub address: u8,
    /// Word bytes in wire order.
    pub word: [u8; 2],
}

impl EepromReply {
    /// Parses an EEPROM word reply from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns a `Protocol` error if the frame is not `R addr hi lo`.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        match *data {
            [b'R', address, hi, lo] => Ok(Self {
                address,
                word: [hi, lo],
            }),
            _ if data.len() != EEPROM_REPLY_SIZE => Err(EioError::protocol(format!(
                "eeprom reply must be {} bytes, got {}",
                EEPROM_REPLY_SIZE,
                data.len()
            ))),
            _ => Err(EioError::protocol(format!(
                "eeprom reply starts with 0x{:02X}, expected 'R'",
                data[0]
            ))),
        }
    }

    /// Validates the echoed word address.
    ///
    /// # Errors
    ///
    /// Returns a `Protocol` error if the address differs.
    pub fn check_address(&self, expected: u8) -> Result<()> {
        if self.address == expected {
            Ok(())
        } else {
            Err(EioError::protocol(format!(
                "eeprom reply for word {} while waiting for word {}",
                self.address, expected
            )))
        }
    }
}

/// Identity reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceInfo {
    /// Model tag, `IO24` or `IO72`.
    pub model: [u8; 4],
    /// Hardware MAC address.
    pub mac: [u8; 6],
    /// Firmware version bytes, when the device reports them.
    pub firmware: Option<[u8; 2]>,
}

impl DeviceInfo {
    /// Parses an identify reply from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns a `Protocol` error if the reply is too short or its tag is
    /// not a known model.
    ///
    /// # Example
    ///
    /// ```
    /// use etherio::DeviceInfo;
    ///
    /// let reply = b"IO24\x00\x0C\xC6\x01\x02\x03\x01\x05";
    /// let info = DeviceInfo::from_bytes(reply).unwrap();
    /// assert_eq!(info.mac_string(), "000CC6010203");
    /// assert_eq!(info.firmware, Some([0x01, 0x05]));
    /// ```
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < MIN_IDENTIFY_SIZE {
            return Err(EioError::protocol(format!(
                "identify reply too short: expected at least {} bytes, got {}",
                MIN_IDENTIFY_SIZE,
                data.len()
            )));
        }

        let mut model = [0u8; 4];
        model.copy_from_slice(&data[..4]);
        if &model != b"IO24" && &model != b"IO72" {
            return Err(EioError::protocol(format!(
                "unknown model tag {:02X?}",
                model
            )));
        }

        let mut mac = [0u8; 6];
        mac.copy_from_slice(&data[4..MIN_IDENTIFY_SIZE]);

        let firmware = match data.get(MIN_IDENTIFY_SIZE..MIN_IDENTIFY_SIZE + 2) {
            Some([major, minor]) => Some([*major, *minor]),
            _ => None,
        };

        Ok(Self {
            model,
            mac,
            firmware,
        })
    }

    /// Validates that the reply came from the expected variant family.
    ///
    /// # Errors
    ///
    /// Returns a `Protocol` error if the model tag differs.
    pub fn check_kind(&self, kind: DeviceKind) -> Result<()> {
        if &self.model == kind.model_tag() {
            Ok(())
        } else {
            Err(EioError::protocol(format!(
                "identify reply from {} while talking to {}",
                String::from_utf8_lossy(&self.model),
                kind
            )))
        }
    }

    /// MAC address as uppercase hex without separators.
    pub fn mac_string(&self) -> String {
        self.mac.iter().map(|b| format!("{:02X}", b)).collect()
    }
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} mac {}",
            String::from_utf8_lossy(&self.model),
            self.mac_string()
        )?;
        if let Some([major, minor]) = self.firmware {
            write!(f, " fw {}.{}", major, minor)?;
        }
        Ok(())
    }
}

/// Decodes the reply to a register read and returns the register value.
///
/// # Errors
///
/// Returns a `Protocol` error if the reply is malformed or answers another
/// register or port.
pub fn decode_register(register: Register, port: PortId, data: &[u8]) -> Result<u8> {
    let reply = RegisterReply::from_bytes(data)?;
    reply.check_matches(register, port)?;
    Ok(reply.value)
}

/// Decodes the reply to an EEPROM word read.
///
/// # Errors
///
/// Returns a `Protocol` error if the reply is malformed or for another word.
pub fn decode_eeprom_word(address: u8, data: &[u8]) -> Result<[u8; 2]> {
    let reply = EepromReply::from_bytes(data)?;
    reply.check_address(address)?;
    Ok(reply.word)
}

/// Decodes the reply to an identify request.
///
/// # Errors
///
/// Returns a `Protocol` error if the reply is malformed or from another model.
pub fn decode_identify(kind: DeviceKind, data: &[u8]) -> Result<DeviceInfo> {
    let info = DeviceInfo::from_bytes(data)?;
    info.check_kind(kind)?;
    Ok(info)
}

/// Validates a write echo: the device repeats the write frame verbatim.
///
/// # Errors
///
/// Returns a `Protocol` error if the echo differs from `command`.
pub fn decode_echo(command: &Command, data: &[u8]) -> Result<()> {
    let expected = command.to_bytes();
    if data == expected.as_slice() {
        Ok(())
    } else {
        Err(EioError::protocol(format!(
            "echo {:02X?} does not match {:02X?}",
            data, expected
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_reply_value() {
        let reply = RegisterReply::from_bytes(&hex::decode("4137").unwrap()).unwrap();
        assert_eq!(reply.register, Register::Value);
        assert_eq!(reply.port, PortId::A);
        assert_eq!(reply.value, 0x37);
    }

    #[test]
    fn test_register_reply_prefixed() {
        let reply = RegisterReply::from_bytes(b"@C\x80").unwrap();
        assert_eq!(reply.register, Register::PullUp);
        assert_eq!(reply.port, PortId::C);
        assert_eq!(reply.value, 0x80);
    }

    #[test]
    fn test_register_reply_malformed() {
        assert!(RegisterReply::from_bytes(&[]).is_err());
        assert!(RegisterReply::from_bytes(b"A").is_err());
        assert!(RegisterReply::from_bytes(b"a\x01").is_err());
        assert!(RegisterReply::from_bytes(b"%A\x01").is_err());
        assert!(RegisterReply::from_bytes(b"!A\x01\x02").is_err());
    }

    #[test]
    fn test_decode_register_mismatch() {
        assert_eq!(
            decode_register(Register::Direction, PortId::A, b"!A\xFF").unwrap(),
            0xFF
        );

        let err = decode_register(Register::Value, PortId::B, b"A\x01").unwrap_err();
        assert_eq!(
            err.to_string(),
            "protocol error: reply for porta.val while waiting for portb.val"
        );
        assert!(decode_register(Register::Value, PortId::A, b"!A\x01").is_err());
    }

    #[test]
    fn test_eeprom_reply() {
        let word = decode_eeprom_word(6, &hex::decode("5206a8c0").unwrap()).unwrap();
        assert_eq!(word, [0xA8, 0xC0]);

        assert!(decode_eeprom_word(7, &hex::decode("5206a8c0").unwrap()).is_err());
        assert!(EepromReply::from_bytes(b"R\x06").is_err());
        assert!(EepromReply::from_bytes(b"W\x06\x00\x00").is_err());
    }

    #[test]
    fn test_identify_reply() {
        let mut data = b"IO72".to_vec();
        data.extend_from_slice(&[0x00, 0x0C, 0xC6, 0xAA, 0xBB, 0xCC]);

        let info = decode_identify(DeviceKind::Io72T, &data).unwrap();
        assert_eq!(info.mac_string(), "000CC6AABBCC");
        assert_eq!(info.firmware, None);
        assert_eq!(info.to_string(), "IO72 mac 000CC6AABBCC");

        assert!(decode_identify(DeviceKind::Io24T, &data).is_err());
        assert!(DeviceInfo::from_bytes(b"IO24\x00").is_err());
        assert!(DeviceInfo::from_bytes(b"XX24\x00\x00\x00\x00\x00\x00").is_err());
    }

    #[test]
    fn test_echo() {
        let cmd = Command::write_port(PortId::A, 0x10);
        assert!(decode_echo(&cmd, b"A\x10").is_ok());
        assert!(decode_echo(&cmd, b"A\x11").is_err());
        assert!(decode_echo(&cmd, b"").is_err());
    }
}
