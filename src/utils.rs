//! Helpers for working with port bytes, line numbers and addresses.
//!
//! # Example
//!
//! ```
//! use etherio::utils::{byte_to_bits, get_bit, set_bit};
//!
//! let value: u8 = 0b1010_0101;
//!
//! assert!(get_bit(value, 0));
//! assert!(!get_bit(value, 1));
//! assert_eq!(set_bit(value, 1, true), 0b1010_0111);
//!
//! let bits = byte_to_bits(value);
//! assert!(bits[7]);
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;

use crate::error::{EioError, Result};
use crate::register::PortId;
use crate::transport::{DEFAULT_DEVICE_IP, DEFAULT_UDP_PORT};

/// Logic level of one IO line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    /// Line is low (bit clear).
    Low,
    /// Line is high (bit set).
    High,
}

impl Level {
    /// Returns whether the level is high.
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl From<Level> for bool {
    fn from(level: Level) -> Self {
        level.is_high()
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Low => write!(f, "LOW"),
            Level::High => write!(f, "HIGH"),
        }
    }
}

impl FromStr for Level {
    type Err = EioError;

    /// Parses `0 1 L H LO HI LOW HIGH OFF ON`, ignoring case.
    ///
    /// # Example
    ///
    /// ```
    /// use etherio::utils::Level;
    ///
    /// assert_eq!("hi".parse::<Level>()?, Level::High);
    /// assert_eq!("Off".parse::<Level>()?, Level::Low);
    /// assert!("maybe".parse::<Level>().is_err());
    /// # Ok::<(), etherio::EioError>(())
    /// ```
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "0" | "L" | "LO" | "LOW" | "OFF" => Ok(Level::Low),
            "1" | "H" | "HI" | "HIGH" | "ON" => Ok(Level::High),
            _ => Err(EioError::configuration(
                "level",
                format!("'{}' is not one of 0 1 L H LO HI LOW HIGH OFF ON", s),
            )),
        }
    }
}

/// Gets a single bit from a port byte.
///
/// # Example
///
/// ```
/// use etherio::utils::get_bit;
///
/// assert!(get_bit(0b0000_0100, 2));
/// assert!(!get_bit(0b0000_0100, 1));
/// ```
#[inline]
pub fn get_bit(value: u8, bit: u8) -> bool {
    (value & (1 << bit)) != 0
}

/// Returns `value` with one bit set or cleared.
///
/// # Example
///
/// ```
/// use etherio::utils::set_bit;
///
/// assert_eq!(set_bit(0x00, 3, true), 0x08);
/// assert_eq!(set_bit(0xFF, 0, false), 0xFE);
/// ```
#[inline]
pub fn set_bit(value: u8, bit: u8, state: bool) -> u8 {
    if state {
        value | (1 << bit)
    } else {
        value & !(1 << bit)
    }
}

/// Returns `value` with one bit inverted.
#[inline]
pub fn toggle_bit(value: u8, bit: u8) -> u8 {
    value ^ (1 << bit)
}

/// Splits a port byte into its eight lines, index 0 being bit 0.
pub fn byte_to_bits(value: u8) -> [bool; 8] {
    std::array::from_fn(|bit| get_bit(value, bit as u8))
}

/// Formats a port byte as `0bXXXX_XXXX`.
///
/// # Example
///
/// ```
/// use etherio::utils::format_binary;
///
/// assert_eq!(format_binary(0xA5), "0b1010_0101");
/// ```
pub fn format_binary(value: u8) -> String {
    format!("0b{:04b}_{:04b}", value >> 4, value & 0x0F)
}

/// Formats a port byte as `0xXX`.
pub fn format_hex(value: u8) -> String {
    format!("0x{:02X}", value)
}

/// Maps a line number to its port and bit.
///
/// Line `n` lives on port `n / 8`, bit `n % 8`. Whether the port exists on
/// a given variant is checked separately.
///
/// # Errors
///
/// Returns a `Configuration` error for lines past port I.
///
/// # Example
///
/// ```
/// use etherio::utils::line_to_port;
/// use etherio::PortId;
///
/// assert_eq!(line_to_port(10)?, (PortId::B, 2));
/// # Ok::<(), etherio::EioError>(())
/// ```
pub fn line_to_port(line: usize) -> Result<(PortId, u8)> {
    let port = PortId::from_index(line / 8)
        .map_err(|_| EioError::configuration("line", format!("{} is past the last port", line)))?;
    Ok((port, (line % 8) as u8))
}

/// Parses a device address.
///
/// Accepts `"a.b.c.d:port"`, `"a.b.c.d"` (UDP port 2424) and the empty
/// string (factory default `10.10.10.10:2424`).
///
/// # Errors
///
/// Returns a `Configuration` error for anything else.
///
/// # Example
///
/// ```
/// use etherio::utils::parse_device_addr;
///
/// assert_eq!(parse_device_addr("192.168.1.20")?.port(), 2424);
/// assert_eq!(parse_device_addr("192.168.1.20:5000")?.port(), 5000);
/// assert_eq!(parse_device_addr("")?.to_string(), "10.10.10.10:2424");
/// # Ok::<(), etherio::EioError>(())
/// ```
pub fn parse_device_addr(s: &str) -> Result<SocketAddr> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(SocketAddr::from((DEFAULT_DEVICE_IP, DEFAULT_UDP_PORT)));
    }
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Ok(addr);
    }
    s.parse::<Ipv4Addr>()
        .map(|ip| SocketAddr::from((ip, DEFAULT_UDP_PORT)))
        .map_err(|_| EioError::configuration("address", format!("cannot parse '{}'", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_toggle() {
        let value = 0b0101_0000;
        assert!(get_bit(value, 4));
        assert!(!get_bit(value, 5));
        assert_eq!(set_bit(value, 5, true), 0b0111_0000);
        assert_eq!(set_bit(value, 4, false), 0b0100_0000);
        assert_eq!(set_bit(value, 4, true), value);
        assert_eq!(toggle_bit(value, 0), 0b0101_0001);
        assert_eq!(toggle_bit(toggle_bit(value, 7), 7), value);
    }

    #[test]
    fn test_byte_to_bits() {
        let bits = byte_to_bits(0x81);
        assert_eq!(bits, [true, false, false, false, false, false, false, true]);
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_binary(0x00), "0b0000_0000");
        assert_eq!(format_binary(0xF1), "0b1111_0001");
        assert_eq!(format_hex(0x0A), "0x0A");
    }

    #[test]
    fn test_level_parse() {
        for s in ["0", "l", "Lo", "LOW", "off"] {
            assert_eq!(s.parse::<Level>().unwrap(), Level::Low, "{}", s);
        }
        for s in ["1", "h", "HI", "high", "On"] {
            assert_eq!(s.parse::<Level>().unwrap(), Level::High, "{}", s);
        }
        assert!("2".parse::<Level>().is_err());
        assert!("".parse::<Level>().is_err());
    }

    #[test]
    fn test_level_bool() {
        assert_eq!(Level::from(true), Level::High);
        assert!(!bool::from(Level::Low));
        assert_eq!(Level::High.to_string(), "HIGH");
    }

    #[test]
    fn test_line_to_port() {
        assert_eq!(line_to_port(0).unwrap(), (PortId::A, 0));
        assert_eq!(line_to_port(23).unwrap(), (PortId::C, 7));
        assert_eq!(line_to_port(71).unwrap(), (PortId::I, 7));
        assert!(matches!(
            line_to_port(72),
            Err(EioError::Configuration { .. })
        ));
    }

    #[test]
    fn test_parse_device_addr() {
        let addr = parse_device_addr("192.168.0.7:2525").unwrap();
        assert_eq!(addr.ip().to_string(), "192.168.0.7");
        assert_eq!(addr.port(), 2525);

        let addr = parse_device_addr(" 192.168.0.7 ").unwrap();
        assert_eq!(addr.port(), DEFAULT_UDP_PORT);

        let addr = parse_device_addr("").unwrap();
        assert_eq!(addr, SocketAddr::from(([10, 10, 10, 10], 2424)));

        assert!(parse_device_addr("device.local").is_err());
        assert!(parse_device_addr("10.0.0.1:notaport").is_err());
    }
}
