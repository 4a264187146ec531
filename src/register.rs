//! Port and register identifiers.
//!
//! Every port on an Ether IO module is a bank of 8-bit registers. The
//! [`Register`] enum names which bank is addressed and [`PortId`] names
//! the port.
//!
//! # Registers Overview
//!
//! | Register | Prefix | Available on | Meaning of a 1 bit |
//! |----------|:------:|--------------|--------------------|
//! | Value | (none) | all | line is high |
//! | Direction | `!` | all | line is an input |
//! | PullUp | `@` | all | pull-up disabled |
//! | Threshold | `#` | IO24R | 1.4V threshold (0 = 2.5V) |
//! | Schmitt | `$` | IO24R | schmitt trigger disabled |
//!
//! # Example
//!
//! ```
//! use etherio::{PortId, Register};
//!
//! let port: PortId = "portb".parse().unwrap();
//! assert_eq!(port, PortId::B);
//! assert_eq!(port.index(), 1);
//!
//! assert_eq!(Register::Direction.prefix(), b"!");
//! assert_eq!(Register::Value.to_string(), "val");
//! ```

use std::str::FromStr;

use crate::error::{EioError, Result};

/// Direction mask that makes every line of a port an input.
pub const DIR_ALL_INPUT: u8 = 0xFF;

/// Direction mask that makes every line of a port an output.
pub const DIR_ALL_OUTPUT: u8 = 0x00;

/// Register bank of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// Line states: driven level for outputs, sensed level for inputs.
    Value,
    /// Direction mask, 1 = input, 0 = output.
    Direction,
    /// Pull-up mask, 1 = disabled.
    PullUp,
    /// Input threshold mask (IO24R only).
    Threshold,
    /// Schmitt trigger mask (IO24R only).
    Schmitt,
}

impl Register {
    /// All registers in wire order.
    pub const ALL: [Register; 5] = [
        Register::Value,
        Register::Direction,
        Register::PullUp,
        Register::Threshold,
        Register::Schmitt,
    ];

    /// Returns the command prefix that selects this register.
    pub fn prefix(self) -> &'static [u8] {
        match self {
            Register::Value => b"",
            Register::Direction => b"!",
            Register::PullUp => b"@",
            Register::Threshold => b"#",
            Register::Schmitt => b"$",
        }
    }

    /// Maps a prefix byte back to its register.
    pub(crate) fn from_prefix(byte: u8) -> Option<Self> {
        match byte {
            b'!' => Some(Register::Direction),
            b'@' => Some(Register::PullUp),
            b'#' => Some(Register::Threshold),
            b'$' => Some(Register::Schmitt),
            _ => None,
        }
    }

    /// Returns whether this register only exists on input-conditioning models.
    pub fn is_input_conditioning(self) -> bool {
        matches!(self, Register::Threshold | Register::Schmitt)
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Register::Value => write!(f, "val"),
            Register::Direction => write!(f, "dir"),
            Register::PullUp => write!(f, "pup"),
            Register::Threshold => write!(f, "thr"),
            Register::Schmitt => write!(f, "sch"),
        }
    }
}

/// Port letter, `A` through `I`.
///
/// Whether a port exists depends on the device variant; the check is done by
/// [`Device`](crate::Device), not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PortId {
    /// Port A.
    A,
    /// Port B.
    B,
    /// Port C.
    C,
    /// Port D.
    D,
    /// Port E.
    E,
    /// Port F.
    F,
    /// Port G.
    G,
    /// Port H.
    H,
    /// Port I.
    I,
}

impl PortId {
    /// Every port letter the command set can address.
    pub const ALL: [PortId; 9] = [
        PortId::A,
        PortId::B,
        PortId::C,
        PortId::D,
        PortId::E,
        PortId::F,
        PortId::G,
        PortId::H,
        PortId::I,
    ];

    /// Returns the zero-based port index.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Returns the port for a zero-based index.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if `index` is 9 or more.
    ///
    /// # Example
    ///
    /// ```
    /// use etherio::PortId;
    ///
    /// assert_eq!(PortId::from_index(2).unwrap(), PortId::C);
    /// assert!(PortId::from_index(9).is_err());
    /// ```
    pub fn from_index(index: usize) -> Result<Self> {
        Self::ALL.get(index).copied().ok_or_else(|| {
            EioError::configuration("port", format!("index {} is not in 0-8", index))
        })
    }

    /// Uppercase ASCII letter, used in write frames and replies.
    pub fn upper(self) -> u8 {
        b'A' + self as u8
    }

    /// Lowercase ASCII letter, used in read frames.
    pub fn lower(self) -> u8 {
        b'a' + self as u8
    }

    /// Maps an uppercase letter from a reply back to a port.
    pub(crate) fn from_upper(byte: u8) -> Option<Self> {
        match byte {
            b'A'..=b'I' => Some(Self::ALL[(byte - b'A') as usize]),
            _ => None,
        }
    }
}

impl std::fmt::Display for PortId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "port{}", self.lower() as char)
    }
}

impl FromStr for PortId {
    type Err = EioError;

    /// Accepts `"a"`, `"A"`, `"porta"` or `"PORTA"`.
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let letter = lower.strip_prefix("port").unwrap_or(&lower);
        match letter.as_bytes() {
            [b @ b'a'..=b'i'] => Ok(Self::ALL[(b - b'a') as usize]),
            _ => Err(EioError::configuration(
                "port",
                format!("'{}' is not a port name", s),
            )),
        }
    }
}

impl TryFrom<usize> for PortId {
    type Error = EioError;

    fn try_from(index: usize) -> Result<Self> {
        Self::from_index(index)
    }
}
