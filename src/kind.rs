//! Supported device variants.
//!
//! All variants speak the same legacy command set. They differ in how many
//! ports they have, whether input-conditioning registers exist, and in the
//! exact bytes of a few housekeeping commands.

use std::str::FromStr;

use crate::error::{EioError, Result};
use crate::register::{PortId, Register};

/// Ether IO hardware variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Ether IO 24 R: 3 ports, threshold and schmitt registers, guarded
    /// reset and EEPROM write-enable commands.
    Io24R,
    /// Ether IO 24 TCP: 3 ports.
    Io24T,
    /// Ether IO 72 TCP: 9 ports.
    Io72T,
}

impl DeviceKind {
    /// Number of 8-bit ports on this variant.
    pub fn port_count(self) -> usize {
        match self {
            DeviceKind::Io24R | DeviceKind::Io24T => 3,
            DeviceKind::Io72T => 9,
        }
    }

    /// Number of individually addressable IO lines.
    pub fn line_count(self) -> usize {
        self.port_count() * 8
    }

    /// Ports present on this variant, in order.
    pub fn ports(self) -> &'static [PortId] {
        &PortId::ALL[..self.port_count()]
    }

    /// Returns whether the variant has threshold and schmitt registers.
    pub fn has_input_conditioning(self) -> bool {
        matches!(self, DeviceKind::Io24R)
    }

    /// Returns whether reset and EEPROM write-enable need the `00 AA 55` guard.
    pub(crate) fn uses_guarded_commands(self) -> bool {
        matches!(self, DeviceKind::Io24R)
    }

    /// Validates that `port` exists on this variant.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error naming the valid range.
    pub fn check_port(self, port: PortId) -> Result<()> {
        if port.index() < self.port_count() {
            Ok(())
        } else {
            let last = self.ports().last().copied().unwrap_or(PortId::A);
            Err(EioError::configuration(
                "port",
                format!("{} has no {} (ports a-{})", self, port, last.lower() as char),
            ))
        }
    }

    /// Validates that `register` exists on this variant.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error for threshold/schmitt on variants
    /// without input conditioning.
    pub fn check_register(self, register: Register) -> Result<()> {
        if register.is_input_conditioning() && !self.has_input_conditioning() {
            Err(EioError::configuration(
                "register",
                format!("{} does not have the {} register", self, register),
            ))
        } else {
            Ok(())
        }
    }

    /// Model tag carried in identify replies.
    pub(crate) fn model_tag(self) -> &'static [u8; 4] {
        match self {
            DeviceKind::Io24R | DeviceKind::Io24T => b"IO24",
            DeviceKind::Io72T => b"IO72",
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Io24R => write!(f, "IO24R"),
            DeviceKind::Io24T => write!(f, "IO24T"),
            DeviceKind::Io72T => write!(f, "IO72T"),
        }
    }
}

impl FromStr for DeviceKind {
    type Err = EioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IO24R" => Ok(DeviceKind::Io24R),
            "IO24T" => Ok(DeviceKind::Io24T),
            "IO72T" => Ok(DeviceKind::Io72T),
            _ => Err(EioError::configuration(
                "device kind",
                format!("'{}' is not one of IO24R, IO24T, IO72T", s),
            )),
        }
    }
}
