//! Error types for Ether IO register access.

use std::io;
use thiserror::Error;

/// Result type alias for Ether IO operations.
pub type Result<T> = std::result::Result<T, EioError>;

/// Errors that can occur while talking to an Ether IO device.
///
/// Transient faults (a single lost datagram, a single garbled reply, a single
/// verify mismatch) never show up here on their own. The reliability layer
/// absorbs them as retries and only reports a terminal outcome once the
/// retry budget is spent.
#[derive(Debug, Error)]
pub enum EioError {
    /// Socket-level failure (unreachable host, refused, bind failure).
    ///
    /// Never retried.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// A reply was received but was malformed or answered a different command.
    #[error("protocol error: {reason}")]
    Protocol {
        /// Description of what was wrong with the reply.
        reason: String,
    },

    /// No usable reply arrived within the timeout on any attempt.
    #[error("device did not reply after {attempts} attempt(s)")]
    TimedOut {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// The device replied, but a written register never read back as written.
    #[error(
        "write not applied: expected 0x{expected:02X}, read back 0x{actual:02X} after {attempts} attempt(s)"
    )]
    VerifyFailed {
        /// Value that was written.
        expected: u8,
        /// Value last read back from the device.
        actual: u8,
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// Invalid port, register, line or value supplied by the caller.
    ///
    /// Raised before any network I/O.
    #[error("invalid {parameter}: {reason}")]
    Configuration {
        /// Name of the offending parameter.
        parameter: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl EioError {
    /// Creates a new `Protocol` error.
    ///
    /// # Example
    ///
    /// ```
    /// use etherio::EioError;
    ///
    /// let err = EioError::protocol("reply too short");
    /// assert_eq!(err.to_string(), "protocol error: reply too short");
    /// ```
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    /// Creates a new `Configuration` error.
    ///
    /// # Example
    ///
    /// ```
    /// use etherio::EioError;
    ///
    /// let err = EioError::configuration("port", "IO24T has ports A-C");
    /// ```
    pub fn configuration(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `TimedOut` error.
    pub fn timed_out(attempts: u32) -> Self {
        Self::TimedOut { attempts }
    }

    /// Creates a new `VerifyFailed` error.
    pub fn verify_failed(expected: u8, actual: u8, attempts: u32) -> Self {
        Self::VerifyFailed {
            expected,
            actual,
            attempts,
        }
    }

    /// Returns true for [`EioError::TimedOut`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// Returns true for [`EioError::VerifyFailed`].
    pub fn is_verify_failure(&self) -> bool {
        matches!(self, Self::VerifyFailed { .. })
    }

    /// Returns true when repeating the whole operation later may succeed.
    ///
    /// Configuration errors are caller bugs and transport errors usually
    /// mean the socket itself is unusable.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TimedOut { .. } | Self::VerifyFailed { .. } | Self::Protocol { .. }
        )
    }
}
