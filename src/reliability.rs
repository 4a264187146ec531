//! Write-verify-retry controller.
//!
//! The [`Controller`] turns a lossy datagram [`Transport`] into something
//! that behaves like synchronous register access. One logical operation is
//! a bounded sequence of attempts:
//!
//! ```text
//! Idle -> Sent -> AwaitingReply -> Decoded ---------------------> done
//!                       |            | (write, validation on)
//!                       |            v
//!                       |         Verifying -> Matched ---------> done
//!                       |            | mismatch
//!                       v            v
//!                 TimedOutAttempt / Mismatch -> Idle (retry) or Failed
//! ```
//!
//! - `attempts = 1 + retries`, the same for reads and writes
//! - a fixed `retry_delay` separates attempts, no backoff
//! - every attempt, the first included, starts by discarding frames already
//!   queued on the transport, so a late reply to an earlier request is never
//!   taken as the answer to the current one
//! - a verified write re-sends the write itself after a mismatch, not only
//!   the read-back
//! - timeouts, malformed replies and mismatches are absorbed as retries;
//!   socket errors are returned at once
//! - once the budget is spent the error reflects every attempt: any
//!   mismatch gives `VerifyFailed`, otherwise any malformed reply gives
//!   `Protocol`, and only a device that never answered gives `TimedOut`
//!
//! Statistics are committed per attempt so a caller inspecting them during a
//! long retry sequence sees real progress.
//!
//! # Concurrency
//!
//! The controller assumes exactly one operation in flight. It takes `&mut
//! self` everywhere, so the borrow checker enforces this within a thread; to
//! share a device between threads wrap it in a `Mutex`.

use std::thread;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::command::Command;
use crate::error::{EioError, Result};
use crate::register::{PortId, Register};
use crate::response::{decode_echo, decode_register};
use crate::stats::{StatEvent, Stats, StatsRecord};
use crate::transport::Transport;

/// Default number of retries after the first attempt.
pub const DEFAULT_RETRIES: u32 = 10;

/// Default pause between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Default wait for each reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Retry and validation tunables for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReliabilityConfig {
    /// Additional attempts after the first.
    pub retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Wait for each reply.
    pub timeout: Duration,
    /// Read back every register write and retry on mismatch.
    pub write_validate: bool,
    /// Expect the device to echo register writes.
    ///
    /// The legacy command set does not acknowledge writes; enable this only
    /// for firmware or gateways that echo them.
    pub await_write_echo: bool,
    /// When verifying a value register, compare only the output lines.
    ///
    /// Costs one extra direction read per write.
    pub mask_input_lines: bool,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            timeout: DEFAULT_TIMEOUT,
            write_validate: true,
            await_write_echo: false,
            mask_input_lines: false,
        }
    }
}

impl ReliabilityConfig {
    /// Total attempts per operation.
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Worst-case time one operation can block.
    pub fn worst_case(&self) -> Duration {
        (self.timeout + self.retry_delay) * self.attempts()
    }

    /// Sets the retry count.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the pause between attempts.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Sets the reply timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables or disables write read-back.
    pub fn with_write_validate(mut self, write_validate: bool) -> Self {
        self.write_validate = write_validate;
        self
    }

    /// Enables or disables waiting for write echoes.
    pub fn with_write_echo(mut self, await_write_echo: bool) -> Self {
        self.await_write_echo = await_write_echo;
        self
    }

    /// Enables or disables masking input lines during value verification.
    pub fn with_input_masking(mut self, mask_input_lines: bool) -> Self {
        self.mask_input_lines = mask_input_lines;
        self
    }
}

/// Why one attempt did not complete.
#[derive(Debug)]
enum Failure {
    Timeout,
    Malformed(EioError),
    Mismatch { expected: u8, actual: u8 },
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Timeout => write!(f, "no reply"),
            Failure::Malformed(e) => write!(f, "{}", e),
            Failure::Mismatch { expected, actual } => write!(
                f,
                "read back 0x{:02X}, expected 0x{:02X}",
                actual, expected
            ),
        }
    }
}

/// Outcome of one attempt; the outer `Result` carries socket errors.
type Attempt<V> = std::result::Result<V, Failure>;

/// Runs logical operations over a transport with retries and verification.
pub struct Controller<T> {
    transport: T,
    config: ReliabilityConfig,
    stats: Stats,
}

impl<T: Transport> Controller<T> {
    /// Creates a controller with zeroed statistics.
    pub fn new(transport: T, config: ReliabilityConfig) -> Self {
        Self {
            transport,
            config,
            stats: Stats::new(),
        }
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &ReliabilityConfig {
        &self.config
    }

    /// Returns the configuration for adjustment.
    pub fn config_mut(&mut self) -> &mut ReliabilityConfig {
        &mut self.config
    }

    /// Returns a copy of the statistics.
    pub fn stats(&self) -> StatsRecord {
        self.stats.snapshot()
    }

    /// Resets the statistics to zero.
    pub fn clear_stats(&mut self) {
        self.stats.clear();
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the transport mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consumes the controller and returns the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Reads one register.
    ///
    /// # Errors
    ///
    /// `TimedOut` or `Protocol` once every attempt failed, `Transport` at once.
    pub fn read_register(&mut self, register: Register, port: PortId) -> Result<u8> {
        let command = Command::read_register(register, port);
        self.query(&command, |data| decode_register(register, port, data))
    }

    /// Writes one register, verifying it when `write_validate` is set.
    ///
    /// # Errors
    ///
    /// `VerifyFailed` if the device kept reading back another value,
    /// `TimedOut` or `Protocol` if it stopped answering, `Transport` at once.
    pub fn write_register(&mut self, register: Register, port: PortId, value: u8) -> Result<()> {
        let command = Command::write_register(register, port, value);
        let Some(verify) = command.verify_read().filter(|_| self.config.write_validate) else {
            return self.send(&command);
        };

        let mask = if self.config.mask_input_lines && register == Register::Value {
            !self.read_register(Register::Direction, port)?
        } else {
            0xFF
        };

        self.run(&command, |link| {
            if let Err(failure) = link.try_write(&command)? {
                return Ok(Err(failure));
            }
            let actual = match link.try_query(&verify, |data| decode_register(register, port, data))? {
                Ok(actual) => actual,
                Err(failure) => return Ok(Err(failure)),
            };
            if actual & mask == value & mask {
                Ok(Ok(()))
            } else {
                link.stats.record(StatEvent::VerifyFailure);
                Ok(Err(Failure::Mismatch {
                    expected: value,
                    actual,
                }))
            }
        })
    }

    /// Sends a command that gets no read-back, with the retry policy applied.
    ///
    /// Register writes wait for an echo when `await_write_echo` is set; every
    /// other command is done once it has been sent.
    ///
    /// # Errors
    ///
    /// `Configuration` without any I/O if `command` expects a reply (use
    /// [`query`](Controller::query)). `TimedOut` or `Protocol` if an awaited
    /// echo never arrived, `Transport` at once.
    pub fn send(&mut self, command: &Command) -> Result<()> {
        if command.expects_reply() {
            return Err(EioError::configuration(
                "command",
                format!("'{}' expects a reply", command),
            ));
        }
        self.run(command, |link| link.try_write(command))
    }

    /// Sends a command that expects a reply and decodes it with `decode`.
    ///
    /// A decode error counts as a failed attempt and is retried.
    ///
    /// # Errors
    ///
    /// `TimedOut` or `Protocol` once every attempt failed, `Transport` at once.
    pub fn query<V>(
        &mut self,
        command: &Command,
        decode: impl Fn(&[u8]) -> Result<V>,
    ) -> Result<V> {
        self.run(command, |link| link.try_query(command, &decode))
    }

    fn run<V>(
        &mut self,
        command: &Command,
        mut attempt: impl FnMut(&mut Self) -> Result<Attempt<V>>,
    ) -> Result<V> {
        self.stats.record(StatEvent::Operation);
        let attempts = self.config.attempts();
        let mut cause = String::new();
        let mut mismatch = None;
        let mut malformed = None;

        for n in 0..attempts {
            if n > 0 {
                self.stats.record(StatEvent::Retry);
                debug!(command = %command, attempt = n + 1, of = attempts, cause = %cause, "retrying");
                if !self.config.retry_delay.is_zero() {
                    thread::sleep(self.config.retry_delay);
                }
            }
            self.transport.drain().map_err(|e| self.transport_error(command, e))?;

            match attempt(self) {
                Ok(Ok(value)) => {
                    self.stats.observe_retries(n);
                    trace!(command = %command, attempts = n + 1, "done");
                    return Ok(value);
                }
                Ok(Err(failure)) => {
                    cause = failure.to_string();
                    match failure {
                        Failure::Timeout => {}
                        Failure::Malformed(e) => malformed = Some(e),
                        Failure::Mismatch { expected, actual } => mismatch = Some((expected, actual)),
                    }
                }
                Err(e) => return Err(self.transport_error(command, e)),
            }
        }

        self.stats.record(StatEvent::Failure);
        self.stats.observe_retries(attempts - 1);
        let error = match (mismatch, malformed) {
            (Some((expected, actual)), _) => EioError::verify_failed(expected, actual, attempts),
            (None, Some(e)) => e,
            (None, None) => EioError::timed_out(attempts),
        };
        warn!(command = %command, attempts, error = %error, "giving up");
        Err(error)
    }

    fn transport_error(&mut self, command: &Command, error: EioError) -> EioError {
        if matches!(error, EioError::Transport(_)) {
            self.stats.record(StatEvent::TransportError);
        }
        warn!(command = %command, error = %error, "transport failure");
        error
    }

    /// Sends `command`, then waits for its reply.
    fn exchange(&mut self, command: &Command) -> Result<Option<Vec<u8>>> {
        self.transport.send(&command.to_bytes())?;
        self.stats.record(StatEvent::Sent);

        let reply = self.transport.receive(self.config.timeout)?;
        match reply {
            Some(_) => self.stats.record(StatEvent::Received),
            None => self.stats.record(StatEvent::Timeout),
        }
        Ok(reply)
    }

    fn try_query<V>(
        &mut self,
        command: &Command,
        decode: impl Fn(&[u8]) -> Result<V>,
    ) -> Result<Attempt<V>> {
        let Some(data) = self.exchange(command)? else {
            return Ok(Err(Failure::Timeout));
        };
        Ok(decode(&data).map_err(|e| self.malformed(command, e)))
    }

    fn try_write(&mut self, command: &Command) -> Result<Attempt<()>> {
        let echoed = self.config.await_write_echo && command.verify_read().is_some();
        if !echoed {
            self.transport.send(&command.to_bytes())?;
            self.stats.record(StatEvent::Sent);
            return Ok(Ok(()));
        }

        let Some(data) = self.exchange(command)? else {
            return Ok(Err(Failure::Timeout));
        };
        Ok(decode_echo(command, &data).map_err(|e| self.malformed(command, e)))
    }

    fn malformed(&mut self, command: &Command, error: EioError) -> Failure {
        self.stats.record(StatEvent::ProtocolError);
        debug!(command = %command, error = %error, "rejected reply");
        Failure::Malformed(error)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Controller<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("transport", &self.transport)
            .field("config", &self.config)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::DeviceKind;
    use crate::sim::SimTransport;

    fn quick() -> ReliabilityConfig {
        ReliabilityConfig::default()
            .with_retry_delay(Duration::ZERO)
            .with_timeout(Duration::from_millis(1))
    }

    fn controller(sim: SimTransport, config: ReliabilityConfig) -> Controller<SimTransport> {
        Controller::new(sim, config)
    }

    #[test]
    fn test_defaults() {
        let config = ReliabilityConfig::default();
        assert_eq!(config.retries, 10);
        assert_eq!(config.attempts(), 11);
        assert_eq!(config.retry_delay, Duration::from_millis(10));
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert!(config.write_validate);
        assert!(!config.await_write_echo);
        assert!(!config.mask_input_lines);
        assert_eq!(config.worst_case(), Duration::from_millis(1010) * 11);
    }

    #[test]
    fn test_read_clean_link() {
        let mut sim = SimTransport::new(DeviceKind::Io24T);
        sim.set_register(Register::Value, PortId::B, 0x5A);
        let mut link = controller(sim, quick());

        assert_eq!(link.read_register(Register::Value, PortId::B).unwrap(), 0x5A);
        let stats = link.stats();
        assert_eq!(stats.commands_sent, 1);
        assert_eq!(stats.replies_received, 1);
        assert_eq!(stats.retries, 0);
    }

    #[test]
    fn test_read_retries_lost_replies() {
        let mut sim = SimTransport::new(DeviceKind::Io24T);
        sim.drop_replies(2);
        let mut link = controller(sim, quick().with_retries(2));

        assert_eq!(link.read_register(Register::Value, PortId::A).unwrap(), 0);
        let stats = link.stats();
        assert_eq!(stats.commands_sent, 3);
        assert_eq!(stats.timeouts, 2);
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.max_retries, 2);
        assert_eq!(stats.total_failures, 0);
    }

    #[test]
    fn test_read_exhausts_budget() {
        let mut sim = SimTransport::new(DeviceKind::Io24T);
        sim.set_unresponsive(true);
        let mut link = controller(sim, quick().with_retries(3));

        let err = link.read_register(Register::Value, PortId::A).unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(err, EioError::TimedOut { attempts: 4 }));

        let stats = link.stats();
        assert_eq!(stats.commands_sent, 4);
        assert_eq!(stats.timeouts, 4);
        assert_eq!(stats.retries, 3);
        assert_eq!(stats.total_failures, 1);
    }

    #[test]
    fn test_garbled_reply_is_retried() {
        let mut sim = SimTransport::new(DeviceKind::Io24T);
        sim.set_register(Register::Direction, PortId::C, 0xF0);
        sim.garble_replies(1);
        let mut link = controller(sim, quick());

        assert_eq!(link.read_register(Register::Direction, PortId::C).unwrap(), 0xF0);
        let stats = link.stats();
        assert_eq!(stats.protocol_errors, 1);
        assert_eq!(stats.retries, 1);
    }

    #[test]
    fn test_persistent_garbling_surfaces_protocol_error() {
        let mut sim = SimTransport::new(DeviceKind::Io24T);
        sim.garble_replies(u32::MAX);
        let mut link = controller(sim, quick().with_retries(1));

        let err = link.read_register(Register::Value, PortId::A).unwrap_err();
        assert!(matches!(err, EioError::Protocol { .. }));
        assert_eq!(link.stats().total_failures, 1);
    }

    #[test]
    fn test_verified_write_retries_mismatch() {
        let mut sim = SimTransport::new(DeviceKind::Io24T);
        sim.corrupt_replies(2);
        let mut link = controller(sim, quick());

        link.write_register(Register::Value, PortId::A, 0x81).unwrap();
        let stats = link.stats();
        assert_eq!(stats.verify_failures, 2);
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.commands_sent, 6);
        assert_eq!(link.transport().register(Register::Value, PortId::A), 0x81);
    }

    #[test]
    fn test_verified_write_gives_up() {
        let mut sim = SimTransport::new(DeviceKind::Io24T);
        sim.lose_writes(u32::MAX);
        let mut link = controller(sim, quick().with_retries(2));

        let err = link.write_register(Register::Value, PortId::A, 0x01).unwrap_err();
        assert!(matches!(
            err,
            EioError::VerifyFailed {
                expected: 0x01,
                actual: 0x00,
                attempts: 3
            }
        ));
        let stats = link.stats();
        assert_eq!(stats.verify_failures, 3);
        assert_eq!(stats.total_failures, 1);
    }

    #[test]
    fn test_unvalidated_write_sends_once() {
        let mut sim = SimTransport::new(DeviceKind::Io24T);
        sim.lose_writes(1);
        let mut link = controller(sim, quick().with_write_validate(false));

        link.write_register(Register::Value, PortId::A, 0x22).unwrap();
        assert_eq!(link.transport().sent().len(), 1);
        assert_eq!(link.stats().commands_sent, 1);
        assert_eq!(link.transport().register(Register::Value, PortId::A), 0x00);
    }

    #[test]
    fn test_lost_echo_then_verified() {
        let mut sim = SimTransport::new(DeviceKind::Io24T);
        sim.set_echo_writes(true);
        sim.drop_replies(1);
        let config = quick().with_retries(2).with_write_echo(true);
        let mut link = controller(sim, config);

        link.write_register(Register::Value, PortId::A, 0x3C).unwrap();
        let stats = link.stats();
        assert_eq!(stats.commands_sent, 3);
        assert_eq!(stats.retries, 1);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.verify_failures, 0);
    }

    #[test]
    fn test_input_masking_ignores_sensed_lines() {
        let mut sim = SimTransport::new(DeviceKind::Io24T);
        sim.set_register(Register::Direction, PortId::C, 0xF0);
        sim.set_inputs(PortId::C, 0xA0);
        let mut link = controller(sim, quick().with_retries(0).with_input_masking(true));

        link.write_register(Register::Value, PortId::C, 0x05).unwrap();
        assert_eq!(link.read_register(Register::Value, PortId::C).unwrap(), 0xA5);
        assert_eq!(link.stats().verify_failures, 0);
    }

    #[test]
    fn test_without_masking_sensed_lines_fail_verify() {
        let mut sim = SimTransport::new(DeviceKind::Io24T);
        sim.set_register(Register::Direction, PortId::C, 0xF0);
        sim.set_inputs(PortId::C, 0xA0);
        let mut link = controller(sim, quick().with_retries(0));

        let err = link.write_register(Register::Value, PortId::C, 0x05).unwrap_err();
        assert!(err.is_verify_failure());
    }

    #[test]
    fn test_stale_reply_is_drained() {
        let mut sim = SimTransport::new(DeviceKind::Io24T);
        sim.set_register(Register::Value, PortId::A, 0x11);
        sim.set_register(Register::Value, PortId::B, 0x22);
        sim.delay_replies(1);
        let mut link = controller(sim, quick());

        assert_eq!(link.read_register(Register::Value, PortId::A).unwrap(), 0x11);
        assert_eq!(link.transport().drained(), 1);
        assert_eq!(link.read_register(Register::Value, PortId::B).unwrap(), 0x22);
        assert_eq!(link.stats().protocol_errors, 0);
    }

    #[test]
    fn test_transport_error_is_not_retried() {
        let mut sim = SimTransport::new(DeviceKind::Io24T);
        sim.fail_sends(std::io::ErrorKind::ConnectionRefused);
        let mut link = controller(sim, quick());

        let err = link.read_register(Register::Value, PortId::A).unwrap_err();
        assert!(matches!(err, EioError::Transport(_)));
        let stats = link.stats();
        assert_eq!(stats.transport_errors, 1);
        assert_eq!(stats.retries, 0);
        assert_eq!(stats.total_failures, 0);
    }

    #[test]
    fn test_late_reply_from_failed_operation_is_discarded() {
        let mut sim = SimTransport::new(DeviceKind::Io24T);
        sim.delay_replies(1);
        let mut link = controller(sim, quick().with_retries(0));

        let err = link.read_register(Register::Value, PortId::A).unwrap_err();
        assert!(err.is_timeout());

        link.transport_mut().set_register(Register::Value, PortId::A, 0x99);
        assert_eq!(link.read_register(Register::Value, PortId::A).unwrap(), 0x99);
        assert_eq!(link.transport().drained(), 1);
    }

    #[test]
    fn test_mismatch_then_silence_reports_verify_failure() {
        let mut sim = SimTransport::new(DeviceKind::Io24T);
        sim.lose_writes(u32::MAX);
        sim.pass_replies(1);
        sim.drop_replies(1);
        let mut link = controller(sim, quick().with_retries(1));

        let err = link.write_register(Register::Value, PortId::B, 0x40).unwrap_err();
        assert!(matches!(
            err,
            EioError::VerifyFailed {
                expected: 0x40,
                actual: 0x00,
                attempts: 2
            }
        ));
        let stats = link.stats();
        assert_eq!(stats.verify_failures, 1);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.total_failures, 1);
    }

    #[test]
    fn test_silence_then_garbling_reports_protocol_error() {
        let mut sim = SimTransport::new(DeviceKind::Io24T);
        sim.drop_replies(1);
        sim.garble_replies(1);
        let mut link = controller(sim, quick().with_retries(1));

        let err = link.read_register(Register::Value, PortId::A).unwrap_err();
        assert!(matches!(err, EioError::Protocol { .. }));
        assert_eq!(link.stats().timeouts, 1);
        assert_eq!(link.stats().protocol_errors, 1);
    }

    #[test]
    fn test_stats_advance_between_attempts() {
        let mut sim = SimTransport::new(DeviceKind::Io24T);
        sim.drop_replies(2);
        let mut link = controller(sim, quick().with_retries(2));
        let command = Command::read_register(Register::Value, PortId::A);

        let mut seen = Vec::new();
        let value = link
            .run(&command, |link| {
                let stats = link.stats();
                seen.push((stats.commands_sent, stats.timeouts, stats.retries));
                link.try_query(&command, |data| decode_register(Register::Value, PortId::A, data))
            })
            .unwrap();

        assert_eq!(value, 0);
        assert_eq!(seen, vec![(0, 0, 0), (1, 1, 1), (2, 2, 2)]);
    }

    #[test]
    fn test_send_rejects_commands_with_replies() {
        let sim = SimTransport::new(DeviceKind::Io24T);
        let mut link = controller(sim, quick());

        let err = link.send(&Command::read_port(PortId::A)).unwrap_err();
        assert!(matches!(err, EioError::Configuration { .. }));
        assert!(link.transport().sent().is_empty());
        assert_eq!(link.stats().operations, 0);
    }

    #[test]
    fn test_send_without_reply() {
        let sim = SimTransport::new(DeviceKind::Io24R);
        let mut link = controller(sim, quick());
        link.send(&Command::reset(DeviceKind::Io24R)).unwrap();
        assert_eq!(link.stats().commands_sent, 1);
        assert_eq!(link.stats().operations, 1);
    }
}
