//! In-memory device emulation for testing without hardware.
//!
//! [`SimDevice`] models the register file, EEPROM and command handling of a
//! module. [`SimTransport`] puts a `SimDevice` behind the [`Transport`]
//! trait and adds a scripted fault model:
//!
//! | Fault | Effect |
//! |-------|--------|
//! | [`drop_replies`](SimTransport::drop_replies) | reply is lost |
//! | [`corrupt_replies`](SimTransport::corrupt_replies) | register value in the reply is inverted |
//! | [`garble_replies`](SimTransport::garble_replies) | reply is truncated to one byte |
//! | [`delay_replies`](SimTransport::delay_replies) | reply arrives just after the timeout |
//! | [`lose_writes`](SimTransport::lose_writes) | write datagram never reaches the device |
//! | [`set_unresponsive`](SimTransport::set_unresponsive) | device never replies |
//! | [`fail_sends`](SimTransport::fail_sends) | socket rejects every send |
//! | [`fail_send_after`](SimTransport::fail_send_after) | socket rejects one later send |
//! | [`pass_replies`](SimTransport::pass_replies) | delays the other reply faults by `n` replies |
//!
//! Receives never sleep: a missing reply is reported as a timeout at once,
//! so retry-heavy tests stay fast.
//!
//! # Example
//!
//! ```
//! use etherio::sim::SimTransport;
//! use etherio::{Device, DeviceKind, PortId, ReliabilityConfig};
//! use std::time::Duration;
//!
//! let mut sim = SimTransport::new(DeviceKind::Io24T);
//! sim.corrupt_replies(1);
//!
//! let config = ReliabilityConfig::default().with_retry_delay(Duration::ZERO);
//! let mut dev = Device::with_transport(DeviceKind::Io24T, sim, config);
//!
//! dev.port(PortId::A)?.set_val(0x42)?;
//! assert_eq!(dev.stats().verify_failures, 1);
//! assert_eq!(dev.port(PortId::A)?.get_val()?, 0x42);
//! # Ok::<(), etherio::EioError>(())
//! ```

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use crate::command::{EEPROM_WORDS, GUARD};
use crate::error::Result;
use crate::kind::DeviceKind;
use crate::register::{PortId, Register};
use crate::transport::Transport;

/// Emulated register file and command handler.
#[derive(Debug, Clone)]
pub struct SimDevice {
    kind: DeviceKind,
    registers: [[u8; 5]; 9],
    inputs: [u8; 9],
    eeprom: [[u8; 2]; EEPROM_WORDS as usize],
    eeprom_write_enabled: bool,
    mac: [u8; 6],
    firmware: [u8; 2],
    echo_writes: bool,
    resets: usize,
}

fn slot(register: Register) -> usize {
    match register {
        Register::Value => 0,
        Register::Direction => 1,
        Register::PullUp => 2,
        Register::Threshold => 3,
        Register::Schmitt => 4,
    }
}

impl SimDevice {
    /// Creates a device with every line configured as an output and driven low.
    pub fn new(kind: DeviceKind) -> Self {
        Self {
            kind,
            registers: [[0; 5]; 9],
            inputs: [0; 9],
            eeprom: [[0xFF; 2]; EEPROM_WORDS as usize],
            eeprom_write_enabled: !kind.uses_guarded_commands(),
            mac: [0x00, 0x0C, 0xC6, 0x00, 0x00, 0x01],
            firmware: [0x01, 0x00],
            echo_writes: false,
            resets: 0,
        }
    }

    /// Returns the variant being emulated.
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Returns the raw stored contents of a register.
    ///
    /// For the value register this is the driven (latched) byte, not what a
    /// read over the wire would report for input lines.
    pub fn register(&self, register: Register, port: PortId) -> u8 {
        self.registers[port.index()][slot(register)]
    }

    /// Stores a register value directly, bypassing the command path.
    pub fn set_register(&mut self, register: Register, port: PortId, value: u8) {
        self.registers[port.index()][slot(register)] = value;
    }

    /// Sets the externally driven level of a port's lines.
    ///
    /// Only lines configured as inputs report these levels.
    pub fn set_inputs(&mut self, port: PortId, levels: u8) {
        self.inputs[port.index()] = levels;
    }

    /// Value register as a read over the wire reports it.
    pub fn sensed(&self, port: PortId) -> u8 {
        let dir = self.register(Register::Direction, port);
        (self.register(Register::Value, port) & !dir) | (self.inputs[port.index()] & dir)
    }

    /// Returns one EEPROM word.
    pub fn eeprom_word(&self, address: u8) -> [u8; 2] {
        self.eeprom[usize::from(address) % self.eeprom.len()]
    }

    /// Stores one EEPROM word directly.
    pub fn set_eeprom_word(&mut self, address: u8, word: [u8; 2]) {
        let len = self.eeprom.len();
        self.eeprom[usize::from(address) % len] = word;
    }

    /// Returns whether the EEPROM currently accepts writes.
    pub fn eeprom_writable(&self) -> bool {
        self.eeprom_write_enabled
    }

    /// Sets the MAC reported by identify.
    pub fn set_mac(&mut self, mac: [u8; 6]) {
        self.mac = mac;
    }

    /// Makes the device echo register writes.
    pub fn set_echo_writes(&mut self, echo: bool) {
        self.echo_writes = echo;
    }

    /// Number of reset commands processed.
    pub fn resets(&self) -> usize {
        self.resets
    }

    fn port(&self, letter: u8) -> Option<PortId> {
        let port = PortId::from_upper(letter.to_ascii_uppercase())?;
        (port.index() < self.kind.port_count()).then_some(port)
    }

    fn register_exists(&self, register: Register) -> bool {
        !register.is_input_conditioning() || self.kind.has_input_conditioning()
    }

    fn read(&self, register: Register, port: PortId) -> Vec<u8> {
        let value = match register {
            Register::Value => self.sensed(port),
            _ => self.register(register, port),
        };
        let mut reply = register.prefix().to_vec();
        reply.push(port.upper());
        reply.push(value);
        reply
    }

    fn write(&mut self, frame: &[u8], register: Register, port: PortId, value: u8) -> Option<Vec<u8>> {
        self.set_register(register, port, value);
        self.echo_writes.then(|| frame.to_vec())
    }

    fn reset(&mut self) {
        self.resets += 1;
        for port in self.registers.iter_mut() {
            *port = [0x00, 0xFF, 0x00, 0x00, 0x00];
        }
    }

    /// Applies one request frame and returns the device's reply, if any.
    ///
    /// Unknown frames and frames addressed to missing ports are ignored, as
    /// the hardware does.
    pub fn handle(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        let guarded = self.kind.uses_guarded_commands();
        match *frame {
            [letter] if letter.is_ascii_lowercase() => {
                let port = self.port(letter)?;
                Some(self.read(Register::Value, port))
            }
            [b'\'', b'@'] if !guarded => {
                self.reset();
                None
            }
            [b'\'', b'@', g0, g1, g2] if guarded && [g0, g1, g2] == GUARD => {
                self.reset();
                None
            }
            [b'\'', b'1', g0, g1, g2] if guarded && [g0, g1, g2] == GUARD => {
                self.eeprom_write_enabled = true;
                None
            }
            [b'\'', b'0', g0, g1, g2] if guarded && [g0, g1, g2] == GUARD => {
                self.eeprom_write_enabled = false;
                None
            }
            [b'\'', b'R', address, _, _] if address < EEPROM_WORDS => {
                let [hi, lo] = self.eeprom_word(address);
                Some(vec![b'R', address, hi, lo])
            }
            [b'\'', b'W', address, hi, lo] if address < EEPROM_WORDS => {
                if self.eeprom_write_enabled {
                    self.set_eeprom_word(address, [hi, lo]);
                }
                None
            }
            [letter, value] if letter.is_ascii_uppercase() => {
                let port = self.port(letter)?;
                self.write(frame, Register::Value, port, value)
            }
            [prefix, letter] if letter.is_ascii_lowercase() => {
                let register = Register::from_prefix(prefix).filter(|r| self.register_exists(*r))?;
                let port = self.port(letter)?;
                Some(self.read(register, port))
            }
            [prefix, letter, value] if letter.is_ascii_uppercase() => {
                let register = Register::from_prefix(prefix).filter(|r| self.register_exists(*r))?;
                let port = self.port(letter)?;
                self.write(frame, register, port, value)
            }
            _ if self.is_identify(frame) => {
                let mut reply = self.kind.model_tag().to_vec();
                reply.extend_from_slice(&self.mac);
                reply.extend_from_slice(&self.firmware);
                Some(reply)
            }
            _ => None,
        }
    }

    fn is_identify(&self, frame: &[u8]) -> bool {
        let tag = self.kind.model_tag();
        match self.kind {
            DeviceKind::Io72T => frame.first() == Some(&b'\'') && &frame[1..] == tag,
            _ => frame == tag,
        }
    }
}

/// [`Transport`] backed by a [`SimDevice`] with scripted faults.
#[derive(Debug)]
pub struct SimTransport {
    device: SimDevice,
    unresponsive: bool,
    drop_replies: u32,
    corrupt_replies: u32,
    garble_replies: u32,
    delay_replies: u32,
    lose_writes: u32,
    pass_replies: u32,
    send_error: Option<io::ErrorKind>,
    send_fault: Option<(u32, io::ErrorKind)>,
    pending: VecDeque<Vec<u8>>,
    late: Vec<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    drained: usize,
}

fn take(counter: &mut u32) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

impl SimTransport {
    /// Creates a fault-free link to a fresh [`SimDevice`].
    pub fn new(kind: DeviceKind) -> Self {
        Self::with_device(SimDevice::new(kind))
    }

    /// Creates a fault-free link to `device`.
    pub fn with_device(device: SimDevice) -> Self {
        Self {
            device,
            unresponsive: false,
            drop_replies: 0,
            corrupt_replies: 0,
            garble_replies: 0,
            delay_replies: 0,
            lose_writes: 0,
            pass_replies: 0,
            send_error: None,
            send_fault: None,
            pending: VecDeque::new(),
            late: Vec::new(),
            sent: Vec::new(),
            drained: 0,
        }
    }

    /// Returns the emulated device.
    pub fn device(&self) -> &SimDevice {
        &self.device
    }

    /// Returns the emulated device mutably.
    pub fn device_mut(&mut self) -> &mut SimDevice {
        &mut self.device
    }

    /// Shorthand for [`SimDevice::register`].
    pub fn register(&self, register: Register, port: PortId) -> u8 {
        self.device.register(register, port)
    }

    /// Shorthand for [`SimDevice::set_register`].
    pub fn set_register(&mut self, register: Register, port: PortId, value: u8) {
        self.device.set_register(register, port, value);
    }

    /// Shorthand for [`SimDevice::set_inputs`].
    pub fn set_inputs(&mut self, port: PortId, levels: u8) {
        self.device.set_inputs(port, levels);
    }

    /// Shorthand for [`SimDevice::set_echo_writes`].
    pub fn set_echo_writes(&mut self, echo: bool) {
        self.device.set_echo_writes(echo);
    }

    /// Stops (or resumes) every reply.
    pub fn set_unresponsive(&mut self, unresponsive: bool) {
        self.unresponsive = unresponsive;
    }

    /// Loses the next `n` replies.
    pub fn drop_replies(&mut self, n: u32) {
        self.drop_replies = n;
    }

    /// Inverts the register value in the next `n` register replies.
    pub fn corrupt_replies(&mut self, n: u32) {
        self.corrupt_replies = n;
    }

    /// Truncates the next `n` replies to a single byte.
    pub fn garble_replies(&mut self, n: u32) {
        self.garble_replies = n;
    }

    /// Delivers the next `n` replies only after the receive has timed out.
    pub fn delay_replies(&mut self, n: u32) {
        self.delay_replies = n;
    }

    /// Loses the next `n` register writes before they reach the device.
    pub fn lose_writes(&mut self, n: u32) {
        self.lose_writes = n;
    }

    /// Makes every send fail with `kind`.
    pub fn fail_sends(&mut self, kind: io::ErrorKind) {
        self.send_error = Some(kind);
    }

    /// Lets `skip` sends through, fails the next one with `kind`, then
    /// recovers.
    pub fn fail_send_after(&mut self, skip: u32, kind: io::ErrorKind) {
        self.send_fault = Some((skip, kind));
    }

    /// Lets the next `n` replies through before any scripted reply fault
    /// applies.
    pub fn pass_replies(&mut self, n: u32) {
        self.pass_replies = n;
    }

    /// Every frame sent so far, in order.
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    /// Forgets the sent-frame log.
    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }

    /// Number of stale frames discarded by [`Transport::drain`].
    pub fn drained(&self) -> usize {
        self.drained
    }

    fn deliver(&mut self, mut reply: Vec<u8>) {
        if self.unresponsive {
            return;
        }
        if take(&mut self.pass_replies) {
            self.pending.push_back(reply);
            return;
        }
        if take(&mut self.drop_replies) {
            return;
        }
        if take(&mut self.garble_replies) {
            reply.truncate(1);
        } else if is_register_reply(&reply) && take(&mut self.corrupt_replies) {
            if let Some(value) = reply.last_mut() {
                *value = !*value;
            }
        }
        if take(&mut self.delay_replies) {
            self.late.push(reply);
        } else {
            self.pending.push_back(reply);
        }
    }
}

fn is_register_reply(reply: &[u8]) -> bool {
    match reply {
        [letter, _] => letter.is_ascii_uppercase(),
        [prefix, letter, _] => Register::from_prefix(*prefix).is_some() && letter.is_ascii_uppercase(),
        _ => false,
    }
}

fn is_register_write(frame: &[u8]) -> bool {
    match frame {
        [letter, _] => (b'A'..=b'I').contains(letter),
        [prefix, letter, _] => Register::from_prefix(*prefix).is_some() && (b'A'..=b'I').contains(letter),
        _ => false,
    }
}

impl Transport for SimTransport {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        if let Some(kind) = self.send_error {
            return Err(io::Error::from(kind).into());
        }
        if let Some((skip, kind)) = self.send_fault {
            if skip == 0 {
                self.send_fault = None;
                return Err(io::Error::from(kind).into());
            }
            self.send_fault = Some((skip - 1, kind));
        }
        self.sent.push(frame.to_vec());

        if is_register_write(frame) && take(&mut self.lose_writes) {
            return Ok(());
        }
        if let Some(reply) = self.device.handle(frame) {
            self.deliver(reply);
        }
        Ok(())
    }

    fn receive(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>> {
        if let Some(reply) = self.pending.pop_front() {
            return Ok(Some(reply));
        }
        self.pending.extend(self.late.drain(..));
        Ok(None)
    }

    fn drain(&mut self) -> Result<usize> {
        let n = self.pending.len();
        self.pending.clear();
        self.drained += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_value() {
        let mut dev = SimDevice::new(DeviceKind::Io24T);
        assert_eq!(dev.handle(b"A\x55"), None);
        assert_eq!(dev.handle(b"a"), Some(b"A\x55".to_vec()));
    }

    #[test]
    fn test_input_lines_report_sensed_levels() {
        let mut dev = SimDevice::new(DeviceKind::Io24T);
        dev.handle(b"!B\x0F");
        dev.handle(b"B\xFF");
        dev.set_inputs(PortId::B, 0x05);
        assert_eq!(dev.handle(b"b"), Some(b"B\xF5".to_vec()));
        assert_eq!(dev.register(Register::Value, PortId::B), 0xFF);
    }

    #[test]
    fn test_missing_port_and_register_ignored() {
        let mut dev = SimDevice::new(DeviceKind::Io24T);
        assert_eq!(dev.handle(b"d"), None);
        assert_eq!(dev.handle(b"#a"), None);

        let mut dev = SimDevice::new(DeviceKind::Io24R);
        assert_eq!(dev.handle(b"#a"), Some(b"#A\x00".to_vec()));
    }

    #[test]
    fn test_reset() {
        let mut dev = SimDevice::new(DeviceKind::Io24R);
        dev.handle(b"A\x10");
        assert_eq!(dev.handle(b"'@"), None);
        assert_eq!(dev.resets(), 0);
        dev.handle(b"'@\x00\xAA\x55");
        assert_eq!(dev.resets(), 1);
        assert_eq!(dev.register(Register::Value, PortId::A), 0);
        assert_eq!(dev.register(Register::Direction, PortId::A), 0xFF);
    }

    #[test]
    fn test_eeprom_write_guard() {
        let mut dev = SimDevice::new(DeviceKind::Io24R);
        dev.handle(b"'W\x06\x01\x02");
        assert_eq!(dev.eeprom_word(6), [0xFF, 0xFF]);

        dev.handle(b"'1\x00\xAA\x55");
        dev.handle(b"'W\x06\x01\x02");
        assert_eq!(dev.handle(b"'R\x06\x00\x00"), Some(b"R\x06\x01\x02".to_vec()));
    }

    #[test]
    fn test_identify() {
        let mut dev = SimDevice::new(DeviceKind::Io72T);
        let reply = dev.handle(b"'IO72").unwrap();
        assert_eq!(&reply[..4], b"IO72");
        assert_eq!(reply.len(), 12);
        assert_eq!(dev.handle(b"IO24"), None);
    }

    #[test]
    fn test_delayed_reply_shows_up_late() {
        let mut sim = SimTransport::new(DeviceKind::Io24T);
        sim.delay_replies(1);
        sim.send(b"a").unwrap();
        assert_eq!(sim.receive(Duration::ZERO).unwrap(), None);
        assert_eq!(sim.drain().unwrap(), 1);
        assert_eq!(sim.drained(), 1);
    }

    #[test]
    fn test_fault_counters() {
        let mut sim = SimTransport::new(DeviceKind::Io24T);
        sim.drop_replies(1);
        sim.corrupt_replies(1);
        sim.send(b"a").unwrap();
        assert_eq!(sim.receive(Duration::ZERO).unwrap(), None);
        sim.send(b"a").unwrap();
        assert_eq!(sim.receive(Duration::ZERO).unwrap(), Some(b"A\xFF".to_vec()));
        sim.send(b"a").unwrap();
        assert_eq!(sim.receive(Duration::ZERO).unwrap(), Some(b"A\x00".to_vec()));
        assert_eq!(sim.sent().len(), 3);
    }

    #[test]
    fn test_passed_replies_precede_faults() {
        let mut sim = SimTransport::new(DeviceKind::Io24T);
        sim.pass_replies(1);
        sim.drop_replies(1);
        sim.send(b"a").unwrap();
        assert_eq!(sim.receive(Duration::ZERO).unwrap(), Some(b"A\x00".to_vec()));
        sim.send(b"a").unwrap();
        assert_eq!(sim.receive(Duration::ZERO).unwrap(), None);
    }

    #[test]
    fn test_single_send_failure() {
        let mut sim = SimTransport::new(DeviceKind::Io24T);
        sim.fail_send_after(1, io::ErrorKind::ConnectionReset);
        sim.send(b"a").unwrap();
        assert!(sim.send(b"b").is_err());
        sim.send(b"c").unwrap();
        assert_eq!(sim.sent(), &[b"a".to_vec(), b"c".to_vec()]);
    }
}
