//! End-to-end tests over a real UDP socket.
//!
//! A thread on 127.0.0.1 plays the module with a [`SimDevice`] and can be
//! told to swallow or delay replies.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use etherio::sim::SimDevice;
use etherio::{Device, DeviceConfig, DeviceKind, EioError, PortId, StatsRecord, DIR_ALL_OUTPUT};

struct Emulator {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    swallow: Arc<AtomicU32>,
    delay: Arc<AtomicU32>,
    handle: Option<JoinHandle<SimDevice>>,
}

impl Emulator {
    fn start(kind: DeviceKind) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let addr = socket.local_addr().unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let swallow = Arc::new(AtomicU32::new(0));
        let delay = Arc::new(AtomicU32::new(0));

        let handle = {
            let (stop, swallow, delay) = (stop.clone(), swallow.clone(), delay.clone());
            thread::spawn(move || {
                let mut device = SimDevice::new(kind);
                let mut buf = [0u8; 64];
                while !stop.load(Ordering::Relaxed) {
                    let Ok((n, peer)) = socket.recv_from(&mut buf) else {
                        continue;
                    };
                    let Some(reply) = device.handle(&buf[..n]) else {
                        continue;
                    };
                    if take(&swallow) {
                        continue;
                    }
                    if take(&delay) {
                        thread::sleep(Duration::from_millis(80));
                    }
                    socket.send_to(&reply, peer).unwrap();
                }
                device
            })
        };

        Self {
            addr,
            stop,
            swallow,
            delay,
            handle: Some(handle),
        }
    }

    fn config(&self, kind: DeviceKind) -> DeviceConfig {
        DeviceConfig::from_addr(self.addr, kind)
            .with_timeout(Duration::from_millis(50))
            .with_retries(3)
            .with_retry_delay(Duration::from_millis(1))
    }

    fn finish(mut self) -> SimDevice {
        self.stop.store(true, Ordering::Relaxed);
        self.handle.take().unwrap().join().unwrap()
    }
}

fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
        .is_ok()
}

#[test]
fn test_verified_writes_over_udp() {
    let emu = Emulator::start(DeviceKind::Io24T);
    let mut dev = Device::connect(emu.config(DeviceKind::Io24T)).unwrap();

    for &id in dev.ports() {
        let mut port = dev.port(id).unwrap();
        port.set_dir(DIR_ALL_OUTPUT).unwrap();
        port.set_val(0xC3).unwrap();
        assert_eq!(port.get_val().unwrap(), 0xC3);
    }
    let stats = dev.stats();
    assert_eq!(stats.retries, 0);
    assert_eq!(stats.operations, 9);

    let device = emu.finish();
    assert_eq!(device.register(etherio::Register::Value, PortId::C), 0xC3);
}

#[test]
fn test_lost_reply_is_retried_over_udp() {
    let emu = Emulator::start(DeviceKind::Io72T);
    emu.swallow.store(1, Ordering::Relaxed);
    let mut dev = Device::connect(emu.config(DeviceKind::Io72T)).unwrap();

    assert_eq!(dev.port(PortId::I).unwrap().get_dir().unwrap(), 0x00);
    let stats = dev.stats();
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.retries, 1);
    assert_eq!(stats.commands_sent, 2);
    emu.finish();
}

#[test]
fn test_late_reply_is_drained_over_udp() {
    let emu = Emulator::start(DeviceKind::Io24T);
    emu.delay.store(1, Ordering::Relaxed);
    let mut dev = Device::connect(emu.config(DeviceKind::Io24T)).unwrap();

    dev.port(PortId::A).unwrap().set_val(0x11).unwrap();
    dev.port(PortId::B).unwrap().set_val(0x22).unwrap();
    assert_eq!(dev.port(PortId::A).unwrap().get_val().unwrap(), 0x11);
    assert_eq!(dev.port(PortId::B).unwrap().get_val().unwrap(), 0x22);
    assert_eq!(dev.stats().total_failures, 0);
    emu.finish();
}

#[test]
fn test_silent_device_times_out() {
    let emu = Emulator::start(DeviceKind::Io24T);
    emu.swallow.store(u32::MAX, Ordering::Relaxed);
    let config = emu.config(DeviceKind::Io24T).with_retries(1);
    let mut dev = Device::connect(config).unwrap();

    let err = dev.identify().unwrap_err();
    assert!(matches!(err, EioError::TimedOut { attempts: 2 }));
    assert_eq!(dev.stats().total_failures, 1);
    emu.finish();
}

#[test]
fn test_eeprom_and_identify_over_udp() {
    let emu = Emulator::start(DeviceKind::Io24R);
    let mut dev = Device::connect(emu.config(DeviceKind::Io24R)).unwrap();

    let info = dev.identify().unwrap();
    assert_eq!(&info.model, b"IO24");
    assert_eq!(info.firmware, Some([0x01, 0x00]));

    dev.eeprom()
        .set_ipgway(Ipv4Addr::new(192, 168, 7, 1))
        .unwrap();
    assert_eq!(dev.eeprom().ipgway().unwrap(), Ipv4Addr::new(192, 168, 7, 1));

    dev.reset().unwrap();
    let device = emu.finish();
    assert_eq!(device.resets(), 1);
}

#[test]
fn test_bad_port_sends_nothing() {
    let emu = Emulator::start(DeviceKind::Io24T);
    let mut dev = Device::connect(emu.config(DeviceKind::Io24T)).unwrap();

    assert!(matches!(
        dev.port_index(5),
        Err(EioError::Configuration { .. })
    ));
    assert_eq!(dev.stats(), StatsRecord::default());
    emu.finish();
}
