//! Datagram transport for Ether IO communication.
//!
//! This module provides the [`Transport`] trait and its UDP implementation,
//! [`UdpTransport`]. The transport layer is completely separated from the
//! command set: it only knows about sockets and bytes.
//!
//! # Design
//!
//! - **Protocol agnostic** - moves opaque frames, no command knowledge
//! - **Synchronous** - blocking receive bounded by a per-call timeout
//! - **Simple** - one socket, one remote address, no connection pooling
//!
//! A receive that hits the timeout is an ordinary outcome (`Ok(None)`), not
//! an error. Only socket-level failures are reported as errors.
//!
//! # Constants
//!
//! - [`DEFAULT_UDP_PORT`] - Factory default UDP port (2424)
//! - [`DEFAULT_DEVICE_IP`] - Factory default jumper address (10.10.10.10)
//! - [`MAX_PACKET_SIZE`] - Receive buffer size (1024 bytes)
//!
//! # Example
//!
//! ```no_run
//! use etherio::{Transport, UdpTransport};
//! use std::time::Duration;
//!
//! let mut transport = UdpTransport::new("192.168.1.123:2424".parse().unwrap()).unwrap();
//!
//! // Ask port A for its value
//! transport.send(b"a").unwrap();
//! match transport.receive(Duration::from_millis(500)).unwrap() {
//!     Some(reply) => println!("reply: {:02X?}", reply),
//!     None => println!("timed out"),
//! }
//! ```

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream, UdpSocket};
use std::time::Duration;

use tracing::trace;

use crate::error::Result;

/// Factory default UDP port.
pub const DEFAULT_UDP_PORT: u16 = 2424;

/// Factory default device address selected by jumper.
pub const DEFAULT_DEVICE_IP: Ipv4Addr = Ipv4Addr::new(10, 10, 10, 10);

/// Receive buffer size; replies are far smaller.
pub const MAX_PACKET_SIZE: usize = 1024;

/// A bidirectional frame channel to one device.
///
/// Implementations send at most one frame per [`send`](Transport::send)
/// and never block in [`receive`](Transport::receive) for longer than the
/// given timeout.
pub trait Transport {
    /// Sends one frame.
    ///
    /// # Errors
    ///
    /// Returns a `Transport` error if the socket rejects the frame.
    fn send(&mut self, frame: &[u8]) -> Result<()>;

    /// Waits up to `timeout` for one frame.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    ///
    /// # Errors
    ///
    /// Returns a `Transport` error on socket failures other than a timeout.
    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>>;

    /// Discards frames that are already queued, returning how many were dropped.
    ///
    /// Used before a retry so a late reply to an earlier attempt is not taken
    /// as the reply to the new one.
    fn drain(&mut self) -> Result<usize> {
        Ok(0)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        (**self).send(frame)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        (**self).receive(timeout)
    }

    fn drain(&mut self) -> Result<usize> {
        (**self).drain()
    }
}

/// Returns whether a socket error is just an expired read timeout.
fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Read timeouts of zero mean "block forever" to the OS, so clamp upwards.
fn effective_timeout(timeout: Duration) -> Duration {
    timeout.max(Duration::from_millis(1))
}

/// UDP transport for Ether IO communication.
///
/// The socket is bound to an ephemeral local port and connected to the
/// device, so datagrams from other hosts are filtered by the OS.
pub struct UdpTransport {
    socket: UdpSocket,
    remote_addr: SocketAddr,
    read_timeout: Option<Duration>,
    buffer: Vec<u8>,
}

impl UdpTransport {
    /// Creates a new UDP transport connected to the specified device address.
    ///
    /// # Errors
    ///
    /// Returns a `Transport` error if the socket cannot be created or connected.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use etherio::UdpTransport;
    ///
    /// let transport = UdpTransport::new("10.10.10.10:2424".parse().unwrap()).unwrap();
    /// ```
    pub fn new(device_addr: SocketAddr) -> Result<Self> {
        let local: SocketAddr = match device_addr {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(device_addr)?;

        Ok(Self {
            socket,
            remote_addr: device_addr,
            read_timeout: None,
            buffer: vec![0u8; MAX_PACKET_SIZE],
        })
    }

    /// Returns the remote device address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Returns a reference to the underlying socket.
    pub fn socket(&self) -> &UdpSocket {
        &self.socket
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        let timeout = effective_timeout(timeout);
        if self.read_timeout != Some(timeout) {
            self.socket.set_read_timeout(Some(timeout))?;
            self.read_timeout = Some(timeout);
        }
        Ok(())
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        trace!(remote = %self.remote_addr, frame = ?frame, "udp send");
        self.socket.send(frame)?;
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.set_timeout(timeout)?;
        match self.socket.recv(&mut self.buffer) {
            Ok(size) => {
                let frame = self.buffer[..size].to_vec();
                trace!(remote = %self.remote_addr, frame = ?frame, "udp recv");
                Ok(Some(frame))
            }
            Err(e) if is_timeout(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn drain(&mut self) -> Result<usize> {
        self.socket.set_nonblocking(true)?;
        let mut drained = 0;
        let outcome = loop {
            match self.socket.recv(&mut self.buffer) {
                Ok(_) => drained += 1,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(drained),
                Err(e) => break Err(e),
            }
        };
        self.socket.set_nonblocking(false)?;
        if drained > 0 {
            trace!(remote = %self.remote_addr, drained, "discarded stale frames");
        }
        Ok(outcome?)
    }
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("remote_addr", &self.remote_addr)
            .field("local_addr", &self.socket.local_addr().ok())
            .finish()
    }
}

/// TCP transport carrying the same frames over a stream.
///
/// The stream has no message boundaries, so a receive returns whatever one
/// read delivers. This works for the short, spaced-out replies of the
/// command set but has not been verified against hardware.
pub struct TcpTransport {
    stream: TcpStream,
    remote_addr: SocketAddr,
    buffer: Vec<u8>,
}

impl TcpTransport {
    /// Connects to the device, waiting at most `connect_timeout`.
    ///
    /// # Errors
    ///
    /// Returns a `Transport` error if the connection cannot be established.
    pub fn connect(device_addr: SocketAddr, connect_timeout: Duration) -> Result<Self> {
        let stream = TcpStream::connect_timeout(&device_addr, effective_timeout(connect_timeout))?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            remote_addr: device_addr,
            buffer: vec![0u8; MAX_PACKET_SIZE],
        })
    }

    /// Returns the remote device address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        trace!(remote = %self.remote_addr, frame = ?frame, "tcp send");
        self.stream.write_all(frame)?;
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.stream.set_read_timeout(Some(effective_timeout(timeout)))?;
        match self.stream.read(&mut self.buffer) {
            Ok(0) => Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
            Ok(size) => Ok(Some(self.buffer[..size].to_vec())),
            Err(e) if is_timeout(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn drain(&mut self) -> Result<usize> {
        self.stream.set_nonblocking(true)?;
        let mut drained = 0;
        let outcome = loop {
            match self.stream.read(&mut self.buffer) {
                Ok(0) => break Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
                Ok(_) => drained += 1,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(drained),
                Err(e) => break Err(e),
            }
        };
        self.stream.set_nonblocking(false)?;
        Ok(outcome?)
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("remote_addr", &self.remote_addr)
            .finish()
    }
}
