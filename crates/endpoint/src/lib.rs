//! A UDP socket wrapper tailored to TRFTP's send/receive pattern.
//!
//! # Overview
//!
//! [`UdpEndpoint`] binds a single UDP socket with `SO_REUSEADDR` and a
//! configurable receive timeout, and serializes outbound datagrams behind a
//! mutex so multiple transaction threads can share one socket safely.
//!
//! # Design
//!
//! The receive timeout is what lets a transaction's dispatch loop poll for
//! both inbound datagrams and external cancellation without blocking
//! forever; [`UdpEndpoint::receive`] turns a timed-out read into `Ok(None)`
//! rather than an error, matching how a caller is expected to treat it.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::Mutex;
use std::time::Duration;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use thiserror::Error;

/// Default receive timeout applied when a socket is first opened.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// A bound UDP socket with a serialized send path and a pollable receive timeout.
pub struct UdpEndpoint {
    socket: UdpSocket,
    send_lock: Mutex<()>,
}

impl UdpEndpoint {
    /// Binds a UDP socket on `0.0.0.0:port` (`port = 0` picks an ephemeral port).
    ///
    /// Uses [`socket2::Socket`] to set `SO_REUSEADDR` and the initial receive
    /// timeout before bind, then hands off to [`std::net::UdpSocket`] for
    /// ordinary send/receive I/O.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError`] if the socket cannot be created, configured,
    /// or bound.
    pub fn bind(port: u16) -> Result<UdpEndpoint, EndpointError> {
        let raw =
            Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(EndpointError::Create)?;

        raw.set_reuse_address(true).map_err(EndpointError::Configure)?;
        raw.set_read_timeout(Some(DEFAULT_READ_TIMEOUT))
            .map_err(EndpointError::Configure)?;

        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        raw.bind(&SockAddr::from(addr)).map_err(EndpointError::Bind)?;

        Ok(UdpEndpoint {
            socket: raw.into(),
            send_lock: Mutex::new(()),
        })
    }

    /// Returns the local address this endpoint is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError`] if the OS cannot report the local address.
    pub fn local_addr(&self) -> Result<SocketAddr, EndpointError> {
        self.socket.local_addr().map_err(EndpointError::Configure)
    }

    /// Replaces the socket's receive timeout.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError`] if the OS rejects the new timeout.
    pub fn set_read_timeout(&self, timeout: Duration) -> Result<(), EndpointError> {
        self.socket
            .set_read_timeout(Some(timeout))
            .map_err(EndpointError::Configure)
    }

    /// Receives one datagram into `buf`.
    ///
    /// Returns `Ok(None)` if no datagram arrived before the read timeout
    /// elapsed, rather than treating that as an error.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Receive`] for any I/O failure other than a
    /// timeout.
    pub fn receive(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, EndpointError> {
        match self.socket.recv_from(buf) {
            Ok((len, from)) => Ok(Some((len, from))),
            Err(err) if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(err) => Err(EndpointError::Receive(err)),
        }
    }

    /// Sends `buf` to `addr`.
    ///
    /// Sends are serialized across threads sharing this endpoint, matching
    /// the single-socket-many-transactions topology both the server and
    /// client use.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Send`] if the underlying `sendto` fails.
    pub fn send_to(&self, buf: &[u8], addr: SocketAddr) -> Result<usize, EndpointError> {
        let _guard = self.send_lock.lock().unwrap_or_else(|poison| poison.into_inner());
        self.socket.send_to(buf, addr).map_err(EndpointError::Send)
    }
}

/// Errors raised while creating, configuring, or using a [`UdpEndpoint`].
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The underlying socket could not be created.
    #[error("failed to create UDP socket: {0}")]
    Create(#[source] io::Error),

    /// A socket option could not be set, or an address could not be read.
    #[error("failed to configure UDP socket: {0}")]
    Configure(#[source] io::Error),

    /// The socket could not be bound to its local address.
    #[error("failed to bind UDP socket: {0}")]
    Bind(#[source] io::Error),

    /// A receive failed for a reason other than a timeout.
    #[error("failed to receive datagram: {0}")]
    Receive(#[source] io::Error),

    /// A send failed.
    #[error("failed to send datagram: {0}")]
    Send(#[source] io::Error),
}
