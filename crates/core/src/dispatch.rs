//! Shared receive-loop plumbing for the server and client dispatchers
//! (spec.md §4.5).

use std::net::SocketAddr;

use endpoint::UdpEndpoint;
use protocol::header::MAX_DATAGRAM;
use protocol::Frame;

/// Narrow send-only view of [`endpoint::UdpEndpoint`], so transaction code
/// (and its tests) don't depend on a real socket.
pub(crate) trait SendDatagram: Send + Sync {
    fn send_to(&self, buf: &[u8], addr: SocketAddr);
}

impl SendDatagram for UdpEndpoint {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) {
        if let Err(error) = UdpEndpoint::send_to(self, buf, addr) {
            tracing::error!(%error, "failed to send datagram");
        }
    }
}

/// Receives and decodes one datagram.
///
/// Returns `None` on a receive timeout, an endpoint I/O error, or a
/// structurally invalid frame; all three are logged and handled the same
/// way by callers (try again next iteration).
pub(crate) fn receive_frame(endpoint: &UdpEndpoint) -> Option<(Frame, SocketAddr)> {
    let mut buf = [0u8; MAX_DATAGRAM];
    match endpoint.receive(&mut buf) {
        Ok(Some((len, addr))) => match Frame::decode(&buf[..len]) {
            Ok(frame) => Some((frame, addr)),
            Err(error) => {
                tracing::warn!(peer = %addr, %error, "dropping malformed datagram");
                None
            }
        },
        Ok(None) => None,
        Err(error) => {
            tracing::error!(%error, "endpoint receive failed");
            None
        }
    }
}
