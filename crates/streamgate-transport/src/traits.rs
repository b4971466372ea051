use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use bytes::Bytes;

use crate::error::{Result, TransportError};

/// One UDP packet as received.
#[derive(Debug, Clone)]
pub struct Datagram {
    /// Raw packet bytes.
    pub data: Bytes,
    /// Sender address.
    pub peer: SocketAddr,
    /// When the transport read the packet.
    pub received_at: Instant,
}

impl Datagram {
    pub fn new(data: impl Into<Bytes>, peer: SocketAddr) -> Self {
        Self {
            data: data.into(),
            peer,
            received_at: Instant::now(),
        }
    }

    pub fn peer_ip(&self) -> IpAddr {
        self.peer.ip()
    }

    pub fn peer_port(&self) -> u16 {
        self.peer.port()
    }

    /// Peer rendered as `ip:port` (no brackets for IPv6).
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.peer.ip(), self.peer.port())
    }
}

/// What the transport should do after reporting an error to its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportAction {
    /// Keep using the current socket.
    Continue,
    /// Close and rebind the socket on the same address.
    Reopen,
}

/// Callbacks a transport invokes. Implementations must not block: any
/// asynchronous work is spawned and completes on a later turn.
pub trait DatagramHandler: Send + Sync {
    /// A datagram arrived. Called in arrival order.
    fn on_datagram(&self, datagram: Datagram);

    /// A reply of `len` bytes was written to `peer`.
    fn on_send_complete(&self, _peer: SocketAddr, _len: usize) {}

    /// The socket reported an error.
    fn on_transport_error(&self, _error: &TransportError) -> TransportAction {
        TransportAction::Continue
    }

    /// Fixed-interval timer tick.
    fn on_heartbeat(&self, _now: Instant) {}
}

/// Outbound path for replies.
pub trait ReplySink: Send + Sync {
    /// Queue `data` for delivery to `peer`. Never blocks.
    fn send_reply(&self, peer: SocketAddr, data: Bytes) -> Result<()>;
}
