//! UDP transport for device telemetry.
//!
//! This is the lowest layer of streamgate. A [`UdpTransport`] owns the
//! socket and drives a [`DatagramHandler`]: every received datagram, every
//! completed reply send, every transport error and every heartbeat tick is
//! delivered as a callback. Replies travel back through a [`ReplySink`],
//! which only ever holds plain peer addresses, never socket handles.

pub mod error;
pub mod traits;
pub mod udp;

pub use error::{Result, TransportError};
pub use traits::{Datagram, DatagramHandler, ReplySink, TransportAction};
pub use udp::{ReplySender, UdpConfig, UdpTransport, DEFAULT_MAX_DATAGRAM, DEFAULT_REPLY_QUEUE};
