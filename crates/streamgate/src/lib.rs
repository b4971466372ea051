//! UDP telemetry gateway.
//!
//! Field devices send datagrams packed with length-prefixed, CRC-16 protected
//! frames. streamgate splits them, forwards every frame to a backend command
//! processor under an authenticated session, and returns any reply bytes to
//! the device that sent the frame.
//!
//! # Crate Structure
//!
//! - [`transport`]: UDP socket, datagram callbacks and the reply queue
//! - [`frame`]: CRC-16/MODBUS and the frame codec
//! - [`dispatch`]: session lifecycle and backend dispatch of decoded frames

/// Re-export transport types.
pub mod transport {
    pub use streamgate_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use streamgate_frame::*;
}

/// Re-export dispatch types.
pub mod dispatch {
    pub use streamgate_dispatch::*;
}
