//! Length-prefixed, CRC-protected framing for device telemetry datagrams.
//!
//! A datagram carries one or more frames back to back. Every frame is:
//! - A 1-byte length prefix (bit 7 clear, length 0-127), or a 2-byte prefix
//!   (bit 7 set, 15-bit big-endian length up to 0x7FFF)
//! - `length - 2` bytes of application payload
//! - A 2-byte little-endian CRC-16/MODBUS trailer over prefix and payload
//!
//! Decoding is strictly sequential. The first structural or integrity error
//! ends the datagram; there is no resynchronization marker to recover from.

pub mod codec;
pub mod checksum;
pub mod cursor;
pub mod decoder;
pub mod error;

pub use codec::{
    decode_frame, encode_frame, encoded_len, Frame, EXTENDED_FLAG, MAX_DECLARED_LEN,
    MAX_PAYLOAD, MAX_SHORT_LEN, TRAILER_SIZE,
};
pub use checksum::{crc16, crc16_update, CRC16_INIT, CRC16_POLY};
pub use cursor::ByteCursor;
pub use decoder::{hex_dump, FrameDecoder};
pub use error::{FrameError, Result};
