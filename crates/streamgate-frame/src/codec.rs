use bytes::{BufMut, Bytes, BytesMut};

use crate::checksum::{crc16, crc16_update};
use crate::cursor::ByteCursor;
use crate::error::{FrameError, Result};

/// Bit 7 of the first prefix byte: a second length byte follows.
pub const EXTENDED_FLAG: u8 = 0x80;

/// Largest declared length that fits in a 1-byte prefix.
pub const MAX_SHORT_LEN: usize = 0x7F;

/// Largest declared length a 2-byte prefix can carry.
pub const MAX_DECLARED_LEN: usize = 0x7FFF;

/// CRC trailer size. The declared length includes it.
pub const TRAILER_SIZE: usize = 2;

/// Largest application payload a single frame can carry.
pub const MAX_PAYLOAD: usize = MAX_DECLARED_LEN - TRAILER_SIZE;

/// A decoded, CRC-validated frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Number of length-prefix bytes (1 or 2).
    pub prefix_len: u8,
    /// Application payload, trailer stripped.
    pub payload: Bytes,
    /// CRC-16 trailer value.
    pub crc: u16,
    /// The whole frame as it appeared on the wire (prefix, payload, trailer).
    pub raw: Bytes,
}

impl Frame {
    /// The length value carried in the prefix (payload plus trailer).
    pub fn declared_len(&self) -> usize {
        self.payload.len() + TRAILER_SIZE
    }

    /// The total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        self.raw.len()
    }
}

/// Wire size of a frame carrying `payload_len` application bytes.
pub fn encoded_len(payload_len: usize) -> usize {
    let declared = payload_len + TRAILER_SIZE;
    let prefix = if declared <= MAX_SHORT_LEN { 1 } else { 2 };
    prefix + declared
}

/// Encode a payload into the wire format, appending to `dst`.
///
/// Wire format:
/// ```text
/// ┌──────────────────────┬────────────────────┬──────────────────┐
/// │ Length (1B or 2B BE) │ Payload            │ CRC-16 (2B LE)   │
/// │ bit7 = extended      │ (Length - 2 bytes) │ over prefix +    │
/// │                      │                    │ payload          │
/// └──────────────────────┴────────────────────┴──────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let declared = payload.len() + TRAILER_SIZE;
    if declared > MAX_DECLARED_LEN {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }

    dst.reserve(encoded_len(payload.len()));
    let start = dst.len();
    if declared <= MAX_SHORT_LEN {
        dst.put_u8(declared as u8);
    } else {
        dst.put_u16((declared as u16) | (u16::from(EXTENDED_FLAG) << 8));
    }
    dst.put_slice(payload);
    let crc = crc16(&dst[start..]);
    dst.put_u16_le(crc);
    Ok(())
}

/// Decode the next frame at the cursor.
///
/// Returns `Ok(None)` once the cursor is exhausted. On error the cursor is
/// left somewhere inside the failed frame; callers abandon the buffer.
pub fn decode_frame(src: &mut ByteCursor) -> Result<Option<Frame>> {
    if src.is_empty() {
        return Ok(None);
    }

    let start = src.position();
    let b0 = src.read_u8()?;
    let (declared, prefix_len) = if b0 & EXTENDED_FLAG == 0 {
        (usize::from(b0), 1u8)
    } else {
        let b1 = src.read_u8().map_err(|_| FrameError::IncompletePrefix)?;
        ((usize::from(b0 & !EXTENDED_FLAG) << 8) | usize::from(b1), 2u8)
    };

    if declared == 0 {
        return Err(FrameError::ZeroLength);
    }

    let remaining = src.remaining();
    let body = src
        .take(declared)
        .map_err(|_| FrameError::Truncated {
            declared,
            remaining,
        })?;

    if declared < TRAILER_SIZE {
        return Err(FrameError::TooShort { declared });
    }

    let split = declared - TRAILER_SIZE;
    let raw = src.since(start);
    let trailer = u16::from_le_bytes([body[split], body[split + 1]]);
    let computed = crc16_update(crc16(&raw[..usize::from(prefix_len)]), &body[..split]);
    if computed != trailer {
        return Err(FrameError::CrcMismatch { trailer, computed });
    }

    Ok(Some(Frame {
        prefix_len,
        payload: body.slice(..split),
        crc: trailer,
        raw,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(payload, &mut buf).unwrap();
        buf
    }

    fn decode_one(wire: &[u8]) -> Result<Option<Frame>> {
        let mut cur = ByteCursor::new(Bytes::copy_from_slice(wire));
        decode_frame(&mut cur)
    }

    #[test]
    fn known_wire_bytes() {
        // Declared length 5, payload "ABC", crc16([05 41 42 43]) = 0xAD21.
        let wire = encode(b"ABC");
        assert_eq!(wire.as_ref(), &[0x05, b'A', b'B', b'C', 0x21, 0xAD]);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let payload = b"hello, device!";
        let wire = encode(payload);
        assert_eq!(wire.len(), encoded_len(payload.len()));

        let frame = decode_one(&wire).unwrap().unwrap();
        assert_eq!(frame.prefix_len, 1);
        assert_eq!(frame.payload.as_ref(), payload);
        assert_eq!(frame.raw.as_ref(), wire.as_ref());
        assert_eq!(frame.crc, crc16(&wire[..wire.len() - 2]));
    }

    #[test]
    fn prefix_boundary_at_declared_127() {
        // 125 payload bytes + trailer = declared 127: still a 1-byte prefix.
        let short = encode(&[0x11; 125]);
        assert_eq!(short[0], 127);
        assert_eq!(short.len(), 1 + 127);

        // 126 payload bytes + trailer = declared 128: needs the extended prefix.
        let long = encode(&[0x22; 126]);
        assert_eq!(&long[..2], &[0x80, 0x80]);
        assert_eq!(long.len(), 2 + 128);

        assert_eq!(decode_one(&short).unwrap().unwrap().prefix_len, 1);
        let frame = decode_one(&long).unwrap().unwrap();
        assert_eq!(frame.prefix_len, 2);
        assert_eq!(frame.payload.len(), 126);
    }

    #[test]
    fn largest_payload() {
        let payload = vec![0xAB; MAX_PAYLOAD];
        let wire = encode(&payload);
        assert_eq!(&wire[..2], &[0xFF, 0xFF]);
        let frame = decode_one(&wire).unwrap().unwrap();
        assert_eq!(frame.payload.len(), MAX_PAYLOAD);
    }

    #[test]
    fn test_payload_too_large() {
        let mut buf = BytesMut::new();
        let err = encode_frame(&vec![0; MAX_PAYLOAD + 1], &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_payload() {
        let wire = encode(b"");
        assert_eq!(wire[0], 2);
        let frame = decode_one(&wire).unwrap().unwrap();
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn empty_buffer_yields_none() {
        assert!(decode_one(&[]).unwrap().is_none());
    }

    #[test]
    fn zero_length_rejected() {
        assert_eq!(decode_one(&[0x00, 0x01, 0x02]), Err(FrameError::ZeroLength));
        assert_eq!(decode_one(&[0x80, 0x00]), Err(FrameError::ZeroLength));
    }

    #[test]
    fn declared_length_one_rejected() {
        assert_eq!(
            decode_one(&[0x01, 0xAA]),
            Err(FrameError::TooShort { declared: 1 })
        );
    }

    #[test]
    fn over_length_is_truncation() {
        assert_eq!(
            decode_one(&[0x09, 0x01, 0x02]),
            Err(FrameError::Truncated {
                declared: 9,
                remaining: 2
            })
        );
    }

    #[test]
    fn missing_second_prefix_byte() {
        assert_eq!(decode_one(&[0x81]), Err(FrameError::IncompletePrefix));
    }

    #[test]
    fn trailer_mismatch() {
        let mut wire = encode(b"ABC");
        wire[4] ^= 0xFF;
        let err = decode_one(&wire).unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn every_single_bit_flip_in_payload_is_caught() {
        let wire = encode(b"sensor-7:21.5C");
        let payload_range = 1..wire.len() - TRAILER_SIZE;
        for idx in payload_range {
            for bit in 0..8 {
                let mut corrupted = wire.clone();
                corrupted[idx] ^= 1 << bit;
                let err = decode_one(&corrupted).unwrap_err();
                assert!(err.is_integrity(), "byte {idx} bit {bit}: {err}");
            }
        }
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame(b"first", &mut buf).unwrap();
        encode_frame(b"second", &mut buf).unwrap();

        let mut cur = ByteCursor::new(buf.freeze());
        let f1 = decode_frame(&mut cur).unwrap().unwrap();
        let f2 = decode_frame(&mut cur).unwrap().unwrap();
        assert_eq!(f1.payload.as_ref(), b"first");
        assert_eq!(f2.payload.as_ref(), b"second");
        assert!(decode_frame(&mut cur).unwrap().is_none());
    }

    #[test]
    fn test_frame_wire_size() {
        let wire = encode(b"test");
        let frame = decode_one(&wire).unwrap().unwrap();
        assert_eq!(frame.wire_size(), 1 + 4 + TRAILER_SIZE);
        assert_eq!(frame.declared_len(), 6);
    }
}
