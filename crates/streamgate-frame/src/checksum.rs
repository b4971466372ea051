//! CRC-16/MODBUS: reflected polynomial 0x8005 (0xA001), init 0xFFFF, no final xor.

use ::crc::{Crc, CRC_16_MODBUS};

/// Initial register value.
pub const CRC16_INIT: u16 = 0xFFFF;

/// Reflected form of the 0x8005 generator polynomial.
pub const CRC16_POLY: u16 = 0xA001;

const MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Compute the CRC-16/MODBUS checksum of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    MODBUS.checksum(data)
}

/// Continue a running checksum over more bytes.
///
/// `crc16_update(crc16(a), b) == crc16(a ++ b)`, which lets the codec
/// checksum the prefix and payload without joining them.
pub fn crc16_update(crc: u16, data: &[u8]) -> u16 {
    // The crate reflects the initial value of reflected algorithms; undo
    // that so the running register resumes unchanged.
    let mut digest = MODBUS.digest_with_initial(crc.reverse_bits());
    digest.update(data);
    digest.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_value() {
        assert_eq!(crc16(b"123456789"), 0x4B37);
    }

    #[test]
    fn modbus_read_holding_register_request() {
        // 01 03 00 00 00 01 is sent on the wire followed by 84 0A.
        assert_eq!(crc16(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]), 0x0A84);
    }

    #[test]
    fn short_input() {
        assert_eq!(crc16(&[0x01, 0x03]), 0x2140);
    }

    #[test]
    fn empty_input_is_init() {
        assert_eq!(crc16(&[]), CRC16_INIT);
    }

    #[test]
    fn incremental_matches_one_shot() {
        let data = b"telemetry frame payload";
        let (head, tail) = data.split_at(7);
        assert_eq!(crc16_update(crc16(head), tail), crc16(data));
    }

    #[test]
    fn constants_match_catalog() {
        assert_eq!(CRC_16_MODBUS.init, CRC16_INIT);
        assert_eq!(CRC_16_MODBUS.poly.reverse_bits(), CRC16_POLY);
        assert_eq!(crc16_update(CRC16_INIT, b"123456789"), 0x4B37);
    }

    #[test]
    fn order_sensitive() {
        assert_ne!(crc16(&[0x01, 0x02]), crc16(&[0x02, 0x01]));
    }
}
