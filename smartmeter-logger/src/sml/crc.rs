//! CRC-16/X-25 as used by SML transport and message checksums

const POLY_REFLECTED: u16 = 0x8408;

/// CRC-16/X-25 (reflected 0x1021, init 0xFFFF, xorout 0xFFFF)
pub fn crc16_x25(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLY_REFLECTED
            } else {
                crc >> 1
            };
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(crc16_x25(b"123456789"), 0x906E);
    }

    #[test]
    fn test_empty() {
        assert_eq!(crc16_x25(&[]), 0x0000);
    }
}
