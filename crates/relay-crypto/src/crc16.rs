//! CRC16 for report change detection

use crc::{Crc, CRC_16_XMODEM};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// CRC-16/XMODEM of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}
