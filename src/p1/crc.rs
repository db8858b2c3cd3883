//! # CRC-16 for P1 Telegrams
//!
//! DSMR v4 and later protect each telegram with CRC-16/ARC: reflected
//! polynomial 0xA001 (0x8005 unreflected), initial value 0x0000, no final
//! XOR. The CRC covers everything from `/` up to and including `!`.

/// Reflected CRC-16/ARC polynomial
const CRC16_POLY: u16 = 0xA001;
/// Initial value for the telegram CRC
const CRC16_INIT: u16 = 0x0000;

/// Calculate the CRC-16/ARC of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = CRC16_INIT;

    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ CRC16_POLY;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}
