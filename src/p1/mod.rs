//! The p1 module contains the DSMR P1 side of the crate: the CRC-16 primitive,
//! the telegram framing engine and CRC verification of framed telegrams.

pub mod crc;
pub mod frame;

pub use crc::crc16;
pub use frame::{read_telegram, telegram_crc, verify_crc, CrcCheck, FrameStop, Framed};
