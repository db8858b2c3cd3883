//! # Utility Modules
//!
//! Helpers shared by the P1 and D0 code paths: CRC trailer hex handling and
//! printable renderings of raw telegram bytes for log output.

pub mod hex;

pub use hex::{decode_crc16, encode_crc16, escape_ascii, pretty_hex, HexError};
