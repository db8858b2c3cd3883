//! # Hex Encoding/Decoding Utilities
//!
//! New-style P1 telegrams carry their CRC-16 as four ASCII hex digits after
//! the `!` end marker. This module converts between that field and a `u16`,
//! and renders raw telegram bytes for log output.
//!
//! ## Usage
//!
//! ```rust
//! use dsmr_p1::util::hex::{decode_crc16, encode_crc16};
//!
//! assert_eq!(decode_crc16(b"BB3D").unwrap(), 0xBB3D);
//! assert_eq!(encode_crc16(0xBB3D), "BB3D");
//! ```

use thiserror::Error;

/// Errors that can occur during hex operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    #[error("Invalid hex character: {0}")]
    InvalidCharacter(char),

    #[error("Expected 4 hex characters, got {0}")]
    BadLength(usize),
}

/// Decode the four hex digits of a CRC trailer.
///
/// Accepts both uppercase and lowercase digits.
pub fn decode_crc16(digits: &[u8]) -> Result<u16, HexError> {
    if digits.len() != 4 {
        return Err(HexError::BadLength(digits.len()));
    }

    let mut bytes = [0u8; 2];
    hex::decode_to_slice(digits, &mut bytes).map_err(|_| {
        let bad = digits
            .iter()
            .find(|b| !b.is_ascii_hexdigit())
            .map(|&b| b as char)
            .unwrap_or('?');
        HexError::InvalidCharacter(bad)
    })?;

    Ok(u16::from_be_bytes(bytes))
}

/// Encode a CRC as the four uppercase hex digits used in telegram trailers.
pub fn encode_crc16(crc: u16) -> String {
    hex::encode_upper(crc.to_be_bytes())
}

/// Render bytes as printable ASCII, escaping CR, LF and everything else
/// outside the printable range.
pub fn escape_ascii(data: &[u8]) -> String {
    data.iter()
        .flat_map(|b| std::ascii::escape_default(*b))
        .map(char::from)
        .collect()
}

/// Pretty-print hex data with spacing and line breaks
///
/// Creates a formatted hex dump similar to hexdump -C, used when an
/// identification string or trailer contains binary junk.
pub fn pretty_hex(data: &[u8], bytes_per_line: usize) -> String {
    if data.is_empty() || bytes_per_line == 0 {
        return String::new();
    }

    data.chunks(bytes_per_line)
        .enumerate()
        .map(|(i, chunk)| {
            let hex = hex::encode(chunk);
            let ascii: String = chunk
                .iter()
                .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
                .collect();
            format!(
                "{:04x}: {:<width$} |{}|",
                i * bytes_per_line,
                hex,
                ascii,
                width = bytes_per_line * 2
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
