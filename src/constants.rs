//! P1 / D0 Protocol Constants
//!
//! This module defines constants used in the DSMR P1 and IEC 62056-21
//! implementations.

/// First byte of every telegram
pub const TELEGRAM_START: u8 = b'/';

/// End-of-data marker, followed by an optional CRC and CR LF
pub const TELEGRAM_END: u8 = b'!';

/// Length of the hex-encoded CRC field in new-style (DSMR v4+) telegrams
pub const CRC_HEX_LEN: usize = 4;

/// Bytes after `!` in an old-style telegram (`\r\n`)
pub const OLD_STYLE_TRAILER_LEN: usize = 2;

/// Bytes after `!` in a new-style telegram (`HHHH\r\n`)
pub const NEW_STYLE_TRAILER_LEN: usize = CRC_HEX_LEN + 2;

/// Default telegram buffer capacity in bytes
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Default inter-character read timeout in seconds
pub const DEFAULT_READ_TIMEOUT_SECS: u32 = 10;

/// Largest timeout the one-byte decisecond timer can hold, in seconds
pub const MAX_READ_TIMEOUT_SECS: u32 = 25;

// ----------------------------------------------------------------------------
// IEC 62056-21 (D0) control characters and sequences
// ----------------------------------------------------------------------------

pub const ASCII_NUL: u8 = 0x00;
pub const ASCII_SOH: u8 = 0x01;
pub const ASCII_STX: u8 = 0x02;
pub const ASCII_ETX: u8 = 0x03;
pub const ASCII_ACK: u8 = 0x06;

/// Number of NUL bytes sent to wake up an optical probe
pub const WAKEUP_NUL_COUNT: usize = 65;

/// Pause after the wake-up sequence, in milliseconds
pub const WAKEUP_DELAY_MS: u64 = 2700;

/// Request message asking the meter to identify itself
pub const SIGN_ON_SEQUENCE: &[u8] = b"/?!\r\n";

/// ACK + break message (`B0` with BCC `q`) ending the session
pub const SIGN_OFF_SEQUENCE: [u8; 6] = [ASCII_ACK, ASCII_SOH, b'B', b'0', ASCII_ETX, b'q'];

/// Index of the baud rate identifier within the identification string
pub const ID_BAUD_INDEX: usize = 4;

/// Index of the mode E marker (`\`) within the identification string
pub const ID_MODE_E_INDEX: usize = 5;

/// Index of the mode E protocol selector within the identification string
pub const ID_MODE_E_PROTOCOL_INDEX: usize = 6;

/// Mode E protocol selector for the binary HDLC variant
pub const MODE_E_HDLC: u8 = b'2';

/// Shortest identification string that carries a baud identifier: `/XXXZ\r\n`
pub const MIN_ID_LEN: usize = 7;

/// Build the acknowledgement/option select message for mode C and E.
///
/// The third character echoes the meter's baud rate identifier, selecting
/// that rate for the data transfer.
pub fn ack_sequence(baud_id: u8) -> [u8; 6] {
    [ASCII_ACK, b'0', baud_id, b'0', b'\r', b'\n']
}
