//! # D0 Data Block Framing
//!
//! After sign-on a D0 meter sends its data block: OBIS records separated by
//! CR LF, optionally opened by STX, closed by `!`. There is no CRC envelope,
//! so the block ends at the first `!`.

use crate::constants::{ASCII_STX, SIGN_OFF_SEQUENCE, TELEGRAM_END};
use crate::error::P1Error;
use crate::serial::SerialLink;
use crate::util::hex::escape_ascii;
use log::{debug, trace, warn};

/// Result of reading a data block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct D0Body {
    /// Bytes in the buffer, identification line included
    pub len: usize,
    /// Whether the `!` end marker was seen
    pub complete: bool,
}

fn is_block_byte(byte: u8) -> bool {
    (0x20..=0x7e).contains(&byte) || byte == b'\r' || byte == b'\n'
}

/// Read a data block into `buf`, starting at offset `start`.
///
/// Stops at `!` or when the link goes quiet. A byte outside printable ASCII
/// (other than CR, LF and a leading STX) aborts the read.
pub fn read_body<L: SerialLink + ?Sized>(
    link: &mut L,
    buf: &mut [u8],
    start: usize,
) -> Result<D0Body, P1Error> {
    let capacity = buf.len();
    if start + 1 >= capacity {
        return Err(P1Error::BufferTooSmall { capacity });
    }

    let mut len = start;
    while len < capacity {
        let byte = match link.read_byte() {
            Ok(Some(byte)) => byte,
            Ok(None) => {
                debug!("D0 data block ended without end marker after {} bytes", len - start);
                return Ok(D0Body {
                    len,
                    complete: false,
                });
            }
            Err(e) => {
                warn!("Read error in D0 data block: {e}");
                return Ok(D0Body {
                    len,
                    complete: false,
                });
            }
        };

        if byte == ASCII_STX && len == start {
            continue;
        }
        if !is_block_byte(byte) {
            debug!("Aborting D0 read at {}", escape_ascii(&buf[start..len]));
            return Err(P1Error::InvalidByte { byte, offset: len });
        }

        buf[len] = byte;
        len += 1;

        if byte == TELEGRAM_END {
            trace!("D0 telegram: {}", escape_ascii(&buf[..len]));
            return Ok(D0Body {
                len,
                complete: true,
            });
        }
    }

    Err(P1Error::BufferTooSmall { capacity })
}

/// Send ACK and the break message, returning the meter to idle.
///
/// Whatever the meter sent after `!` (CR LF, ETX and the block check) is
/// discarded so the next sign-on starts on a clean input queue.
pub fn sign_off<L: SerialLink + ?Sized>(link: &mut L) {
    debug!("Sending sign-off sequence");
    if let Err(e) = link.write(&SIGN_OFF_SEQUENCE) {
        warn!("Unable to send sign-off sequence: {e}");
        return;
    }
    if let Err(e) = link.drain_output() {
        warn!("Unable to drain sign-off sequence: {e}");
    }
    if let Err(e) = link.flush_input() {
        warn!("Unable to discard data block trailer: {e}");
    }
}
