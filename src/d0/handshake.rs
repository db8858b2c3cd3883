//! # IEC 62056-21 Sign-On
//!
//! Wakes an optical probe, requests identification, decodes the reply and
//! negotiates the data transfer rate:
//!
//! 1. 65 NUL bytes, drain, pause (2.7 s by default)
//! 2. discard pending input, `/?!\r\n`, drain
//! 3. read `/XXXZ<ident>\r\n` into the buffer
//! 4. for mode C and E send `ACK 0 Z 0 CR LF`, drain
//! 5. switch to the advertised rate unless the meter speaks mode A

use crate::constants::{ASCII_NUL, SIGN_ON_SEQUENCE, TELEGRAM_START, WAKEUP_NUL_COUNT};
use crate::d0::identification::{parse_identification, MeterIdentification, ProtocolMode};
use crate::error::{HandshakeFailure, P1Error};
use crate::serial::{LineConfig, SerialLink};
use crate::util::hex::{escape_ascii, pretty_hex};
use log::{debug, info, warn};
use std::thread;
use std::time::Duration;

/// Outcome of a successful sign-on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub identification: MeterIdentification,
    /// Length of the identification line at the start of the buffer
    pub id_len: usize,
    /// Line settings in effect for the data transfer
    pub line: LineConfig,
}

impl Handshake {
    pub fn mode(&self) -> ProtocolMode {
        self.identification.mode
    }
}

/// Run the sign-on sequence on `link`.
///
/// `line` holds the sign-on settings (normally 300 7E1) already applied to
/// the link. The identification line is left at the start of `buf`.
pub fn sign_on<L: SerialLink + ?Sized>(
    link: &mut L,
    buf: &mut [u8],
    line: LineConfig,
    wakeup_delay: Duration,
) -> Result<Handshake, P1Error> {
    if buf.len() < 2 {
        return Err(P1Error::BufferTooSmall { capacity: buf.len() });
    }

    debug!("Sending wake-up sequence");
    if let Err(e) = link.write(&[ASCII_NUL; WAKEUP_NUL_COUNT]) {
        warn!("Unable to send wake-up sequence: {e}");
    }
    link.drain_output().map_err(line_control)?;
    thread::sleep(wakeup_delay);

    // Leftovers of an aborted read would be taken for the meter's reply
    link.flush_input().map_err(line_control)?;

    debug!("Sending sign-on sequence");
    link.write(SIGN_ON_SEQUENCE).map_err(|_| HandshakeFailure::SignOnWrite)?;
    link.drain_output().map_err(line_control)?;

    let id_len = read_id_line(link, buf)?;
    let identification = parse_identification(&buf[..id_len]).map_err(|e| {
        debug!("Identification bytes:\n{}", pretty_hex(&buf[..id_len], 16));
        e
    })?;
    info!(
        "Meter {} identified, mode {} at {} baud",
        identification.raw,
        identification.mode,
        identification.baud.as_u32()
    );

    if let Some(ack) = identification.ack() {
        debug!("Sending acknowledgement {}", escape_ascii(&ack));
        link.write(&ack).map_err(|_| HandshakeFailure::AckWrite)?;
        link.drain_output().map_err(line_control)?;
    }

    let line = match identification.mode {
        ProtocolMode::A => line,
        _ => {
            let switched = line.with_baud(identification.baud);
            link.apply(&switched)?;
            switched
        }
    };

    Ok(Handshake {
        identification,
        id_len,
        line,
    })
}

fn line_control(err: P1Error) -> HandshakeFailure {
    HandshakeFailure::LineControl(err.to_string())
}

/// Read the identification line up to and including `\n`, or until one
/// byte short of the buffer capacity.
fn read_id_line<L: SerialLink + ?Sized>(link: &mut L, buf: &mut [u8]) -> Result<usize, P1Error> {
    match link.read_byte() {
        Ok(Some(TELEGRAM_START)) => buf[0] = TELEGRAM_START,
        Ok(Some(byte)) => {
            debug!("Unexpected first byte 0x{byte:02X} in meter reply");
            return Err(HandshakeFailure::NoMeterId.into());
        }
        Ok(None) => return Err(HandshakeFailure::NoMeterId.into()),
        Err(e) => return Err(HandshakeFailure::ReadError(e.kind()).into()),
    }

    let mut len = 1;
    while len < buf.len() - 1 {
        match link.read_byte() {
            Ok(Some(byte)) => {
                buf[len] = byte;
                len += 1;
                if byte == b'\n' {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => return Err(HandshakeFailure::ReadError(e.kind()).into()),
        }
    }
    debug!("Identification line: {}", escape_ascii(&buf[..len]));
    Ok(len)
}
