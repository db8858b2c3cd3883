//! # Meter Identification
//!
//! After the sign-on request a D0 meter answers with an identification
//! message `/XXXZ<ident>\r\n`:
//!
//! - `XXX` is the manufacturer's three letter code
//! - `Z` selects the baud rate and implies the protocol mode
//! - for mode E, `<ident>` starts with `\` followed by a protocol selector
//!
//! Letters `A`..`G` mean mode B at the rate of the matching digit; digits
//! `0`..`6` mean mode C (or E) at that rate, pending an acknowledgement from
//! the host; any other printable character means mode A at 300 baud.

use crate::constants::{
    ack_sequence, ID_BAUD_INDEX, ID_MODE_E_INDEX, ID_MODE_E_PROTOCOL_INDEX, MIN_ID_LEN,
    MODE_E_HDLC, TELEGRAM_END, TELEGRAM_START,
};
use crate::error::{HandshakeFailure, P1Error};
use crate::serial::BaudRate;
use crate::util::hex::escape_ascii;
use serde::{Deserialize, Serialize};

/// Protocol mode of a session.
///
/// `P1` marks a push-only session that never signs on; `Unresolved` is a D0
/// session whose meter has not identified itself yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolMode {
    P1,
    Unresolved,
    A,
    B,
    C,
    D,
    E,
}

impl ProtocolMode {
    /// The single byte used for this mode in logs and reports.
    pub fn as_byte(self) -> u8 {
        match self {
            ProtocolMode::P1 => b'P',
            ProtocolMode::Unresolved => 0,
            ProtocolMode::A => b'A',
            ProtocolMode::B => b'B',
            ProtocolMode::C => b'C',
            ProtocolMode::D => b'D',
            ProtocolMode::E => b'E',
        }
    }
}

impl std::fmt::Display for ProtocolMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolMode::Unresolved => write!(f, "unresolved"),
            mode => write!(f, "{}", mode.as_byte() as char),
        }
    }
}

/// What the baud rate identifier says about the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaudId {
    /// Mode A: stay at 300 baud, no acknowledgement
    ModeA,
    /// Mode B: switch rate without acknowledgement
    ModeB(BaudRate),
    /// Mode C/D/E: acknowledge, then switch rate
    Pending(BaudRate),
}

/// Letter (mode B) and digit (mode C/E) identifiers per rate.
const BAUD_ID_TABLE: [(u8, u8, BaudRate); 7] = [
    (b'A', b'0', BaudRate::Baud300),
    (b'B', b'1', BaudRate::Baud600),
    (b'C', b'2', BaudRate::Baud1200),
    (b'D', b'3', BaudRate::Baud2400),
    (b'E', b'4', BaudRate::Baud4800),
    (b'F', b'5', BaudRate::Baud9600),
    (b'G', b'6', BaudRate::Baud19200),
];

/// Decode the baud rate identifier (fifth character of the identification).
pub fn decode_baud_id(id: u8) -> Option<BaudId> {
    for &(letter, digit, rate) in &BAUD_ID_TABLE {
        if id == letter {
            return Some(BaudId::ModeB(rate));
        }
        if id == digit {
            return Some(BaudId::Pending(rate));
        }
    }

    if (0x20..=0x7e).contains(&id) && id != TELEGRAM_START && id != TELEGRAM_END {
        return Some(BaudId::ModeA);
    }
    None
}

/// Decoded identification message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeterIdentification {
    /// The identification line without `/` and CR LF
    pub raw: String,
    /// Three letter manufacturer code
    pub manufacturer: String,
    /// The baud rate identifier as received
    pub baud_id: u8,
    /// Rate to use for the data transfer
    pub baud: BaudRate,
    pub mode: ProtocolMode,
}

impl MeterIdentification {
    /// The acknowledgement the host must send, if the mode requires one.
    pub fn ack(&self) -> Option<[u8; 6]> {
        match self.mode {
            ProtocolMode::C | ProtocolMode::D | ProtocolMode::E => Some(ack_sequence(self.baud_id)),
            _ => None,
        }
    }
}

/// Parse an identification line including its trailing CR LF.
pub fn parse_identification(line: &[u8]) -> Result<MeterIdentification, P1Error> {
    if line.first() != Some(&TELEGRAM_START) {
        return Err(HandshakeFailure::NoMeterId.into());
    }
    if line.len() < MIN_ID_LEN || !line.ends_with(b"\r\n") {
        return Err(HandshakeFailure::InvalidMeterId(escape_ascii(line)).into());
    }

    let baud_id = line[ID_BAUD_INDEX];
    let (baud, mode) = match decode_baud_id(baud_id) {
        Some(BaudId::ModeA) => (BaudRate::Baud300, ProtocolMode::A),
        Some(BaudId::ModeB(rate)) => (rate, ProtocolMode::B),
        Some(BaudId::Pending(rate)) => {
            // Mode D is indistinguishable from C at this point
            if line[ID_MODE_E_INDEX] == b'\\' {
                if line[ID_MODE_E_PROTOCOL_INDEX] == MODE_E_HDLC {
                    return Err(P1Error::UnsupportedMode('E'));
                }
                (rate, ProtocolMode::E)
            } else {
                (rate, ProtocolMode::C)
            }
        }
        None => return Err(HandshakeFailure::UnknownBaudId(baud_id).into()),
    };

    let text = String::from_utf8_lossy(&line[1..line.len() - 2]).into_owned();
    Ok(MeterIdentification {
        manufacturer: text.chars().take(3).collect(),
        raw: text,
        baud_id,
        baud,
        mode,
    })
}
