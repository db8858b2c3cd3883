//! The d0 module implements the IEC 62056-21 optical ("D0") readout: decoding
//! the meter identification, the sign-on/acknowledgement handshake, and
//! framing of the data block that follows.

pub mod frame;
pub mod handshake;
pub mod identification;

pub use frame::{read_body, sign_off, D0Body};
pub use handshake::{sign_on, Handshake};
pub use identification::{decode_baud_id, parse_identification, BaudId, MeterIdentification, ProtocolMode};
