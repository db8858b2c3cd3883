//! # P1 Error Handling
//!
//! This module defines the P1Error enum, which represents the different error
//! types that can occur while reading telegrams from a smart meter.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Represents the different error types that can occur in the dsmr-p1 crate.
#[derive(Debug, Error)]
pub enum P1Error {
    /// The session is closed or was never opened.
    #[error("Session is not open")]
    NullSession,

    /// The input device or file could not be opened.
    #[error("Could not open input file/device {}: {source}", path.display())]
    DeviceOpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The dump file could not be opened for appending.
    #[error("Could not open dump file {}: {source}", path.display())]
    DumpOpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The telegram buffer could not be allocated.
    #[error("Could not allocate {0} byte telegram buffer")]
    BufferAllocFailed(usize),

    /// No telegram arrived before the inter-character timeout expired.
    #[error("No data received")]
    NoData,

    /// The framer discarded its maximum number of bytes without finding a telegram.
    #[error("No valid telegram found after discarding {failed_bytes} bytes")]
    FramingAbandoned { failed_bytes: usize },

    /// The telegram CRC does not match the CRC calculated over its content.
    #[error("Data CRC 0x{calculated:04X} does not match telegram CRC 0x{reported:04X}")]
    CrcMismatch { calculated: u16, reported: u16 },

    /// The IEC 62056-21 sign-on exchange failed.
    #[error("D0 handshake failed: {0}")]
    HandshakeFailed(HandshakeFailure),

    /// The meter requested a protocol mode this crate cannot speak.
    #[error("Unsupported IEC 62056-21 protocol mode {0}")]
    UnsupportedMode(char),

    /// The telegram did not fit in the buffer.
    #[error("Buffer of {capacity} bytes too small to hold telegram")]
    BufferTooSmall { capacity: usize },

    /// A D0 data block contained a byte outside printable ASCII.
    #[error("Non-printable byte 0x{byte:02X} at offset {offset} in D0 data block")]
    InvalidByte { byte: u8, offset: usize },

    /// The grammar reported errors while parsing the telegram.
    #[error("{0} parse errors in telegram")]
    ParseErrors(usize),

    /// Terminal attributes could not be read or applied.
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// The step of the IEC 62056-21 sign-on at which the handshake broke down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeFailure {
    #[error("unable to send sign-on sequence")]
    SignOnWrite,

    #[error("error reading meter ID string: {0:?}")]
    ReadError(io::ErrorKind),

    #[error("did not receive a valid meter ID string")]
    NoMeterId,

    #[error("invalid meter ID string: {0:?}")]
    InvalidMeterId(String),

    #[error("unknown baud rate identifier 0x{0:02X}")]
    UnknownBaudId(u8),

    #[error("unable to send acknowledgement")]
    AckWrite,

    #[error("line control failed: {0}")]
    LineControl(String),
}

impl P1Error {
    /// Returns `true` for errors after which another read attempt can succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            P1Error::NoData
                | P1Error::FramingAbandoned { .. }
                | P1Error::CrcMismatch { .. }
                | P1Error::HandshakeFailed(_)
        )
    }
}

impl From<nix::Error> for P1Error {
    fn from(err: nix::Error) -> Self {
        P1Error::Serial(err.desc().to_string())
    }
}

impl From<HandshakeFailure> for P1Error {
    fn from(failure: HandshakeFailure) -> Self {
        P1Error::HandshakeFailed(failure)
    }
}
