//! # dsmr-p1 - Smart Meter Telegram Reader
//!
//! The dsmr-p1 crate reads telegrams from electricity meters over two serial
//! interfaces:
//!
//! - the DSMR P1 port, where the meter pushes a telegram every few seconds
//!   at 115200 8N1 (DSMR v4 and later) or 9600 7E1 (DSMR v2/v3)
//! - the IEC 62056-21 optical "D0" interface, where the host wakes the meter,
//!   signs on and negotiates a transfer rate before the meter answers
//!
//! ## Features
//!
//! - Telegram framing that recovers from junk, overflowing candidates and
//!   bad trailers, with a cap on discarded bytes
//! - CRC-16 verification of DSMR v4+ telegrams
//! - IEC 62056-21 mode A, B, C and E sign-on (not the HDLC variant of mode E)
//! - A `nom` based OBIS grammar, replaceable through [`TelegramGrammar`]
//! - Automatic DSMR v2/v4 line settings probe
//! - Logging through the `log` facade
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! dsmr-p1 = "1.0.0"
//! ```
//!
//! ```rust,no_run
//! use dsmr_p1::{SessionConfig, TelegramSession};
//!
//! # fn main() -> Result<(), dsmr_p1::P1Error> {
//! let mut session = TelegramSession::open_p1("/dev/ttyUSB0", SessionConfig::default())?;
//! let report = session.read()?;
//! for record in session.grammar().records() {
//!     println!("{} {:?}", record.code, record.values);
//! }
//! println!("{} bytes, CRC {:?}", report.len, report.crc);
//! session.close()?;
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod d0;
pub mod error;
pub mod logging;
pub mod obis;
pub mod p1;
pub mod serial;
pub mod session;
pub mod util;

pub use crate::error::{HandshakeFailure, P1Error};
pub use crate::logging::{init_logger, log_info};

// Protocol engines
pub use d0::{MeterIdentification, ProtocolMode};
pub use p1::{crc16, CrcCheck, FrameStop, Framed};

// Serial access
pub use serial::{BaudRate, CharSize, LineConfig, Parity, SerialLink, SerialPortAdapter};

// Content grammar
pub use obis::{CosemValue, ObisGrammar, ObisRecord, ParseStatus, TelegramGrammar};

// Session
pub use session::{HandshakePolicy, SessionConfig, TelegramReport, TelegramSession};
