//! # Serial Line Access
//!
//! The protocol engines talk to the meter through the [`SerialLink`] trait.
//! [`SerialPortAdapter`] implements it on top of a character device (or a
//! plain file holding a captured stream), and [`mock::MockSerialPort`]
//! implements it in memory for tests.

pub mod mock;
pub mod port;

pub use mock::MockSerialPort;
pub use port::SerialPortAdapter;

use crate::error::P1Error;
use serde::{Deserialize, Serialize};
use std::io;

/// Byte-oriented access to a meter link.
///
/// A read that returns `Ok(None)` means the inter-character timeout expired
/// (or the end of a plain file was reached).
pub trait SerialLink {
    /// Whether terminal attributes apply to this link.
    fn is_terminal(&self) -> bool;

    /// Configure rate, character size, parity and read timeout.
    /// A no-op on links that are not terminals.
    fn apply(&mut self, config: &LineConfig) -> Result<(), P1Error>;

    /// Discard unread bytes in the input queue.
    fn flush_input(&mut self) -> Result<(), P1Error>;

    /// Block until all written bytes are on the wire.
    fn drain_output(&mut self) -> Result<(), P1Error>;

    /// Read a single byte, honouring the configured timeout.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;

    /// Write all of `data`.
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Restore saved terminal attributes and release the device.
    /// Calling it again is a no-op.
    fn close(&mut self) -> Result<(), P1Error>;
}

/// Baud rates recognised on P1 and D0 links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaudRate {
    Baud300,
    Baud600,
    Baud1200,
    Baud2400,
    Baud4800,
    Baud9600,
    Baud19200,
    Baud115200,
}

impl BaudRate {
    pub const ALL_RATES: [BaudRate; 8] = [
        BaudRate::Baud300,
        BaudRate::Baud600,
        BaudRate::Baud1200,
        BaudRate::Baud2400,
        BaudRate::Baud4800,
        BaudRate::Baud9600,
        BaudRate::Baud19200,
        BaudRate::Baud115200,
    ];

    pub fn as_u32(self) -> u32 {
        match self {
            BaudRate::Baud300 => 300,
            BaudRate::Baud600 => 600,
            BaudRate::Baud1200 => 1200,
            BaudRate::Baud2400 => 2400,
            BaudRate::Baud4800 => 4800,
            BaudRate::Baud9600 => 9600,
            BaudRate::Baud19200 => 19200,
            BaudRate::Baud115200 => 115200,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = P1Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        BaudRate::ALL_RATES
            .into_iter()
            .find(|rate| rate.as_u32() == value)
            .ok_or_else(|| P1Error::Serial(format!("unsupported baud rate {value}")))
    }
}

impl From<BaudRate> for nix::sys::termios::BaudRate {
    fn from(rate: BaudRate) -> Self {
        use nix::sys::termios::BaudRate as B;
        match rate {
            BaudRate::Baud300 => B::B300,
            BaudRate::Baud600 => B::B600,
            BaudRate::Baud1200 => B::B1200,
            BaudRate::Baud2400 => B::B2400,
            BaudRate::Baud4800 => B::B4800,
            BaudRate::Baud9600 => B::B9600,
            BaudRate::Baud19200 => B::B19200,
            BaudRate::Baud115200 => B::B115200,
        }
    }
}

/// Bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CharSize {
    Seven,
    Eight,
}

/// Parity bit setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Even,
}

/// Working line settings applied to a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineConfig {
    pub baud: BaudRate,
    pub char_size: CharSize,
    pub parity: Parity,
    /// Inter-character timeout in tenths of a second
    pub timeout_ds: u8,
}

impl LineConfig {
    /// DSMR v4 and later: 115200 8N1.
    pub fn dsmr_v4(timeout_ds: u8) -> Self {
        LineConfig {
            baud: BaudRate::Baud115200,
            char_size: CharSize::Eight,
            parity: Parity::None,
            timeout_ds,
        }
    }

    /// DSMR v2/v3: 9600 7E1.
    pub fn dsmr_v2(timeout_ds: u8) -> Self {
        LineConfig {
            baud: BaudRate::Baud9600,
            char_size: CharSize::Seven,
            parity: Parity::Even,
            timeout_ds,
        }
    }

    /// IEC 62056-21 sign-on settings: 300 7E1.
    pub fn iec_sign_on(timeout_ds: u8) -> Self {
        LineConfig {
            baud: BaudRate::Baud300,
            char_size: CharSize::Seven,
            parity: Parity::Even,
            timeout_ds,
        }
    }

    pub fn with_baud(self, baud: BaudRate) -> Self {
        LineConfig { baud, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baud_rate_conversion() {
        assert_eq!(BaudRate::try_from(9600).unwrap(), BaudRate::Baud9600);
        assert_eq!(BaudRate::try_from(115200).unwrap(), BaudRate::Baud115200);
        assert!(BaudRate::try_from(38400).is_err());
    }

    #[test]
    fn test_line_profiles() {
        let v4 = LineConfig::dsmr_v4(100);
        assert_eq!(v4.baud.as_u32(), 115200);
        assert_eq!(v4.char_size, CharSize::Eight);
        assert_eq!(v4.parity, Parity::None);

        let v2 = LineConfig::dsmr_v2(100);
        assert_eq!(v2.baud.as_u32(), 9600);
        assert_eq!(v2.char_size, CharSize::Seven);
        assert_eq!(v2.parity, Parity::Even);

        let d0 = LineConfig::iec_sign_on(20).with_baud(BaudRate::Baud4800);
        assert_eq!(d0.baud, BaudRate::Baud4800);
        assert_eq!(d0.parity, Parity::Even);
        assert_eq!(d0.timeout_ds, 20);
    }
}
