//! # P1 Telegram Framing
//!
//! Pulls bytes from a [`SerialLink`] one at a time and places exactly one
//! complete telegram at the start of the caller's buffer. A telegram starts
//! with `/` and ends either old-style with `!\r\n` or new-style with
//! `!HHHH\r\n`, where `HHHH` is the hex CRC-16 of everything up to and
//! including the `!`.
//!
//! The framer recovers from junk before a telegram, from candidates that
//! overflow the buffer and from bad trailers by returning to the search
//! state. Every byte thrown away counts toward `max_fail_bytes`; once that
//! cap is reached the framer gives up.
//!
//! ## Usage
//!
//! ```rust
//! use dsmr_p1::p1::frame::{read_telegram, FrameStop};
//! use dsmr_p1::serial::MockSerialPort;
//!
//! let mut port = MockSerialPort::plain();
//! port.queue_rx_data(b"noise/XMX5\r\n\r\n1-0:1.8.0(000671.578*kWh)\r\n!\r\n");
//!
//! let mut buf = [0u8; 256];
//! let framed = read_telegram(&mut port, &mut buf, 0);
//! assert_eq!(framed.stop, FrameStop::Telegram);
//! assert_eq!(framed.failed_bytes, 5);
//! assert!(buf[..framed.len].starts_with(b"/XMX5"));
//! ```

use crate::constants::{
    CRC_HEX_LEN, NEW_STYLE_TRAILER_LEN, OLD_STYLE_TRAILER_LEN, TELEGRAM_END, TELEGRAM_START,
};
use crate::error::P1Error;
use crate::p1::crc::crc16;
use crate::serial::SerialLink;
use crate::util::hex::escape_ascii;
use log::{debug, error, trace, warn};
use serde::Serialize;
use std::io;

/// Why the framer stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStop {
    /// A complete telegram is in the buffer
    Telegram,
    /// The link returned no byte (timeout or end of file)
    EndOfStream,
    /// The link reported an error
    ReadError(io::ErrorKind),
    /// `max_fail_bytes` bytes were discarded without finding a telegram
    FailLimit,
}

/// Result of one framing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framed {
    /// Length of the telegram at the start of the buffer, 0 if none
    pub len: usize,
    /// Bytes discarded while searching
    pub failed_bytes: usize,
    /// Bytes taken from the link
    pub consumed: usize,
    pub stop: FrameStop,
}

enum ScanState {
    Searching,
    InsideTelegram,
}

struct Scanner<'a, L: SerialLink + ?Sized> {
    link: &'a mut L,
    buf: &'a mut [u8],
    max_fail_bytes: usize,
    failed: usize,
    consumed: usize,
}

impl<L: SerialLink + ?Sized> Scanner<'_, L> {
    fn next_byte(&mut self) -> Result<u8, FrameStop> {
        match self.link.read_byte() {
            Ok(Some(byte)) => {
                self.consumed += 1;
                Ok(byte)
            }
            Ok(None) => Err(FrameStop::EndOfStream),
            Err(e) => {
                warn!("Read error while scanning for telegram: {e}");
                Err(FrameStop::ReadError(e.kind()))
            }
        }
    }

    fn check_fail_limit(&self) -> Result<(), FrameStop> {
        if self.max_fail_bytes > 0 && self.failed >= self.max_fail_bytes {
            debug!("Discarded {} bytes without a valid telegram, giving up", self.failed);
            return Err(FrameStop::FailLimit);
        }
        Ok(())
    }

    fn run(&mut self) -> Result<usize, FrameStop> {
        let mut state = ScanState::Searching;
        let mut offset = 0usize;

        loop {
            self.check_fail_limit()?;
            let byte = self.next_byte()?;

            if let ScanState::InsideTelegram = state {
                if offset < self.buf.len() {
                    self.buf[offset] = byte;
                    offset += 1;

                    if byte == TELEGRAM_END {
                        debug!("Possible telegram end at offset {offset}");
                        match self.read_trailer(offset)? {
                            Some(len) => return Ok(len),
                            None => {
                                state = ScanState::Searching;
                                offset = 0;
                            }
                        }
                    }
                    continue;
                }

                // Buffer full before the end marker, rescan from this byte
                debug!("Buffer overflow before valid telegram end, restart scanning");
                self.failed += offset;
                offset = 0;
                state = ScanState::Searching;
                self.check_fail_limit()?;
            }

            if byte == TELEGRAM_START && !self.buf.is_empty() {
                debug!("Possible telegram found after {} discarded bytes", self.failed);
                self.buf[0] = byte;
                offset = 1;
                state = ScanState::InsideTelegram;
            } else {
                self.failed += 1;
            }
        }
    }

    /// Disambiguate the bytes after `!` at `buf[offset - 1]`.
    ///
    /// Returns the telegram length, or `None` when the candidate was
    /// discarded.
    fn read_trailer(&mut self, offset: usize) -> Result<Option<usize>, FrameStop> {
        let mut trailer = [0u8; NEW_STYLE_TRAILER_LEN];
        let mut got = 0usize;

        let outcome = self.fill_trailer(&mut trailer, &mut got, OLD_STYLE_TRAILER_LEN);
        if let Err(stop) = outcome {
            self.failed += offset + got;
            return Err(stop);
        }

        let len = if trailer[0] == b'\r' {
            debug!("Old-style telegram with length {}", offset + OLD_STYLE_TRAILER_LEN);
            Some(offset + OLD_STYLE_TRAILER_LEN)
        } else {
            // Possible start of CRC, the CR must follow the four hex digits
            if let Err(stop) = self.fill_trailer(&mut trailer, &mut got, NEW_STYLE_TRAILER_LEN) {
                self.failed += offset + got;
                return Err(stop);
            }
            if trailer[CRC_HEX_LEN] == b'\r' {
                debug!("New-style telegram with length {}", offset + NEW_STYLE_TRAILER_LEN);
                Some(offset + NEW_STYLE_TRAILER_LEN)
            } else {
                None
            }
        };

        match len {
            Some(len) if len <= self.buf.len() => {
                self.buf[offset..len].copy_from_slice(&trailer[..got]);
                Ok(Some(len))
            }
            Some(_) => {
                debug!("Telegram trailer does not fit in buffer, restart scanning");
                self.failed += offset + got;
                Ok(None)
            }
            None => {
                debug!("Invalid telegram, restart scanning");
                self.failed += offset + got;
                Ok(None)
            }
        }
    }

    fn fill_trailer(
        &mut self,
        trailer: &mut [u8],
        got: &mut usize,
        upto: usize,
    ) -> Result<(), FrameStop> {
        while *got < upto {
            trailer[*got] = self.next_byte()?;
            *got += 1;
        }
        Ok(())
    }
}

/// Try to read one full P1 telegram from `link` into the start of `buf`.
///
/// `max_fail_bytes` caps how many bytes may be discarded while searching;
/// 0 means unlimited. The returned [`Framed::len`] is 0 unless
/// [`Framed::stop`] is [`FrameStop::Telegram`].
pub fn read_telegram<L: SerialLink + ?Sized>(
    link: &mut L,
    buf: &mut [u8],
    max_fail_bytes: usize,
) -> Framed {
    let mut scanner = Scanner {
        link,
        buf,
        max_fail_bytes,
        failed: 0,
        consumed: 0,
    };

    let result = scanner.run();
    let (len, stop) = match result {
        Ok(len) => (len, FrameStop::Telegram),
        Err(stop) => (0, stop),
    };

    if len > 0 {
        trace!("Telegram: {}", escape_ascii(&scanner.buf[..len]));
    }

    Framed {
        len,
        failed_bytes: scanner.failed,
        consumed: scanner.consumed,
        stop,
    }
}

/// Integrity verdict for a framed telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CrcCheck {
    /// Old-style telegram, or no CRC reported for it
    NotApplicable,
    /// The reported CRC matches the calculated one
    Verified(u16),
}

/// Calculate the CRC of a new-style telegram.
///
/// Returns `None` for old-style telegrams, which carry no CRC, and for byte
/// strings that are not framed telegrams.
pub fn telegram_crc(telegram: &[u8]) -> Option<u16> {
    let len = telegram.len();
    if len >= OLD_STYLE_TRAILER_LEN + 1 && telegram[len - OLD_STYLE_TRAILER_LEN - 1] == TELEGRAM_END {
        return None;
    }
    if len >= NEW_STYLE_TRAILER_LEN + 1 && telegram[len - NEW_STYLE_TRAILER_LEN - 1] == TELEGRAM_END {
        // From the start of the telegram up to and including '!'
        return Some(crc16(&telegram[..len - NEW_STYLE_TRAILER_LEN]));
    }
    None
}

/// Compare the CRC the grammar read from the trailer with the calculated one.
pub fn verify_crc(telegram: &[u8], reported: Option<u16>) -> Result<CrcCheck, P1Error> {
    let Some(calculated) = telegram_crc(telegram) else {
        return Ok(CrcCheck::NotApplicable);
    };

    match reported {
        Some(reported) if reported == calculated => {
            debug!("Telegram CRC 0x{calculated:04X} verified");
            Ok(CrcCheck::Verified(calculated))
        }
        Some(reported) => {
            error!("Data CRC 0x{calculated:04X} does not match telegram CRC 0x{reported:04X}");
            Err(P1Error::CrcMismatch {
                calculated,
                reported,
            })
        }
        None => {
            warn!("New-style telegram without a reported CRC, skipping verification");
            Ok(CrcCheck::NotApplicable)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::MockSerialPort;
    use crate::util::hex::encode_crc16;

    const OLD_STYLE: &[u8] = b"/XMX5LGBBFFB231215123\r\n\r\n1-0:1.8.0(000671.578*kWh)\r\n!\r\n";

    fn new_style(body: &[u8]) -> Vec<u8> {
        let mut telegram = body.to_vec();
        telegram.push(b'!');
        let crc = crc16(&telegram);
        telegram.extend_from_slice(encode_crc16(crc).as_bytes());
        telegram.extend_from_slice(b"\r\n");
        telegram
    }

    fn frame(input: &[u8], bufsize: usize, max_fail: usize) -> (Framed, Vec<u8>) {
        let mut port = MockSerialPort::plain();
        port.queue_rx_data(input);
        let mut buf = vec![0u8; bufsize];
        let framed = read_telegram(&mut port, &mut buf, max_fail);
        buf.truncate(framed.len);
        (framed, buf)
    }

    #[test]
    fn test_old_style_telegram() {
        let (framed, buf) = frame(OLD_STYLE, 1024, 0);
        assert_eq!(framed.stop, FrameStop::Telegram);
        assert_eq!(framed.len, OLD_STYLE.len());
        assert_eq!(buf, OLD_STYLE);
        assert_eq!(framed.failed_bytes, 0);
    }

    #[test]
    fn test_new_style_telegram() {
        let telegram = new_style(b"/ISK5\\2M550T-1012\r\n\r\n1-3:0.2.8(50)\r\n");
        let (framed, buf) = frame(&telegram, 1024, 0);
        assert_eq!(framed.stop, FrameStop::Telegram);
        assert_eq!(buf, telegram);
    }

    #[test]
    fn test_bad_trailer_restarts_scan() {
        let mut input = b"/ABC\r\n!xxxxxx".to_vec();
        input.extend_from_slice(OLD_STYLE);
        let (framed, buf) = frame(&input, 1024, 0);
        assert_eq!(buf, OLD_STYLE);
        // "/ABC\r\n!" plus six trailer bytes
        assert_eq!(framed.failed_bytes, 13);
    }

    #[test]
    fn test_stray_slash_is_content() {
        let input = b"/AB/CD\r\n!\r\n";
        let (framed, buf) = frame(input, 64, 0);
        assert_eq!(framed.len, input.len());
        assert_eq!(buf, input);
    }

    #[test]
    fn test_overflow_counts_full_buffer() {
        let mut input = vec![b'/'];
        input.extend(std::iter::repeat(b'x').take(31));
        input.extend_from_slice(b"/A\r\n!\r\n");
        let (framed, buf) = frame(&input, 32, 0);
        assert_eq!(framed.stop, FrameStop::Telegram);
        assert_eq!(buf, b"/A\r\n!\r\n");
        assert_eq!(framed.failed_bytes, 32);
    }

    #[test]
    fn test_trailer_must_fit_buffer() {
        // '!' is the last byte that fits, the CR LF would overflow
        let (framed, _) = frame(b"/ABCDEF!\r\n", 8, 0);
        assert_eq!(framed.len, 0);
        assert_eq!(framed.stop, FrameStop::EndOfStream);
        assert_eq!(framed.failed_bytes, 10);
    }

    #[test]
    fn test_end_of_stream_mid_telegram() {
        let (framed, _) = frame(b"/partial telegram", 64, 0);
        assert_eq!(framed.len, 0);
        assert_eq!(framed.stop, FrameStop::EndOfStream);
    }

    #[test]
    fn test_fail_limit() {
        let junk = vec![b'x'; 100];
        let (framed, _) = frame(&junk, 64, 10);
        assert_eq!(framed.stop, FrameStop::FailLimit);
        assert_eq!(framed.failed_bytes, 10);
        assert_eq!(framed.consumed, 10);
    }

    #[test]
    fn test_read_error_stops() {
        let mut port = MockSerialPort::terminal();
        port.queue_rx_data(b"/AB");
        port.set_next_read_error(io::ErrorKind::BrokenPipe);
        let mut buf = [0u8; 64];
        let framed = read_telegram(&mut port, &mut buf, 0);
        assert_eq!(framed.stop, FrameStop::ReadError(io::ErrorKind::BrokenPipe));
        assert_eq!(framed.len, 0);
    }

    #[test]
    fn test_telegram_crc_shapes() {
        assert_eq!(telegram_crc(OLD_STYLE), None);

        let telegram = new_style(b"/ABC\r\n\r\n");
        let expected = crc16(&telegram[..telegram.len() - 6]);
        assert_eq!(telegram_crc(&telegram), Some(expected));

        assert_eq!(telegram_crc(b"no"), None);
    }

    #[test]
    fn test_verify_crc() {
        let telegram = new_style(b"/ABC\r\n\r\n");
        let crc = telegram_crc(&telegram).unwrap();

        assert_eq!(verify_crc(&telegram, Some(crc)).unwrap(), CrcCheck::Verified(crc));
        assert_eq!(verify_crc(&telegram, None).unwrap(), CrcCheck::NotApplicable);
        assert_eq!(verify_crc(OLD_STYLE, None).unwrap(), CrcCheck::NotApplicable);

        match verify_crc(&telegram, Some(crc ^ 0x0100)) {
            Err(P1Error::CrcMismatch { calculated, reported }) => {
                assert_eq!(calculated, crc);
                assert_eq!(reported, crc ^ 0x0100);
            }
            other => panic!("expected CRC mismatch, got {other:?}"),
        }
    }
}
