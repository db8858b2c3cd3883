//! # OBIS Telegram Grammar
//!
//! The session hands every framed telegram to a [`TelegramGrammar`]. The
//! grammar interprets the content and reports two things back to the
//! integrity check: how many lines it could not parse, and the CRC it read
//! from the trailer.
//!
//! [`ObisGrammar`] is the default implementation. It accepts the
//! identification line, records such as `1-0:1.8.1(000671.578*kWh)`,
//! continuation lines starting with `(`, and the `!` trailer with an
//! optional CRC. Malformed lines are counted and skipped.

pub mod parser;

pub use parser::{CosemValue, ObisRecord};

use log::{debug, trace};

/// Result of [`TelegramGrammar::finish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ParseStatus {
    /// The end marker was reached
    Reached,
    /// The input stopped before the end marker
    NotReached,
    /// The input is not a telegram at all
    Error,
}

/// Content parser driven by the session.
pub trait TelegramGrammar {
    /// Reset all state before a new telegram.
    fn init(&mut self);

    /// Feed a chunk of telegram bytes.
    fn feed(&mut self, data: &[u8]);

    /// Signal the end of input.
    fn finish(&mut self) -> ParseStatus;

    fn parse_errors(&self) -> usize;

    /// CRC read from the `!HHHH` trailer, if any.
    fn reported_crc(&self) -> Option<u16>;
}

/// Line-oriented OBIS parser.
#[derive(Debug, Default)]
pub struct ObisGrammar {
    pending: Vec<u8>,
    identification: Option<String>,
    records: Vec<ObisRecord>,
    reported_crc: Option<u16>,
    parse_errors: usize,
    ended: bool,
}

impl ObisGrammar {
    pub fn new() -> Self {
        Self::default()
    }

    /// The identification line without the leading `/`.
    pub fn identification(&self) -> Option<&str> {
        self.identification.as_deref()
    }

    pub fn records(&self) -> &[ObisRecord] {
        &self.records
    }

    /// First record with the given OBIS code.
    pub fn find(&self, code: &str) -> Option<&ObisRecord> {
        self.records.iter().find(|r| r.code == code)
    }

    fn line_error(&mut self, line: &str) {
        debug!("Unparseable telegram line: {line:?}");
        self.parse_errors += 1;
    }

    fn process_line(&mut self, raw: &[u8]) {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.is_empty() || self.ended {
            return;
        }

        let Ok(line) = std::str::from_utf8(raw) else {
            self.line_error(&String::from_utf8_lossy(raw));
            return;
        };

        if self.identification.is_none() && self.records.is_empty() && line.starts_with('/') {
            match parser::identification_line(line) {
                Ok((_, ident)) => {
                    trace!("Identification: {ident}");
                    self.identification = Some(ident.to_string());
                }
                Err(_) => self.line_error(line),
            }
            return;
        }

        if line.starts_with('!') {
            self.ended = true;
            match parser::end_line(line) {
                Ok((_, crc)) => self.reported_crc = crc,
                Err(_) => self.line_error(line),
            }
            return;
        }

        if line.starts_with('(') {
            match parser::value_line(line) {
                Ok((_, values)) if !self.records.is_empty() => {
                    if let Some(record) = self.records.last_mut() {
                        record.values.extend(values);
                    }
                }
                _ => self.line_error(line),
            }
            return;
        }

        match parser::record_line(line) {
            Ok((_, record)) => {
                trace!("Record {} with {} values", record.code, record.values.len());
                self.records.push(record);
            }
            Err(_) => self.line_error(line),
        }
    }
}

impl TelegramGrammar for ObisGrammar {
    fn init(&mut self) {
        self.pending.clear();
        self.identification = None;
        self.records.clear();
        self.reported_crc = None;
        self.parse_errors = 0;
        self.ended = false;
    }

    fn feed(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.process_line(&line[..pos]);
        }
    }

    fn finish(&mut self) -> ParseStatus {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.process_line(&line);
        }

        if self.identification.is_none() {
            ParseStatus::Error
        } else if self.ended {
            ParseStatus::Reached
        } else {
            ParseStatus::NotReached
        }
    }

    fn parse_errors(&self) -> usize {
        self.parse_errors
    }

    fn reported_crc(&self) -> Option<u16> {
        self.reported_crc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(data: &[u8]) -> (ObisGrammar, ParseStatus) {
        let mut grammar = ObisGrammar::new();
        grammar.init();
        grammar.feed(data);
        let status = grammar.finish();
        (grammar, status)
    }

    #[test]
    fn test_old_style_telegram() {
        let (grammar, status) =
            parse(b"/XMX5LGBBFFB231215123\r\n\r\n1-0:1.8.0(000671.578*kWh)\r\n!\r\n");
        assert_eq!(status, ParseStatus::Reached);
        assert_eq!(grammar.identification(), Some("XMX5LGBBFFB231215123"));
        assert_eq!(grammar.records().len(), 1);
        assert_eq!(grammar.parse_errors(), 0);
        assert_eq!(grammar.reported_crc(), None);
    }

    #[test]
    fn test_crc_trailer_and_continuation() {
        let (grammar, status) = parse(
            b"/KFM5KAIFA-METER\r\n\r\n0-1:24.3.0(121030140000)(00)(60)(1)(0-1:24.2.1)(m3)\r\n(00000.000)\r\n!E9B0\r\n",
        );
        assert_eq!(status, ParseStatus::Reached);
        assert_eq!(grammar.reported_crc(), Some(0xE9B0));
        let gas = grammar.find("0-1:24.3.0").unwrap();
        assert_eq!(gas.values.len(), 7);
        assert_eq!(gas.values[6].value, "00000.000");
    }

    #[test]
    fn test_fed_in_pieces() {
        let data = b"/ISK5MT174-0001\r\n1.8.1(001234.5*kWh)\r\nF.F(00)\r\n!";
        let mut grammar = ObisGrammar::new();
        grammar.init();
        for chunk in data.chunks(3) {
            grammar.feed(chunk);
        }
        assert_eq!(grammar.finish(), ParseStatus::Reached);
        assert_eq!(grammar.find("1.8.1").unwrap().values[0].unit.as_deref(), Some("kWh"));
        assert_eq!(grammar.find("F.F").unwrap().values[0].value, "00");
    }

    #[test]
    fn test_malformed_lines_counted() {
        let (grammar, status) =
            parse(b"/ABC5\r\nnot a record\r\n1.8.0(1\r\n(orphan)\r\n2.8.0(2)\r\n!\r\n");
        assert_eq!(status, ParseStatus::Reached);
        // The continuation has no record before it to attach to
        assert_eq!(grammar.parse_errors(), 3);
        assert_eq!(grammar.records().len(), 1);
    }

    #[test]
    fn test_missing_end_marker() {
        let (_, status) = parse(b"/ABC5\r\n1.8.0(1)\r\n");
        assert_eq!(status, ParseStatus::NotReached);
    }

    #[test]
    fn test_missing_identification() {
        let (grammar, status) = parse(b"1.8.0(1)\r\n!\r\n");
        assert_eq!(status, ParseStatus::Error);
        assert_eq!(grammar.parse_errors(), 0);
    }

    #[test]
    fn test_init_resets_state() {
        let (mut grammar, _) = parse(b"/ABC5\r\nbad\r\n!1234\r\n");
        assert_eq!(grammar.parse_errors(), 1);
        grammar.init();
        assert_eq!(grammar.parse_errors(), 0);
        assert_eq!(grammar.reported_crc(), None);
        assert!(grammar.records().is_empty());
    }
}
