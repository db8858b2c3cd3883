//! # Telegram Session
//!
//! A session owns the link to one meter, the telegram buffer, the grammar
//! and an optional dump file. It runs one of two read cycles:
//!
//! - [`TelegramSession::read`] frames a pushed P1 telegram, parses it and
//!   verifies its CRC. When nothing arrives on a terminal it switches
//!   between the DSMR v4 (115200 8N1) and v2/v3 (9600 7E1) line settings
//!   for the next attempt.
//! - [`TelegramSession::read_d0`] signs on to an IEC 62056-21 meter, reads
//!   the data block and signs off.
//!
//! Telegrams the grammar could not fully parse, or whose CRC does not
//! match, are appended to the dump file for later analysis.

use crate::constants::{
    DEFAULT_BUFFER_SIZE, DEFAULT_READ_TIMEOUT_SECS, MAX_READ_TIMEOUT_SECS, WAKEUP_DELAY_MS,
};
use crate::d0::{read_body, sign_off, sign_on, MeterIdentification, ProtocolMode};
use crate::error::P1Error;
use crate::obis::{ObisGrammar, ParseStatus, TelegramGrammar};
use crate::p1::{read_telegram, verify_crc, CrcCheck, FrameStop, Framed};
use crate::serial::{BaudRate, LineConfig, SerialLink, SerialPortAdapter};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// When a D0 session signs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakePolicy {
    /// Before every read; the sign-off of the previous read idles the meter
    #[default]
    EveryRead,
    /// Only until the meter has identified itself
    Once,
}

/// Session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Telegram buffer capacity in bytes
    pub buffer_size: usize,
    /// Inter-character timeout; zero or negative selects the default
    pub timeout_secs: i32,
    /// File that collects telegrams which failed to parse or verify
    pub dump_path: Option<PathBuf>,
    /// Bytes the P1 framer may discard per read; `None` uses the buffer
    /// size, `Some(0)` never gives up
    pub max_fail_bytes: Option<usize>,
    /// Pause between the D0 wake-up and sign-on sequences
    pub wakeup_delay_ms: u64,
    pub handshake: HandshakePolicy,
    /// Probe with full DSMR line profiles rather than the rate alone
    pub dsmr_profile_probe: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            buffer_size: DEFAULT_BUFFER_SIZE,
            timeout_secs: DEFAULT_READ_TIMEOUT_SECS as i32,
            dump_path: None,
            max_fail_bytes: None,
            wakeup_delay_ms: WAKEUP_DELAY_MS,
            handshake: HandshakePolicy::EveryRead,
            dsmr_profile_probe: true,
        }
    }
}

impl SessionConfig {
    /// The timeout in the tenths of a second the terminal timer counts.
    pub fn timeout_deciseconds(&self) -> u8 {
        let secs = if self.timeout_secs <= 0 {
            DEFAULT_READ_TIMEOUT_SECS
        } else {
            (self.timeout_secs as u32).min(MAX_READ_TIMEOUT_SECS)
        };
        (secs * 10) as u8
    }

    pub fn fail_limit(&self) -> usize {
        self.max_fail_bytes.unwrap_or(self.buffer_size)
    }

    pub fn wakeup_delay(&self) -> Duration {
        Duration::from_millis(self.wakeup_delay_ms)
    }
}

/// Outcome of one successful read cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TelegramReport {
    /// Telegram length; the bytes are available from [`TelegramSession::telegram`]
    pub len: usize,
    pub status: ParseStatus,
    pub crc: CrcCheck,
    pub parse_errors: usize,
    /// Whether the end marker was received
    pub complete: bool,
}

impl TelegramReport {
    /// Turn a nonzero parse error count into [`P1Error::ParseErrors`].
    pub fn check_parse_errors(&self) -> Result<(), P1Error> {
        match self.parse_errors {
            0 => Ok(()),
            n => Err(P1Error::ParseErrors(n)),
        }
    }
}

/// Reader for one meter.
pub struct TelegramSession<L: SerialLink = SerialPortAdapter, G: TelegramGrammar = ObisGrammar> {
    link: Option<L>,
    grammar: G,
    buf: Vec<u8>,
    len: usize,
    line: LineConfig,
    mode: ProtocolMode,
    identification: Option<MeterIdentification>,
    dump: Option<File>,
    config: SessionConfig,
    last_frame: Option<Framed>,
}

impl TelegramSession<SerialPortAdapter, ObisGrammar> {
    /// Open a P1 device (or captured stream) at `path`.
    pub fn open_p1(path: impl AsRef<Path>, config: SessionConfig) -> Result<Self, P1Error> {
        let path = path.as_ref();
        let link = SerialPortAdapter::open(path, false)?;
        info!("Opened P1 input {}", path.display());
        Self::p1_with_link(link, ObisGrammar::new(), config)
    }

    /// Open an IEC 62056-21 optical probe (or captured stream) at `path`.
    pub fn open_d0(path: impl AsRef<Path>, config: SessionConfig) -> Result<Self, P1Error> {
        let path = path.as_ref();
        let link = SerialPortAdapter::open(path, true)?;
        info!("Opened D0 input {}", path.display());
        Self::d0_with_link(link, ObisGrammar::new(), config)
    }
}

impl<L: SerialLink, G: TelegramGrammar> TelegramSession<L, G> {
    /// Start a P1 session on an already opened link.
    pub fn p1_with_link(link: L, grammar: G, config: SessionConfig) -> Result<Self, P1Error> {
        let line = LineConfig::dsmr_v4(config.timeout_deciseconds());
        Self::start(link, grammar, config, line, ProtocolMode::P1)
    }

    /// Start a D0 session on an already opened link.
    pub fn d0_with_link(link: L, grammar: G, config: SessionConfig) -> Result<Self, P1Error> {
        let line = LineConfig::iec_sign_on(config.timeout_deciseconds());
        Self::start(link, grammar, config, line, ProtocolMode::Unresolved)
    }

    fn start(
        mut link: L,
        grammar: G,
        config: SessionConfig,
        line: LineConfig,
        mode: ProtocolMode,
    ) -> Result<Self, P1Error> {
        match Self::prepare(&mut link, &config, &line) {
            Ok((dump, buf)) => Ok(TelegramSession {
                link: Some(link),
                grammar,
                buf,
                len: 0,
                line,
                mode,
                identification: None,
                dump,
                config,
                last_frame: None,
            }),
            Err(e) => {
                if let Err(close_err) = link.close() {
                    warn!("Could not close input after failed open: {close_err}");
                }
                Err(e)
            }
        }
    }

    fn prepare(
        link: &mut L,
        config: &SessionConfig,
        line: &LineConfig,
    ) -> Result<(Option<File>, Vec<u8>), P1Error> {
        if link.is_terminal() {
            link.apply(line)?;
            link.flush_input()?;
        }

        let dump = match &config.dump_path {
            Some(path) => Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| P1Error::DumpOpenFailed {
                        path: path.clone(),
                        source,
                    })?,
            ),
            None => None,
        };

        Ok((dump, allocate_buffer(config.buffer_size)?))
    }

    /// Read, parse and verify one pushed P1 telegram.
    pub fn read(&mut self) -> Result<TelegramReport, P1Error> {
        let link = self.link.as_mut().ok_or(P1Error::NullSession)?;
        self.len = 0;

        let framed = read_telegram(link, &mut self.buf, self.config.fail_limit());
        self.last_frame = Some(framed);
        debug!(
            "Framer stopped with {:?} after {} bytes, {} discarded",
            framed.stop, framed.consumed, framed.failed_bytes
        );

        if framed.len == 0 {
            if link.is_terminal() && self.mode == ProtocolMode::P1 {
                let next = probe_line(&self.line, self.config.dsmr_profile_probe);
                info!("No telegram, trying {} baud next", next.baud.as_u32());
                match link.flush_input().and_then(|_| link.apply(&next)) {
                    Ok(()) => self.line = next,
                    Err(e) => warn!("Could not switch to {} baud: {e}", next.baud.as_u32()),
                }
            }
            return Err(match framed.stop {
                FrameStop::FailLimit => P1Error::FramingAbandoned {
                    failed_bytes: framed.failed_bytes,
                },
                FrameStop::ReadError(kind) => P1Error::Io(io::Error::from(kind)),
                FrameStop::Telegram | FrameStop::EndOfStream => P1Error::NoData,
            });
        }

        self.len = framed.len;
        self.process(true, true)
    }

    /// Sign on to a D0 meter if needed, then read and parse its data block.
    pub fn read_d0(&mut self) -> Result<TelegramReport, P1Error> {
        let link = self.link.as_mut().ok_or(P1Error::NullSession)?;
        self.len = 0;

        let handshake_due = link.is_terminal()
            && self.mode != ProtocolMode::P1
            && (self.mode == ProtocolMode::Unresolved
                || self.config.handshake == HandshakePolicy::EveryRead);

        let mut start = 0;
        if handshake_due {
            let sign_on_line = LineConfig::iec_sign_on(self.config.timeout_deciseconds());
            if self.line != sign_on_line {
                debug!("Returning to {} baud for sign-on", sign_on_line.baud.as_u32());
                link.apply(&sign_on_line)?;
                self.line = sign_on_line;
            }

            let handshake = sign_on(link, &mut self.buf, self.line, self.config.wakeup_delay())?;
            self.mode = handshake.mode();
            self.line = handshake.line;
            start = handshake.id_len;
            self.identification = Some(handshake.identification);
        }

        let body = read_body(link, &mut self.buf, start)?;
        if body.len == 0 {
            return Err(P1Error::NoData);
        }
        debug!("Meter detected or assumed to use mode {}", self.mode);

        if body.complete && link.is_terminal() && self.mode != ProtocolMode::P1 {
            sign_off(link);
        }

        self.len = body.len;
        self.process(false, body.complete)
    }

    fn process(&mut self, check_crc: bool, complete: bool) -> Result<TelegramReport, P1Error> {
        let telegram = &self.buf[..self.len];

        self.grammar.init();
        self.grammar.feed(telegram);
        let status = self.grammar.finish();
        let parse_errors = self.grammar.parse_errors();
        if parse_errors > 0 {
            info!("Parse errors: {parse_errors}");
        }

        let crc = if check_crc {
            verify_crc(telegram, self.grammar.reported_crc())
        } else {
            Ok(CrcCheck::NotApplicable)
        };

        if parse_errors > 0 || crc.is_err() {
            if let Some(dump) = self.dump.as_mut() {
                if let Err(e) = dump.write_all(telegram).and_then(|_| dump.flush()) {
                    warn!("Could not write telegram to dump file: {e}");
                }
            }
        }

        Ok(TelegramReport {
            len: self.len,
            status,
            crc: crc?,
            parse_errors,
            complete,
        })
    }

    /// Restore the terminal, release the device and drop the buffer.
    /// Closing an already closed session does nothing.
    pub fn close(&mut self) -> Result<(), P1Error> {
        let result = match self.link.take() {
            Some(mut link) => link.close(),
            None => Ok(()),
        };
        if let Some(mut dump) = self.dump.take() {
            if let Err(e) = dump.flush() {
                warn!("Could not flush dump file: {e}");
            }
        }
        self.buf = Vec::new();
        self.len = 0;
        result
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    /// Whether the session reads from a serial terminal rather than a file.
    pub fn is_terminal(&self) -> bool {
        self.link.as_ref().is_some_and(|link| link.is_terminal())
    }

    /// Bytes of the last telegram read.
    pub fn telegram(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn grammar(&self) -> &G {
        &self.grammar
    }

    pub fn mode(&self) -> ProtocolMode {
        self.mode
    }

    /// Line settings currently applied to the link.
    pub fn line_config(&self) -> LineConfig {
        self.line
    }

    pub fn identification(&self) -> Option<&MeterIdentification> {
        self.identification.as_ref()
    }

    /// Framer statistics of the last P1 read.
    pub fn last_frame(&self) -> Option<Framed> {
        self.last_frame
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl<L: SerialLink, G: TelegramGrammar> Drop for TelegramSession<L, G> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn allocate_buffer(size: usize) -> Result<Vec<u8>, P1Error> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size).map_err(|_| P1Error::BufferAllocFailed(size))?;
    buf.resize(size, 0);
    Ok(buf)
}

/// The line settings to try after a P1 read came up empty.
fn probe_line(current: &LineConfig, full_profile: bool) -> LineConfig {
    let timeout_ds = current.timeout_ds;
    match (current.baud, full_profile) {
        (BaudRate::Baud115200, true) => LineConfig::dsmr_v2(timeout_ds),
        (_, true) => LineConfig::dsmr_v4(timeout_ds),
        (BaudRate::Baud115200, false) => current.with_baud(BaudRate::Baud9600),
        (_, false) => current.with_baud(BaudRate::Baud115200),
    }
}
