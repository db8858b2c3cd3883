//! # Serial Port Adapter
//!
//! Opens the meter device without making it the controlling terminal, keeps a
//! snapshot of its terminal attributes, and restores that snapshot on close.
//! When the path is not a terminal (a regular file or pipe holding a captured
//! stream) the adapter degrades to a plain read/write stream.

use crate::error::P1Error;
use crate::serial::{CharSize, LineConfig, Parity, SerialLink};
use log::{debug, warn};
use nix::sys::termios::{
    self, ControlFlags, FlushArg, InputFlags, LocalFlags, OutputFlags, SetArg,
    SpecialCharacterIndices, Termios,
};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Handle to a meter device (or captured stream file).
pub struct SerialPortAdapter {
    file: Option<File>,
    path: PathBuf,
    /// Attributes found at open time, restored on close
    saved: Option<Termios>,
    /// Attributes last applied
    working: Option<Termios>,
    last_error: Option<io::ErrorKind>,
}

impl SerialPortAdapter {
    /// Opens `path` for reading, and for writing too when `duplex` is set.
    pub fn open(path: impl AsRef<Path>, duplex: bool) -> Result<Self, P1Error> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(duplex)
            .custom_flags(libc::O_NOCTTY)
            .open(path)
            .map_err(|source| P1Error::DeviceOpenFailed {
                path: path.to_path_buf(),
                source,
            })?;

        let saved = match termios::tcgetattr(file.as_fd()) {
            Ok(attrs) => {
                debug!("Input device {} seems to be a serial terminal", path.display());
                Some(attrs)
            }
            Err(_) => {
                debug!("Input {} is not a terminal, reading it as a plain stream", path.display());
                None
            }
        };

        Ok(SerialPortAdapter {
            file: Some(file),
            path: path.to_path_buf(),
            working: saved.clone(),
            saved,
            last_error: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Kind of the most recent read or write failure, if any.
    pub fn last_error(&self) -> Option<io::ErrorKind> {
        self.last_error
    }

    fn file_mut(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port is closed"))
    }
}

impl SerialLink for SerialPortAdapter {
    fn is_terminal(&self) -> bool {
        self.file.is_some() && self.saved.is_some()
    }

    fn apply(&mut self, config: &LineConfig) -> Result<(), P1Error> {
        let (Some(file), Some(attrs)) = (self.file.as_ref(), self.working.as_mut()) else {
            return Ok(());
        };

        // Raw mode: no echo, no canonical input, no output processing, no flow control
        attrs.input_flags = InputFlags::empty();
        attrs.output_flags = OutputFlags::empty();
        attrs.local_flags = LocalFlags::empty();

        let mut control = ControlFlags::CLOCAL | ControlFlags::CREAD;
        control |= match config.char_size {
            CharSize::Seven => ControlFlags::CS7,
            CharSize::Eight => ControlFlags::CS8,
        };
        if config.parity == Parity::Even {
            control |= ControlFlags::PARENB;
        }
        attrs.control_flags = control;

        // Return as soon as one byte arrives or the timer expires
        attrs.control_chars[SpecialCharacterIndices::VTIME as usize] = config.timeout_ds;
        attrs.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;

        termios::cfsetspeed(attrs, config.baud.into())?;
        termios::tcsetattr(file.as_fd(), SetArg::TCSANOW, attrs)?;

        debug!(
            "Applied {} baud {:?} {:?} parity, timeout {} ds to {}",
            config.baud.as_u32(),
            config.char_size,
            config.parity,
            config.timeout_ds,
            self.path.display()
        );
        Ok(())
    }

    fn flush_input(&mut self) -> Result<(), P1Error> {
        match (&self.file, &self.saved) {
            (Some(file), Some(_)) => Ok(termios::tcflush(file.as_fd(), FlushArg::TCIFLUSH)?),
            _ => Ok(()),
        }
    }

    fn drain_output(&mut self) -> Result<(), P1Error> {
        match (&self.file, &self.saved) {
            (Some(file), Some(_)) => Ok(termios::tcdrain(file.as_fd())?),
            _ => Ok(()),
        }
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            let result = self.file_mut()?.read(&mut byte);
            match result {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.last_error = Some(e.kind());
                    return Err(e);
                }
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let result = self.file_mut()?.write_all(data);
        if let Err(e) = &result {
            self.last_error = Some(e.kind());
        }
        result
    }

    fn close(&mut self) -> Result<(), P1Error> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };

        if let Some(saved) = self.saved.take() {
            // Restore old port settings before the descriptor goes away
            if let Err(e) = termios::tcsetattr(file.as_fd(), SetArg::TCSANOW, &saved) {
                warn!("Could not restore terminal attributes on {}: {}", self.path.display(), e);
            }
        }
        self.working = None;
        debug!("Closed {}", self.path.display());
        Ok(())
    }
}

impl Drop for SerialPortAdapter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::pty::{openpty, OpenptyResult};
    use std::os::fd::AsRawFd;

    /// A pseudo-terminal pair and a path that opens its slave side.
    fn pty_slave() -> (OpenptyResult, PathBuf) {
        let pty = openpty(None, None).unwrap();
        let path = PathBuf::from(format!("/proc/self/fd/{}", pty.slave.as_raw_fd()));
        (pty, path)
    }

    #[test]
    fn test_pty_raw_settings_applied() {
        let (pty, path) = pty_slave();
        let mut port = SerialPortAdapter::open(&path, true).unwrap();
        assert!(port.is_terminal());

        port.apply(&LineConfig::dsmr_v4(37)).unwrap();
        let attrs = termios::tcgetattr(pty.slave.as_fd()).unwrap();
        assert_eq!(attrs.control_chars[SpecialCharacterIndices::VTIME as usize], 37);
        assert_eq!(attrs.control_chars[SpecialCharacterIndices::VMIN as usize], 0);
        assert!(!attrs.local_flags.contains(LocalFlags::ICANON));
        assert!(!attrs.local_flags.contains(LocalFlags::ECHO));
        // The pty driver keeps 8 bit characters without parity
        assert!(attrs.control_flags.contains(ControlFlags::CS8));
        assert!(!attrs.control_flags.contains(ControlFlags::PARENB));

        port.flush_input().unwrap();
        port.drain_output().unwrap();
    }

    #[test]
    fn test_pty_reads_without_line_buffering() {
        let (pty, path) = pty_slave();
        let mut port = SerialPortAdapter::open(&path, true).unwrap();
        port.apply(&LineConfig::dsmr_v4(5)).unwrap();

        let mut master = File::from(pty.master);
        master.write_all(b"/X").unwrap();

        assert_eq!(port.read_byte().unwrap(), Some(b'/'));
        assert_eq!(port.read_byte().unwrap(), Some(b'X'));
        // Nothing more arrives before the inter-character timeout
        assert_eq!(port.read_byte().unwrap(), None);
    }

    #[test]
    fn test_pty_close_restores_attributes() {
        let (pty, path) = pty_slave();
        let before = termios::tcgetattr(pty.slave.as_fd()).unwrap();
        assert!(before.local_flags.contains(LocalFlags::ICANON));

        let mut port = SerialPortAdapter::open(&path, true).unwrap();
        port.apply(&LineConfig::dsmr_v4(37)).unwrap();
        port.close().unwrap();
        assert!(!port.is_terminal());

        let after = termios::tcgetattr(pty.slave.as_fd()).unwrap();
        assert_eq!(after.local_flags, before.local_flags);
        assert_eq!(after.input_flags, before.input_flags);
        assert_eq!(after.output_flags, before.output_flags);
        assert_eq!(after.control_chars, before.control_chars);
    }

    #[test]
    fn test_plain_file_is_not_terminal() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"/AB").unwrap();

        let mut port = SerialPortAdapter::open(tmp.path(), false).unwrap();
        assert!(!port.is_terminal());

        // Terminal operations are no-ops on plain files
        port.apply(&LineConfig::dsmr_v4(100)).unwrap();
        port.flush_input().unwrap();
        port.drain_output().unwrap();

        assert_eq!(port.read_byte().unwrap(), Some(b'/'));
        assert_eq!(port.read_byte().unwrap(), Some(b'A'));
        assert_eq!(port.read_byte().unwrap(), Some(b'B'));
        assert_eq!(port.read_byte().unwrap(), None);
    }

    #[test]
    fn test_write_to_read_only_input() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut port = SerialPortAdapter::open(tmp.path(), false).unwrap();
        assert_eq!(port.path(), tmp.path());
        assert!(port.last_error().is_none());

        assert!(port.write(b"/?!\r\n").is_err());
        assert!(port.last_error().is_some());
    }

    #[test]
    fn test_open_missing_device() {
        let result = SerialPortAdapter::open("/nonexistent/ttyP1", false);
        assert!(matches!(result, Err(P1Error::DeviceOpenFailed { .. })));
    }

    #[test]
    fn test_close_is_idempotent() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut port = SerialPortAdapter::open(tmp.path(), true).unwrap();
        port.close().unwrap();
        port.close().unwrap();

        let err = port.read_byte().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert!(!port.is_terminal());
    }
}
