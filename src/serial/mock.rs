//! Mock serial port implementation for testing
//!
//! This module provides a mock serial link that can be used to test the P1
//! framer, the D0 handshake and the session without a meter attached.
//! Clones share state, so a test can keep one handle for inspection while
//! the session owns another.

use crate::error::P1Error;
use crate::serial::{LineConfig, SerialLink};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MockState {
    /// Data to be read from the port (incoming)
    rx: VecDeque<u8>,
    /// Data written to the port (outgoing)
    tx: Vec<u8>,
    terminal: bool,
    /// Every configuration passed to `apply`, oldest first
    applied: Vec<LineConfig>,
    flushes: usize,
    drains: usize,
    closes: usize,
    closed: bool,
    /// Bytes handed out by `read_byte`
    consumed: usize,
    next_read_error: Option<io::ErrorKind>,
    next_write_error: Option<io::ErrorKind>,
    /// Fail the next apply, flush or drain
    next_control_error: bool,
    /// Replies released into `rx` when their request is written, in order
    replies: VecDeque<(Vec<u8>, Vec<u8>)>,
}

/// In-memory serial link that simulates a meter
#[derive(Debug, Clone, Default)]
pub struct MockSerialPort {
    state: Arc<Mutex<MockState>>,
}

impl MockSerialPort {
    /// A mock that behaves like a serial terminal.
    pub fn terminal() -> Self {
        let port = MockSerialPort::default();
        port.lock().terminal = true;
        port
    }

    /// A mock that behaves like a plain file: no terminal attributes.
    pub fn plain() -> Self {
        MockSerialPort::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue data to be read from the port
    pub fn queue_rx_data(&self, data: &[u8]) {
        self.lock().rx.extend(data);
    }

    /// Queue `reply` to arrive once `request` has been written.
    ///
    /// Replies wait for their request, so they survive input flushes that
    /// happen before it is sent. Several replies to the same request are
    /// released one per write.
    pub fn reply_to(&self, request: &[u8], reply: &[u8]) {
        self.lock().replies.push_back((request.to_vec(), reply.to_vec()));
    }

    /// Get data that was written to the port
    pub fn get_tx_data(&self) -> Vec<u8> {
        self.lock().tx.clone()
    }

    /// Number of queued bytes not read yet
    pub fn rx_remaining(&self) -> usize {
        self.lock().rx.len()
    }

    /// Number of bytes read from the port so far
    pub fn consumed(&self) -> usize {
        self.lock().consumed
    }

    /// All line configurations applied so far
    pub fn applied_configs(&self) -> Vec<LineConfig> {
        self.lock().applied.clone()
    }

    /// The configuration currently in effect
    pub fn current_config(&self) -> Option<LineConfig> {
        self.lock().applied.last().copied()
    }

    pub fn flush_count(&self) -> usize {
        self.lock().flushes
    }

    pub fn drain_count(&self) -> usize {
        self.lock().drains
    }

    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Make the next read fail with `kind`
    pub fn set_next_read_error(&self, kind: io::ErrorKind) {
        self.lock().next_read_error = Some(kind);
    }

    /// Make the next write fail with `kind`
    pub fn set_next_write_error(&self, kind: io::ErrorKind) {
        self.lock().next_write_error = Some(kind);
    }

    /// Make the next `apply`, `flush_input` or `drain_output` fail
    pub fn set_next_control_error(&self) {
        self.lock().next_control_error = true;
    }
}

impl MockState {
    fn control_result(&mut self) -> Result<(), P1Error> {
        if std::mem::take(&mut self.next_control_error) {
            return Err(P1Error::Serial("simulated line control error".to_string()));
        }
        Ok(())
    }
}

impl SerialLink for MockSerialPort {
    fn is_terminal(&self) -> bool {
        let state = self.lock();
        state.terminal && !state.closed
    }

    fn apply(&mut self, config: &LineConfig) -> Result<(), P1Error> {
        let mut state = self.lock();
        state.control_result()?;
        if state.terminal {
            state.applied.push(*config);
        }
        Ok(())
    }

    fn flush_input(&mut self) -> Result<(), P1Error> {
        let mut state = self.lock();
        state.control_result()?;
        if state.terminal {
            state.rx.clear();
            state.flushes += 1;
        }
        Ok(())
    }

    fn drain_output(&mut self) -> Result<(), P1Error> {
        let mut state = self.lock();
        state.control_result()?;
        state.drains += 1;
        Ok(())
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut state = self.lock();
        if let Some(kind) = state.next_read_error.take() {
            return Err(io::Error::new(kind, "simulated read error"));
        }
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "mock port closed"));
        }
        let byte = state.rx.pop_front();
        if byte.is_some() {
            state.consumed += 1;
        }
        Ok(byte)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.lock();
        if let Some(kind) = state.next_write_error.take() {
            return Err(io::Error::new(kind, "simulated write error"));
        }
        state.tx.extend_from_slice(data);
        let released = state
            .replies
            .iter()
            .position(|(request, _)| request == data)
            .and_then(|pos| state.replies.remove(pos));
        if let Some((_, reply)) = released {
            state.rx.extend(reply);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), P1Error> {
        let mut state = self.lock();
        if !state.closed {
            state.closed = true;
            state.closes += 1;
        }
        Ok(())
    }
}
