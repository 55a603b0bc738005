//! Mock byte streams for testing the transports without hardware
//!
//! Two pairs are provided, each split into a side handed to the code under
//! test and a side kept by the test:
//!
//! - [`MockSerialPort`] / [`MockBridge`]: a blocking serial stream with a scripted
//!   Prologix bridge behind it. Every write is recorded with its timestamp.
//!   Replies can be queued behind a trigger line (usually `++read\n`) so they
//!   only become readable once the transport asks for them.
//! - [`MockResourceManager`] / [`MockVisaHarness`]: a VISA resource manager that
//!   knows a fixed set of resources and hands out scripted sessions.
//!
//! # Example
//!
//! ```
//! use rust_gpib::adapters::mock_adapter::MockBridge;
//! use rust_gpib::adapters::{SerialGpibTransport, SerialSettings, Transport};
//! use std::time::Duration;
//!
//! let (port, bridge) = MockBridge::new();
//! let mut transport = SerialGpibTransport::new(port, "mock", SerialSettings::default());
//!
//! bridge.reply_on_read(b"+1.23E-6\n");
//! let reply = transport.query("D?\n", Duration::ZERO).unwrap();
//!
//! assert_eq!(reply, "+1.23E-6\n");
//! assert_eq!(bridge.written_lines(), vec!["D?\n", "++read\n"]);
//! ```

use super::serial_adapter::READ_COMMAND;
use super::visa_adapter::{ResourceManager, VisaSession};
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// One `write` call seen by a mock stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    /// When the write happened.
    pub at: Instant,
    /// Bytes written.
    pub data: Vec<u8>,
}

impl WriteRecord {
    /// The written bytes as text.
    pub fn as_str(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

#[derive(Debug, Default)]
struct ScriptedStream {
    readable: VecDeque<u8>,
    triggered: HashMap<Vec<u8>, VecDeque<Vec<u8>>>,
    writes: Vec<WriteRecord>,
    disconnected: bool,
}

impl ScriptedStream {
    fn record_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.disconnected {
            return Err(disconnected());
        }
        self.writes.push(WriteRecord {
            at: Instant::now(),
            data: buf.to_vec(),
        });
        if let Some(reply) = self.triggered.get_mut(buf).and_then(VecDeque::pop_front) {
            self.readable.extend(reply);
        }
        Ok(buf.len())
    }

    fn take_byte(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        if self.disconnected {
            return Err(disconnected());
        }
        if buf.is_empty() {
            return Ok(Some(0));
        }
        Ok(self.readable.pop_front().map(|byte| {
            buf[0] = byte;
            1
        }))
    }
}

fn disconnected() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "mock device disconnected")
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking test thread must not hide the recorded state from the others.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Serial bridge
// =============================================================================

#[derive(Debug, Default)]
struct BridgeState {
    stream: ScriptedStream,
    emulate_addressing: bool,
    current_address: Option<String>,
    port_dropped: bool,
}

/// The client-facing side: a blocking serial stream.
///
/// A read with nothing available blocks for the poll timeout and then fails
/// with `TimedOut`, like a `serialport` handle.
#[derive(Debug)]
pub struct MockSerialPort {
    state: Arc<Mutex<BridgeState>>,
    poll_timeout: Duration,
}

/// The test-facing side for scripting and inspecting the bridge.
#[derive(Debug, Clone)]
pub struct MockBridge {
    state: Arc<Mutex<BridgeState>>,
}

impl MockBridge {
    /// Create a connected port/bridge pair with a 1 ms poll timeout.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (MockSerialPort, MockBridge) {
        Self::with_poll_timeout(Duration::from_millis(1))
    }

    /// Create a pair whose empty reads block for `poll_timeout`.
    pub fn with_poll_timeout(poll_timeout: Duration) -> (MockSerialPort, MockBridge) {
        let state = Arc::new(Mutex::new(BridgeState::default()));
        (
            MockSerialPort {
                state: state.clone(),
                poll_timeout,
            },
            MockBridge { state },
        )
    }

    /// Make bytes readable right away.
    pub fn push_bytes(&self, data: &[u8]) {
        lock(&self.state).stream.readable.extend(data.iter().copied());
    }

    /// Queue `reply`; it becomes readable when exactly `trigger` is written.
    ///
    /// Replies queued on the same trigger are released one per write, in order.
    pub fn reply_on(&self, trigger: &str, reply: &[u8]) {
        lock(&self.state)
            .stream
            .triggered
            .entry(trigger.as_bytes().to_vec())
            .or_default()
            .push_back(reply.to_vec());
    }

    /// Queue `reply` behind the next `++read\n`.
    pub fn reply_on_read(&self, reply: &[u8]) {
        self.reply_on(READ_COMMAND, reply);
    }

    /// Answer `++addr\n` with the last `++addr<N>` written, as a real bridge does.
    pub fn emulate_addressing(&self) {
        lock(&self.state).emulate_addressing = true;
    }

    /// Fail every following read and write with `BrokenPipe`.
    pub fn disconnect(&self) {
        lock(&self.state).stream.disconnected = true;
    }

    /// Every write with its timestamp, in order.
    pub fn writes(&self) -> Vec<WriteRecord> {
        lock(&self.state).stream.writes.clone()
    }

    /// Every write as text, in order.
    pub fn written_lines(&self) -> Vec<String> {
        self.writes().iter().map(WriteRecord::as_str).collect()
    }

    /// Bytes still waiting to be read.
    pub fn bytes_remaining(&self) -> usize {
        lock(&self.state).stream.readable.len()
    }

    /// True once the transport has dropped (closed) its port.
    pub fn is_port_dropped(&self) -> bool {
        lock(&self.state).port_dropped
    }
}

impl Read for MockSerialPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(n) = lock(&self.state).stream.take_byte(buf)? {
            return Ok(n);
        }
        std::thread::sleep(self.poll_timeout);
        Err(io::Error::new(io::ErrorKind::TimedOut, "Operation timed out"))
    }
}

impl Write for MockSerialPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = lock(&self.state);
        let n = state.stream.record_write(buf)?;

        if state.emulate_addressing {
            let line = String::from_utf8_lossy(buf);
            if let Some(rest) = line.strip_prefix("++addr") {
                let rest = rest.trim();
                if rest.is_empty() {
                    if let Some(current) = state.current_address.clone() {
                        state.stream.readable.extend(format!("{}\r\n", current).bytes());
                    }
                } else {
                    state.current_address = Some(rest.to_string());
                }
            }
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MockSerialPort {
    fn drop(&mut self) {
        lock(&self.state).port_dropped = true;
    }
}

// =============================================================================
// VISA resource manager
// =============================================================================

#[derive(Debug, Default)]
struct ResourceState {
    stream: ScriptedStream,
    opens: usize,
    live_sessions: usize,
}

#[derive(Debug, Default)]
struct VisaState {
    resources: HashMap<String, ResourceState>,
}

/// Resource manager handed to a [`VisaTransport`](super::VisaTransport) under test.
#[derive(Debug)]
pub struct MockResourceManager {
    state: Arc<Mutex<VisaState>>,
}

/// Test-side handle for the mock VISA resources.
#[derive(Debug, Clone)]
pub struct MockVisaHarness {
    state: Arc<Mutex<VisaState>>,
}

impl MockResourceManager {
    /// Create a manager with no resources and its harness.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (MockResourceManager, MockVisaHarness) {
        let state = Arc::new(Mutex::new(VisaState::default()));
        (
            MockResourceManager {
                state: state.clone(),
            },
            MockVisaHarness { state },
        )
    }
}

impl ResourceManager for MockResourceManager {
    fn open(&self, resource: &str) -> io::Result<Box<dyn VisaSession>> {
        let mut state = lock(&self.state);
        let entry = state.resources.get_mut(resource).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("VI_ERROR_RSRC_NFOUND: {}", resource),
            )
        })?;
        entry.opens += 1;
        entry.live_sessions += 1;
        Ok(Box::new(MockSession {
            state: self.state.clone(),
            resource: resource.to_string(),
        }))
    }
}

impl MockVisaHarness {
    /// Make `resource` openable.
    pub fn add_resource(&self, resource: &str) {
        lock(&self.state)
            .resources
            .entry(resource.to_string())
            .or_default();
    }

    /// Queue `reply` on `resource`, readable once `trigger` is written to it.
    pub fn respond_to(&self, resource: &str, trigger: &str, reply: &[u8]) {
        lock(&self.state)
            .resources
            .entry(resource.to_string())
            .or_default()
            .stream
            .triggered
            .entry(trigger.as_bytes().to_vec())
            .or_default()
            .push_back(reply.to_vec());
    }

    /// Make bytes readable on `resource` right away.
    pub fn push_bytes(&self, resource: &str, data: &[u8]) {
        lock(&self.state)
            .resources
            .entry(resource.to_string())
            .or_default()
            .stream
            .readable
            .extend(data.iter().copied());
    }

    /// Fail following reads and writes on `resource` with `BrokenPipe`.
    pub fn disconnect(&self, resource: &str) {
        if let Some(entry) = lock(&self.state).resources.get_mut(resource) {
            entry.stream.disconnected = true;
        }
    }

    /// Every write to `resource` as text, in order.
    pub fn written_lines(&self, resource: &str) -> Vec<String> {
        lock(&self.state)
            .resources
            .get(resource)
            .map(|r| r.stream.writes.iter().map(WriteRecord::as_str).collect())
            .unwrap_or_default()
    }

    /// How many sessions were ever opened on `resource`.
    pub fn open_count(&self, resource: &str) -> usize {
        lock(&self.state)
            .resources
            .get(resource)
            .map_or(0, |r| r.opens)
    }

    /// Sessions on `resource` not yet dropped.
    pub fn live_sessions(&self, resource: &str) -> usize {
        lock(&self.state)
            .resources
            .get(resource)
            .map_or(0, |r| r.live_sessions)
    }
}

/// A scripted session. Reading with nothing queued fails at once with
/// `TimedOut`, the way a VISA session reports `VI_ERROR_TMO`.
#[derive(Debug)]
struct MockSession {
    state: Arc<Mutex<VisaState>>,
    resource: String,
}

impl MockSession {
    fn with_stream<R>(
        &self,
        f: impl FnOnce(&mut ScriptedStream) -> io::Result<R>,
    ) -> io::Result<R> {
        let mut state = lock(&self.state);
        let entry = state
            .resources
            .get_mut(&self.resource)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "resource removed"))?;
        f(&mut entry.stream)
    }
}

impl Read for MockSession {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.with_stream(|stream| stream.take_byte(buf))?
            .ok_or_else(|| io::Error::new(io::ErrorKind::TimedOut, "VI_ERROR_TMO"))
    }
}

impl Write for MockSession {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_stream(|stream| stream.record_write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        if let Some(entry) = lock(&self.state).resources.get_mut(&self.resource) {
            entry.live_sessions = entry.live_sessions.saturating_sub(1);
        }
    }
}
