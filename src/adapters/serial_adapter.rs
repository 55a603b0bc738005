//! Prologix-style serial-to-GPIB bridge transport.
//!
//! The bridge sits on a serial port and forwards lines to whichever GPIB
//! device it is currently addressed at. Lines starting with `++` are consumed
//! by the bridge itself:
//!
//! | Command      | Effect                                                  |
//! |--------------|---------------------------------------------------------|
//! | `++addr<N>`  | target GPIB primary address `N`                          |
//! | `++addr`     | report the current target address                        |
//! | `++read`     | forward the addressed device's pending output            |
//! | `++spoll`    | serial-poll the addressed device, reply is the status byte |
//!
//! The bridge returns nothing until it is told `++read`, so every [`read`]
//! sends that trigger first. Reads then run in two phases:
//!
//! 1. **First byte**: poll until one byte arrives or the caller's timeout
//!    elapses. Nothing arriving is a normal result: an empty string.
//! 2. **Accumulation**: keep reading byte by byte, without a deadline, until
//!    the terminator (kept in the reply) or until a poll yields no byte (the
//!    stream went idle, partial reply returned).
//!
//! Phase 2 has no wall-clock bound. A device that streams forever without a
//! terminator keeps the read going.
//!
//! [`read`]: Transport::read

use super::{Transport, LINE_TERMINATOR};
use crate::address::{Address, MAX_PRIMARY_ADDRESS};
use crate::error::{GpibError, GpibResult};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Bridge command: begin forwarding the addressed device's output.
pub const READ_COMMAND: &str = "++read\n";
/// Bridge command: serial poll of the addressed device.
pub const SERIAL_POLL_COMMAND: &str = "++spoll\n";
/// Bridge command: report the configured address.
pub const ADDRESS_QUERY_COMMAND: &str = "++addr\n";

/// Longest per-poll wait the bridge accepts.
///
/// The first-byte deadline is checked between polls, so a read may overrun
/// its timeout by up to one poll.
pub const MAX_POLL_TIMEOUT: Duration = Duration::from_millis(10);

const ADDRESS_QUERY_DELAY: Duration = Duration::from_millis(5);
const ADDRESS_QUERY_TIMEOUT: Duration = Duration::from_millis(30);

/// Trait alias for the blocking byte stream under the bridge.
///
/// Any `Read + Write + Send` type works:
/// - `Box<dyn serialport::SerialPort>` (real hardware)
/// - [`MockSerialPort`](super::mock_adapter::MockSerialPort) (testing)
///
/// A read that times out (`TimedOut`/`WouldBlock`) or returns zero bytes is
/// treated as "no byte available".
pub trait SerialPortIO: Read + Write + Send {}

impl<T: Read + Write + Send> SerialPortIO for T {}

/// Type-erased boxed serial stream.
pub type DynSerial = Box<dyn SerialPortIO>;

/// Serial line settings for the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    /// Baud rate. USB bridges usually ignore it.
    pub baud_rate: u32,
    /// Per-poll wait of the port. Keeps the first-byte loop responsive.
    /// Capped at [`MAX_POLL_TIMEOUT`] when the port is opened.
    pub poll_timeout: Duration,
    /// First-byte timeout used by `query` and `read_status_byte`.
    pub read_timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            poll_timeout: Duration::from_millis(1),
            read_timeout: Duration::ZERO,
        }
    }
}

/// Transport for a Prologix-class serial-to-GPIB bridge.
///
/// Owns the serial stream for its whole life. Re-addressing only sends
/// `++addr<N>`; the stream is never reopened.
pub struct SerialGpibTransport<S> {
    port: S,
    port_name: String,
    settings: SerialSettings,
}

impl SerialGpibTransport<DynSerial> {
    /// Open `port_name` and bind the bridge transport to it.
    ///
    /// # Errors
    /// Returns [`GpibError::PortUnavailable`] if the device node cannot be opened.
    #[cfg(feature = "instrument_serial")]
    pub fn bind(port_name: &str, mut settings: SerialSettings) -> GpibResult<Self> {
        if settings.poll_timeout > MAX_POLL_TIMEOUT {
            warn!(
                port = port_name,
                requested = ?settings.poll_timeout,
                "poll timeout capped at {:?}",
                MAX_POLL_TIMEOUT
            );
            settings.poll_timeout = MAX_POLL_TIMEOUT;
        }
        let port = serialport::new(port_name, settings.baud_rate)
            .timeout(settings.poll_timeout)
            .open()
            .map_err(|e| GpibError::PortUnavailable {
                port: port_name.to_string(),
                source: e.into(),
            })?;

        debug!(
            port = port_name,
            baud_rate = settings.baud_rate,
            "Prologix bridge port opened"
        );
        Ok(Self::new(Box::new(port), port_name, settings))
    }

    /// Always fails: serial support is compiled out.
    #[cfg(not(feature = "instrument_serial"))]
    pub fn bind(port_name: &str, _settings: SerialSettings) -> GpibResult<Self> {
        Err(GpibError::PortUnavailable {
            port: port_name.to_string(),
            source: io::Error::new(
                io::ErrorKind::Unsupported,
                "Serial support not enabled. Rebuild with --features instrument_serial",
            ),
        })
    }
}

impl<S: Read + Write> SerialGpibTransport<S> {
    /// Wrap an already open stream.
    pub fn new(port: S, port_name: impl Into<String>, settings: SerialSettings) -> Self {
        Self {
            port,
            port_name: port_name.into(),
            settings,
        }
    }

    /// Identifier of the bound serial port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Timing and line settings in effect.
    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    /// Change the first-byte timeout used by `query` and `read_status_byte`.
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.settings.read_timeout = timeout;
    }

    /// Write `message`, sleep `delay`, then read with an explicit first-byte `timeout`.
    ///
    /// `delay` is the settle time the bridge or instrument needs before its
    /// output is ready.
    pub fn query_with_timeout(
        &mut self,
        message: &str,
        delay: Duration,
        timeout: Duration,
    ) -> GpibResult<String> {
        self.write_raw(message)?;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.read_reply(timeout, LINE_TERMINATOR)
    }

    /// Release the underlying stream.
    pub fn into_inner(self) -> S {
        self.port
    }

    fn write_raw(&mut self, message: &str) -> GpibResult<()> {
        trace!(port = %self.port_name, data = %message.escape_default(), "bridge write");
        self.port.write_all(message.as_bytes())?;
        self.port.flush()?;
        Ok(())
    }

    /// One poll of the stream. `None` when the port had nothing to give.
    fn read_byte(&mut self) -> GpibResult<Option<u8>> {
        let mut buf = [0u8; 1];
        loop {
            match self.port.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                    return Ok(None)
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn read_reply(&mut self, timeout: Duration, terminator: u8) -> GpibResult<String> {
        self.write_raw(READ_COMMAND)?;

        let start = Instant::now();
        let mut reply = Vec::new();
        loop {
            if let Some(byte) = self.read_byte()? {
                reply.push(byte);
                break;
            }
            if start.elapsed() > timeout {
                trace!(port = %self.port_name, ?timeout, "no reply before first-byte timeout");
                return Ok(String::new());
            }
        }

        while reply.last() != Some(&terminator) {
            match self.read_byte()? {
                Some(byte) => reply.push(byte),
                None => {
                    trace!(port = %self.port_name, "stream idle before terminator");
                    break;
                }
            }
        }

        let reply = String::from_utf8_lossy(&reply).into_owned();
        trace!(port = %self.port_name, data = %reply.escape_default(), "bridge read");
        Ok(reply)
    }
}

impl<S: Read + Write + Send> Transport for SerialGpibTransport<S> {
    fn set_address(&mut self, address: &Address) -> GpibResult<()> {
        let primary = address.gpib_primary().ok_or_else(|| {
            GpibError::Address(format!(
                "'{}' has no GPIB primary address usable by the serial bridge",
                address
            ))
        })?;
        if primary > MAX_PRIMARY_ADDRESS {
            return Err(GpibError::Address(format!(
                "GPIB primary address {} out of range (0-{})",
                primary, MAX_PRIMARY_ADDRESS
            )));
        }

        self.write_raw(&format!("++addr{}\n", primary))?;
        debug!(port = %self.port_name, primary, "bridge addressed");
        Ok(())
    }

    fn address(&mut self) -> GpibResult<Address> {
        let reply =
            self.query_with_timeout(ADDRESS_QUERY_COMMAND, ADDRESS_QUERY_DELAY, ADDRESS_QUERY_TIMEOUT)?;
        reply
            .trim()
            .parse::<u8>()
            .map(Address::Gpib)
            .map_err(|_| GpibError::parse("bridge address", reply))
    }

    fn write(&mut self, message: &str) -> GpibResult<()> {
        self.write_raw(message)
    }

    fn read(&mut self, timeout: Duration, terminator: u8) -> GpibResult<String> {
        self.read_reply(timeout, terminator)
    }

    fn query(&mut self, message: &str, delay: Duration) -> GpibResult<String> {
        let timeout = self.settings.read_timeout;
        self.query_with_timeout(message, delay, timeout)
    }

    fn read_status_byte(&mut self) -> GpibResult<u8> {
        self.write_raw(SERIAL_POLL_COMMAND)?;
        let reply = self.read_reply(self.settings.read_timeout, LINE_TERMINATOR)?;
        parse_status_byte(&reply)
    }

    fn backend(&self) -> &'static str {
        "prologix"
    }
}

/// Parse a decimal status byte reply (`"128\r\n"` -> `128`).
pub fn parse_status_byte(reply: &str) -> GpibResult<u8> {
    reply
        .trim()
        .parse::<u8>()
        .map_err(|_| GpibError::parse("status byte", reply))
}
