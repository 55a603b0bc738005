//! Instrument transports
//!
//! This module contains the two backends that carry addressed GPIB traffic:
//! - [`SerialGpibTransport`]: a Prologix-class USB-serial-to-GPIB bridge, driven
//!   byte by byte (`++addr`, `++read`, `++spoll`).
//! - [`VisaTransport`]: a VISA resource-manager session that owns its own
//!   buffering and timeouts.
//!
//! Both implement [`Transport`]. Drivers are generic over it, and
//! [`InstrumentTransport`] selects one backend at construction time.
//!
//! All operations block the calling thread. A transport does no internal
//! locking; callers sharing one across threads must serialize access.

use crate::address::Address;
use crate::error::GpibResult;
use std::time::Duration;

pub mod mock_adapter;
pub mod serial_adapter;
pub mod visa_adapter;

pub use serial_adapter::{DynSerial, SerialGpibTransport, SerialPortIO, SerialSettings};
pub use visa_adapter::{ResourceManager, VisaSession, VisaTransport};

/// Line terminator used by the bridge and the instruments in this crate.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Capability set shared by every instrument transport.
pub trait Transport: Send {
    /// Target subsequent writes and reads at `address`.
    fn set_address(&mut self, address: &Address) -> GpibResult<()>;

    /// The address the backend currently targets.
    fn address(&mut self) -> GpibResult<Address>;

    /// Send `message` verbatim. The caller supplies the line terminator.
    fn write(&mut self, message: &str) -> GpibResult<()>;

    /// Read one reply, up to and including `terminator`.
    ///
    /// What happens when nothing arrives depends on the backend. The serial
    /// bridge honours `timeout` and returns an empty string, which is not an
    /// error. A VISA session ignores `timeout`, uses its own, and reports it as
    /// a transport error with [`GpibError::is_timeout`] set.
    ///
    /// [`GpibError::is_timeout`]: crate::error::GpibError::is_timeout
    fn read(&mut self, timeout: Duration, terminator: u8) -> GpibResult<String>;

    /// Write `message`, wait `delay`, then read the reply.
    fn query(&mut self, message: &str, delay: Duration) -> GpibResult<String>;

    /// Status byte of the addressed device.
    fn read_status_byte(&mut self) -> GpibResult<u8>;

    /// Short name of the backend, for logs and errors.
    fn backend(&self) -> &'static str;

    /// Discard any stale buffered replies.
    ///
    /// Reads until the backend reports that nothing is left: an empty read, or a
    /// backend timeout. That one timeout is the expected end of the drain and is
    /// swallowed; every other failure propagates. Returns the discarded byte count.
    fn drain(&mut self) -> GpibResult<usize> {
        let mut discarded = 0usize;
        loop {
            match self.read(Duration::ZERO, LINE_TERMINATOR) {
                Ok(stale) if stale.is_empty() => break,
                Ok(stale) => {
                    tracing::warn!(
                        backend = self.backend(),
                        stale = %stale.escape_default(),
                        "discarding stale reply"
                    );
                    discarded += stale.len();
                }
                Err(e) if e.is_timeout() => break,
                Err(e) => return Err(e),
            }
        }
        Ok(discarded)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn set_address(&mut self, address: &Address) -> GpibResult<()> {
        (**self).set_address(address)
    }

    fn address(&mut self) -> GpibResult<Address> {
        (**self).address()
    }

    fn write(&mut self, message: &str) -> GpibResult<()> {
        (**self).write(message)
    }

    fn read(&mut self, timeout: Duration, terminator: u8) -> GpibResult<String> {
        (**self).read(timeout, terminator)
    }

    fn query(&mut self, message: &str, delay: Duration) -> GpibResult<String> {
        (**self).query(message, delay)
    }

    fn read_status_byte(&mut self) -> GpibResult<u8> {
        (**self).read_status_byte()
    }

    fn backend(&self) -> &'static str {
        (**self).backend()
    }

    fn drain(&mut self) -> GpibResult<usize> {
        (**self).drain()
    }
}

/// One live backend, chosen when the transport is built.
pub enum InstrumentTransport {
    /// Prologix bridge on a serial port.
    Serial(SerialGpibTransport<DynSerial>),
    /// VISA resource manager session.
    Visa(VisaTransport),
}

impl InstrumentTransport {
    fn inner(&mut self) -> &mut dyn Transport {
        match self {
            InstrumentTransport::Serial(t) => t,
            InstrumentTransport::Visa(t) => t,
        }
    }
}

impl From<SerialGpibTransport<DynSerial>> for InstrumentTransport {
    fn from(t: SerialGpibTransport<DynSerial>) -> Self {
        InstrumentTransport::Serial(t)
    }
}

impl From<VisaTransport> for InstrumentTransport {
    fn from(t: VisaTransport) -> Self {
        InstrumentTransport::Visa(t)
    }
}

impl Transport for InstrumentTransport {
    fn set_address(&mut self, address: &Address) -> GpibResult<()> {
        self.inner().set_address(address)
    }

    fn address(&mut self) -> GpibResult<Address> {
        self.inner().address()
    }

    fn write(&mut self, message: &str) -> GpibResult<()> {
        self.inner().write(message)
    }

    fn read(&mut self, timeout: Duration, terminator: u8) -> GpibResult<String> {
        self.inner().read(timeout, terminator)
    }

    fn query(&mut self, message: &str, delay: Duration) -> GpibResult<String> {
        self.inner().query(message, delay)
    }

    fn read_status_byte(&mut self) -> GpibResult<u8> {
        self.inner().read_status_byte()
    }

    fn backend(&self) -> &'static str {
        match self {
            InstrumentTransport::Serial(t) => t.backend(),
            InstrumentTransport::Visa(t) => t.backend(),
        }
    }

    fn drain(&mut self) -> GpibResult<usize> {
        self.inner().drain()
    }
}
