//! VISA transport for GPIB/USB/Ethernet instruments
//!
//! A resource manager opens one session per instrument address. The session
//! owns buffering and timeouts, so `query` is a plain write followed by a read
//! of one line and the settle `delay` is not needed.
//!
//! Supports resource strings like:
//! - "GPIB0::1::INSTR" (GPIB interface)
//! - "USB0::0x1234::0x5678::SERIAL::INSTR" (USB)
//! - "TCPIP0::192.168.1.100::INSTR" (Ethernet/LXI)
//!
//! The native backend binds `visa-rs` and needs the `instrument_visa` feature.
//! Without it, resolving a resource manager fails with
//! [`GpibError::BackendUnavailable`]; an injected [`ResourceManager`] still works.

use super::{Transport, LINE_TERMINATOR};
use crate::address::Address;
use crate::error::{GpibError, GpibResult};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, trace};

/// An open instrument session.
pub trait VisaSession: Read + Write + Send {}

impl<T: Read + Write + Send> VisaSession for T {}

/// Opens instrument sessions by resource string.
pub trait ResourceManager: Send {
    /// Open a session on `resource`, e.g. `GPIB0::5::INSTR`.
    fn open(&self, resource: &str) -> io::Result<Box<dyn VisaSession>>;
}

/// Transport backed by a VISA resource manager.
pub struct VisaTransport {
    manager: Option<Box<dyn ResourceManager>>,
    session: Option<Box<dyn VisaSession>>,
    address: Option<Address>,
}

impl VisaTransport {
    /// Bind to the default VISA resource manager.
    pub fn new() -> GpibResult<Self> {
        let mut transport = Self {
            manager: None,
            session: None,
            address: None,
        };
        transport.configure("default")?;
        Ok(transport)
    }

    /// Use an already constructed resource manager.
    pub fn with_manager(manager: Box<dyn ResourceManager>) -> Self {
        Self {
            manager: Some(manager),
            session: None,
            address: None,
        }
    }

    /// Re-bind the resource manager.
    ///
    /// `""` and `"default"` select the system VISA library. The current
    /// manager is kept if resolution fails.
    pub fn configure(&mut self, identifier: &str) -> GpibResult<()> {
        self.manager = Some(resolve_manager(identifier)?);
        debug!(identifier, "VISA resource manager configured");
        Ok(())
    }

    /// True while an instrument session is open.
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    fn session(&mut self) -> GpibResult<&mut Box<dyn VisaSession>> {
        self.session.as_mut().ok_or(GpibError::NotAddressed)
    }
}

fn resolve_manager(identifier: &str) -> GpibResult<Box<dyn ResourceManager>> {
    match identifier.trim() {
        "" | "default" => open_default_manager(),
        other => Err(GpibError::BackendUnavailable(format!(
            "unknown resource manager '{}'; only the default VISA library is supported",
            other
        ))),
    }
}

#[cfg(feature = "instrument_visa")]
fn open_default_manager() -> GpibResult<Box<dyn ResourceManager>> {
    Ok(Box::new(native::NativeResourceManager::new()?))
}

#[cfg(not(feature = "instrument_visa"))]
fn open_default_manager() -> GpibResult<Box<dyn ResourceManager>> {
    Err(GpibError::BackendUnavailable(
        "VISA support not enabled. Rebuild with --features instrument_visa".to_string(),
    ))
}

impl Transport for VisaTransport {
    fn set_address(&mut self, address: &Address) -> GpibResult<()> {
        let manager = self.manager.as_ref().ok_or_else(|| {
            GpibError::BackendUnavailable("no resource manager configured".to_string())
        })?;

        let resource = address.resource_string();
        let session = manager.open(&resource).map_err(|e| {
            GpibError::Address(format!("Failed to open VISA resource '{}': {}", resource, e))
        })?;

        // Dropping the previous session closes it.
        self.session = Some(session);
        self.address = Some(address.clone());
        debug!(resource = %resource, "VISA session opened");
        Ok(())
    }

    fn address(&mut self) -> GpibResult<Address> {
        self.address.clone().ok_or(GpibError::NotAddressed)
    }

    fn write(&mut self, message: &str) -> GpibResult<()> {
        let session = self.session()?;
        session.write_all(message.as_bytes())?;
        session.flush()?;
        trace!(data = %message.escape_default(), "VISA write");
        Ok(())
    }

    /// Reads up to `terminator`. `timeout` is unused: the session's own
    /// timeout applies and surfaces as an error with `is_timeout() == true`.
    fn read(&mut self, _timeout: Duration, terminator: u8) -> GpibResult<String> {
        let session = self.session()?;
        let mut reply = Vec::new();
        let mut buf = [0u8; 1];
        loop {
            match session.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    reply.push(buf[0]);
                    if buf[0] == terminator {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if !reply.is_empty()
                        && matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) =>
                {
                    debug!(received = reply.len(), "VISA timeout before terminator");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let reply = String::from_utf8_lossy(&reply).into_owned();
        trace!(data = %reply.escape_default(), "VISA read");
        Ok(reply)
    }

    fn query(&mut self, message: &str, delay: Duration) -> GpibResult<String> {
        trace!(?delay, "settle delay not needed on VISA, skipped");
        self.write(message)?;
        self.read(Duration::ZERO, LINE_TERMINATOR)
    }

    fn read_status_byte(&mut self) -> GpibResult<u8> {
        Err(GpibError::Unsupported {
            backend: "visa",
            operation: "read_status_byte",
        })
    }

    fn backend(&self) -> &'static str {
        "visa"
    }
}

#[cfg(feature = "instrument_visa")]
mod native {
    use super::{ResourceManager, VisaSession};
    use crate::error::{GpibError, GpibResult};
    use std::ffi::CString;
    use std::io::{self, Read, Write};
    use std::time::Duration;
    use visa_rs::enums::status::ErrorCode;
    use visa_rs::prelude::*;

    const OPEN_TIMEOUT: Duration = Duration::from_secs(2);

    pub(super) struct NativeResourceManager {
        rm: DefaultRM,
    }

    impl NativeResourceManager {
        pub(super) fn new() -> GpibResult<Self> {
            let rm = DefaultRM::new().map_err(|e| {
                GpibError::BackendUnavailable(format!(
                    "Failed to create VISA resource manager: {}",
                    e
                ))
            })?;
            Ok(Self { rm })
        }
    }

    impl ResourceManager for NativeResourceManager {
        fn open(&self, resource: &str) -> io::Result<Box<dyn VisaSession>> {
            let name = CString::new(resource)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            let instr = self
                .rm
                .open(&name.into(), AccessMode::NO_LOCK, OPEN_TIMEOUT)
                .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e))?;
            Ok(Box::new(NativeSession(instr)))
        }
    }

    struct NativeSession(Instrument);

    /// VISA reports its timeout as `VI_ERROR_TMO` inside an `Other` I/O error.
    fn classify(err: io::Error) -> io::Error {
        let timed_out = err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<visa_rs::Error>())
            .is_some_and(|e| e.0 == ErrorCode::ErrorTmo);
        if timed_out {
            io::Error::new(io::ErrorKind::TimedOut, err)
        } else {
            err
        }
    }

    impl Read for NativeSession {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf).map_err(classify)
        }
    }

    impl Write for NativeSession {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.write(buf).map_err(classify)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.0.flush().map_err(classify)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::mock_adapter::MockResourceManager;
    use super::*;

    const METER: &str = "GPIB0::4::INSTR";

    #[test]
    fn test_unaddressed_write_fails() {
        let (manager, _harness) = MockResourceManager::new();
        let mut transport = VisaTransport::with_manager(Box::new(manager));

        assert!(!transport.is_open());
        assert!(matches!(transport.write("D?\n"), Err(GpibError::NotAddressed)));
        assert!(matches!(transport.address(), Err(GpibError::NotAddressed)));
    }

    #[test]
    fn test_query_ignores_delay() {
        let (manager, harness) = MockResourceManager::new();
        harness.add_resource(METER);
        harness.respond_to(METER, "D?\n", b"+5.00E-9\n");

        let mut transport = VisaTransport::with_manager(Box::new(manager));
        transport.set_address(&Address::Gpib(4)).unwrap();

        let start = std::time::Instant::now();
        let reply = transport.query("D?\n", Duration::from_secs(5)).unwrap();

        assert_eq!(reply, "+5.00E-9\n");
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(harness.written_lines(METER), vec!["D?\n"]);
    }

    #[test]
    fn test_no_serial_poll() {
        let (manager, _harness) = MockResourceManager::new();
        let mut transport = VisaTransport::with_manager(Box::new(manager));
        assert!(matches!(
            transport.read_status_byte(),
            Err(GpibError::Unsupported { backend: "visa", .. })
        ));
    }

    #[test]
    fn test_read_timeout_is_reported() {
        let (manager, harness) = MockResourceManager::new();
        harness.add_resource(METER);
        let mut transport = VisaTransport::with_manager(Box::new(manager));
        transport.set_address(&Address::Gpib(4)).unwrap();

        let err = transport.read(Duration::ZERO, b'\n').unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_partial_reply_kept_on_timeout() {
        let (manager, harness) = MockResourceManager::new();
        harness.add_resource(METER);
        harness.push_bytes(METER, b"12");
        let mut transport = VisaTransport::with_manager(Box::new(manager));
        transport.set_address(&Address::Gpib(4)).unwrap();

        assert_eq!(transport.read(Duration::ZERO, b'\n').unwrap(), "12");
    }

    #[test]
    fn test_unknown_manager_identifier() {
        let (manager, harness) = MockResourceManager::new();
        harness.add_resource(METER);
        let mut transport = VisaTransport::with_manager(Box::new(manager));

        assert!(matches!(
            transport.configure("@sim"),
            Err(GpibError::BackendUnavailable(_))
        ));
        // The injected manager survives the failed re-bind.
        transport.set_address(&Address::Gpib(4)).unwrap();
        assert!(transport.is_open());
    }

    #[cfg(not(feature = "instrument_visa"))]
    #[test]
    fn test_default_manager_needs_feature() {
        match VisaTransport::new() {
            Err(GpibError::BackendUnavailable(msg)) => assert!(msg.contains("instrument_visa")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("VISA backend resolved without the feature"),
        }
    }
}
