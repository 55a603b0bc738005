//! # rust_gpib
//!
//! Blocking transports for talking to GPIB instruments, and drivers built on them.
//!
//! ## Crate Structure
//!
//! - **`adapters`**: the [`Transport`] capability set and its two backends:
//!   [`SerialGpibTransport`] for Prologix-class USB-serial bridges and
//!   [`VisaTransport`] for VISA resource managers. `adapters::mock_adapter`
//!   holds the in-memory bridge and resource manager used by the tests.
//! - **`address`**: the [`Address`] token (resource string or bare primary address).
//! - **`instrument`**: drivers for the Newport 1830-C power meter and the SR830 lock-in.
//! - **`config`**: TOML + environment configuration via `figment`.
//! - **`logging`**: `tracing-subscriber` setup for binaries.
//! - **`error`**: the [`GpibError`] taxonomy shared by everything above.
//!
//! ## Example
//!
//! ```
//! use rust_gpib::adapters::mock_adapter::MockBridge;
//! use rust_gpib::adapters::{SerialGpibTransport, SerialSettings};
//! use rust_gpib::instrument::Newport1830C;
//! use std::time::Duration;
//!
//! let (port, bridge) = MockBridge::new();
//! bridge.reply_on("D?\n", b"+1.25E-6\n");
//!
//! let transport = SerialGpibTransport::new(port, "mock", SerialSettings::default());
//! let mut meter = Newport1830C::new(transport).with_query_delay(Duration::ZERO);
//! meter.set_address(&5.into()).unwrap();
//!
//! assert_eq!(meter.measure_power().unwrap(), 1.25e-6);
//! assert_eq!(bridge.written_lines(), vec!["++addr5\n", "D?\n", "++read\n"]);
//! ```

pub mod adapters;
pub mod address;
pub mod config;
pub mod error;
pub mod instrument;
pub mod logging;

pub use adapters::{InstrumentTransport, SerialGpibTransport, SerialSettings, Transport, VisaTransport};
pub use address::Address;
pub use config::{GpibConfig, TransportSettings};
pub use error::{GpibError, GpibResult};
