//! Newport 1830-C Optical Power Meter Driver
//!
//! Reference: Newport 1830-C User's Manual
//!
//! Protocol Overview:
//! - Format: Simple ASCII commands (NOT SCPI)
//! - Terminator: LF only (\n)
//! - Commands: Wxxxx (wavelength, four digits), O (auto-calibrate), C (clear status)
//! - Queries: D? (power), Q? (status byte)
//!
//! The driver is generic over [`Transport`], so the same code runs behind a
//! Prologix bridge or a VISA session.
//!
//! # Usage
//!
//! ```rust,ignore
//! use rust_gpib::adapters::{SerialGpibTransport, SerialSettings};
//! use rust_gpib::instrument::Newport1830C;
//!
//! let transport = SerialGpibTransport::bind("/dev/ttyUSB0", SerialSettings::default())?;
//! let mut meter = Newport1830C::new(transport);
//! meter.set_address(&5.into())?;
//! meter.set_wavelength(1064)?;
//! let watts = meter.measure_power()?;
//! ```

use crate::adapters::Transport;
use crate::address::Address;
use crate::error::{GpibError, GpibResult};
use bitflags::bitflags;
use std::time::Duration;
use tracing::{debug, instrument};

/// Settle time between a query and its reply read.
pub const DEFAULT_QUERY_DELAY: Duration = Duration::from_millis(60);

bitflags! {
    /// Status byte returned by `Q?`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PowerMeterStatus: u8 {
        /// Parameter out of range.
        const PARAM_ERROR = 1 << 0;
        /// Unrecognised command.
        const COMMAND_ERROR = 1 << 1;
        /// Detector saturated.
        const SATURATION = 1 << 2;
        /// Reading over range.
        const OVER_RANGE = 1 << 3;
        /// Reply waiting.
        const MESSAGE_AVAILABLE = 1 << 4;
        /// Measurement in progress.
        const BUSY = 1 << 5;
        /// Service request.
        const SERVICE_REQUEST = 1 << 6;
        /// Reading complete.
        const READ_DONE = 1 << 7;
    }
}

/// Driver for the Newport 1830-C optical power meter.
pub struct Newport1830C<T: Transport> {
    transport: T,
    query_delay: Duration,
    /// Last status read by `update_status`.
    status: PowerMeterStatus,
}

impl<T: Transport> Newport1830C<T> {
    /// Wrap `transport` with the default query delay and an empty status.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            query_delay: DEFAULT_QUERY_DELAY,
            status: PowerMeterStatus::empty(),
        }
    }

    /// Override the settle time used by this instance.
    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    /// Point the transport at the meter.
    pub fn set_address(&mut self, address: &Address) -> GpibResult<()> {
        self.transport.set_address(address)
    }

    /// Address the transport currently targets.
    pub fn address(&mut self) -> GpibResult<Address> {
        self.transport.address()
    }

    /// Set the detector calibration wavelength in nm.
    #[instrument(skip(self), err)]
    pub fn set_wavelength(&mut self, nm: u16) -> GpibResult<()> {
        let cmd = wavelength_command(nm)?;
        self.transport.write(&cmd)
    }

    /// Unparsed reply to `D?`.
    pub fn measure_power_raw(&mut self) -> GpibResult<String> {
        self.transport.query("D?\n", self.query_delay)
    }

    /// Optical power in the meter's current units.
    pub fn measure_power(&mut self) -> GpibResult<f64> {
        let raw = self.measure_power_raw()?;
        let power = parse_power(&raw)?;
        debug!(power, raw = %raw.trim(), "Newport 1830-C power");
        Ok(power)
    }

    /// Zero the meter on the current reading (`O`).
    pub fn auto_calibrate(&mut self) -> GpibResult<()> {
        self.transport.write("O\n")
    }

    /// Query `Q?` and store the result on this instance.
    pub fn update_status(&mut self) -> GpibResult<PowerMeterStatus> {
        let raw = self.transport.query("Q?\n", self.query_delay)?;
        let value: u8 = raw
            .trim()
            .parse()
            .map_err(|_| GpibError::parse("power meter status", raw.clone()))?;
        self.status = PowerMeterStatus::from_bits_retain(value);
        Ok(self.status)
    }

    /// Status from the most recent `update_status` call.
    pub fn status(&self) -> PowerMeterStatus {
        self.status
    }

    /// Clear the status byte on the meter (`C`).
    pub fn clear_status(&mut self) -> GpibResult<()> {
        self.transport.write("C\n")
    }

    /// Discard stale replies left in the transport. Returns the byte count dropped.
    pub fn clear_comms(&mut self) -> GpibResult<usize> {
        self.transport.drain()
    }

    /// Direct access to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Release the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }
}

/// Build the wavelength command for `nm` (1..=9999, sent as four digits).
pub fn wavelength_command(nm: u16) -> GpibResult<String> {
    if !(1..=9999).contains(&nm) {
        return Err(GpibError::invalid("wavelength", nm, "must be 1..=9999 nm"));
    }
    Ok(format!("W{:04}\n", nm))
}

/// Parse a `D?` reply such as `"+.11E-9"` or `"5.00E-3"`.
pub fn parse_power(raw: &str) -> GpibResult<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| GpibError::parse("optical power", raw))
}
