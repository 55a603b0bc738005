//! Custom error types for the GPIB transports and instrument drivers.
//!
//! This module defines the primary error type, `GpibError`. Using the `thiserror`
//! crate, it provides one consistent taxonomy for everything that can go wrong
//! between opening a byte stream and parsing an instrument reply.
//!
//! ## Error Hierarchy
//!
//! - **`PortUnavailable`** / **`BackendUnavailable`**: raised when binding a serial port or
//!   resolving a VISA resource manager. Fatal to that transport instance; re-bind with a
//!   corrected identifier.
//! - **`Address`**: addressing failed (VISA resource cannot be opened, or the address token
//!   cannot be used by the backend). The transport keeps its previous addressed state.
//! - **`NotAddressed`** / **`Transport`**: I/O could not be performed or failed mid-operation.
//!   Never retried automatically.
//! - **`Parse`**: a reply could not be converted to the expected type. The raw reply travels
//!   with the error so no transport-level data is lost.
//! - **`InvalidParameter`**: a driver refused to build a command from an out-of-range value.
//!   Nothing was written to the instrument.
//!
//! An empty reply from the serial bridge after a first-byte timeout is **not** an error; it is
//! returned as an empty string and only becomes a `Parse` error if a driver needed a value.

use std::io;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type GpibResult<T> = std::result::Result<T, GpibError>;

/// Everything that can fail between a byte stream and a parsed reply.
#[derive(Error, Debug)]
pub enum GpibError {
    /// The serial device could not be opened.
    #[error("Serial port '{port}' unavailable: {source}")]
    PortUnavailable {
        /// Device node that failed.
        port: String,
        /// Underlying open error.
        #[source]
        source: io::Error,
    },

    /// No VISA resource manager could be resolved.
    #[error("VISA backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Addressing failed; the previous address is still in effect.
    #[error("Address error: {0}")]
    Address(String),

    /// I/O attempted before any address was set.
    #[error("No instrument address set")]
    NotAddressed,

    /// Read or write failed on the stream or session.
    #[error("Transport I/O error: {0}")]
    Transport(#[from] io::Error),

    /// A reply did not convert to the expected type.
    #[error("Failed to parse {what} from reply {raw:?}")]
    Parse {
        /// Value that was expected.
        what: &'static str,
        /// Reply exactly as received.
        raw: String,
    },

    /// A command argument was rejected before reaching the bus.
    #[error("Invalid {name} {value}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Rejected value.
        value: String,
        /// Accepted range or rule.
        reason: String,
    },

    /// The backend does not offer this operation.
    #[error("Operation '{operation}' is not supported by the {backend} backend")]
    Unsupported {
        /// Backend name.
        backend: &'static str,
        /// Operation requested.
        operation: &'static str,
    },

    /// Configuration could not be extracted.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration extracted but failed validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl GpibError {
    /// Build a parse error that keeps the untouched reply.
    pub fn parse(what: &'static str, raw: impl Into<String>) -> Self {
        Self::Parse {
            what,
            raw: raw.into(),
        }
    }

    pub(crate) fn invalid(
        name: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// True when the error is a backend read timeout rather than a hard failure.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Transport(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
        )
    }

    /// True for the failures of the `TransportError` class (no session, or I/O failed).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::NotAddressed)
    }
}

impl From<figment::Error> for GpibError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GpibError::parse("status byte", "abc");
        assert_eq!(
            err.to_string(),
            "Failed to parse status byte from reply \"abc\""
        );
    }

    #[test]
    fn test_timeout_classification() {
        let timeout = GpibError::from(io::Error::new(io::ErrorKind::TimedOut, "VI_ERROR_TMO"));
        assert!(timeout.is_timeout());
        assert!(timeout.is_transport());

        let broken = GpibError::from(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"));
        assert!(!broken.is_timeout());
        assert!(broken.is_transport());

        assert!(!GpibError::NotAddressed.is_timeout());
        assert!(GpibError::NotAddressed.is_transport());
    }

    #[test]
    fn test_invalid_parameter_display() {
        let err = GpibError::invalid("wavelength", 12345, "must be 1..=9999 nm");
        assert_eq!(
            err.to_string(),
            "Invalid wavelength 12345: must be 1..=9999 nm"
        );
    }
}
