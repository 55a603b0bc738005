//! Configuration loading using Figment
//!
//! Configuration is merged from:
//! 1. a TOML file (base configuration)
//! 2. environment variables prefixed with `RUST_GPIB_`, nested keys split on `__`
//!    (`RUST_GPIB_TRANSPORT__PORT=/dev/ttyUSB1`)
//!
//! # Example
//! ```toml
//! log_level = "info"
//!
//! [transport]
//! backend = "serial"
//! port = "/dev/ttyUSB0"
//! baud_rate = 115200
//! address = 5
//! ```

use crate::adapters::{InstrumentTransport, SerialGpibTransport, SerialSettings, Transport, VisaTransport};
use crate::adapters::serial_adapter::MAX_POLL_TIMEOUT;
use crate::address::{Address, MAX_PRIMARY_ADDRESS};
use crate::error::{GpibError, GpibResult};
use crate::logging::{parse_log_level, OutputFormat};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "RUST_GPIB_";

/// Top-level configuration: logging plus one transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpibConfig {
    /// trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format.
    #[serde(default)]
    pub log_format: OutputFormat,
    /// Backend to open.
    pub transport: TransportSettings,
}

/// Which backend to bind, and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum TransportSettings {
    /// Prologix-style USB-serial bridge.
    Serial {
        /// Serial device node, e.g. `/dev/ttyUSB0`.
        port: String,
        /// Line speed.
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        /// Per-byte poll interval in ms, at most 10.
        #[serde(default = "default_poll_timeout_ms")]
        poll_timeout_ms: u64,
        /// First-byte timeout used by `query`, in ms.
        #[serde(default)]
        read_timeout_ms: u64,
        /// Address applied right after the port opens.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        address: Option<AddressSetting>,
    },
    /// VISA resource manager.
    Visa {
        /// `default` or empty for the system resource manager.
        #[serde(default = "default_resource_manager")]
        resource_manager: String,
        /// Resource opened right after the manager resolves.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        address: Option<AddressSetting>,
    },
}

/// Address as written in a config file: a bare primary address or a resource string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AddressSetting {
    /// Bare GPIB primary address.
    Primary(u8),
    /// Resource string or a primary address in text form.
    Text(String),
}

impl AddressSetting {
    /// Parse into an [`Address`].
    pub fn to_address(&self) -> GpibResult<Address> {
        match self {
            AddressSetting::Primary(n) => Ok(Address::Gpib(*n)),
            AddressSetting::Text(s) => s.parse(),
        }
    }
}

impl From<&Address> for AddressSetting {
    fn from(address: &Address) -> Self {
        match address {
            Address::Gpib(n) => AddressSetting::Primary(*n),
            Address::Resource(s) => AddressSetting::Text(s.clone()),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_baud_rate() -> u32 {
    SerialSettings::default().baud_rate
}

fn default_poll_timeout_ms() -> u64 {
    1
}

fn default_resource_manager() -> String {
    "default".to_string()
}

impl GpibConfig {
    /// Default logging around `transport`, before any file or environment is merged.
    pub fn for_transport(transport: TransportSettings) -> Self {
        Self {
            log_level: default_log_level(),
            log_format: OutputFormat::default(),
            transport,
        }
    }

    /// Load from `path`, then apply `RUST_GPIB_` environment overrides.
    pub fn load_from<P: AsRef<Path>>(path: P) -> GpibResult<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `RUST_GPIB_` environment overrides on top of `base`, without a file.
    pub fn from_env_over(base: Self) -> GpibResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(base))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Check the log level and the transport settings.
    pub fn validate(&self) -> GpibResult<()> {
        parse_log_level(&self.log_level)?;
        self.transport.validate()
    }

    /// The configuration as TOML text.
    pub fn to_toml(&self) -> GpibResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| GpibError::Configuration(format!("Failed to serialize config: {}", e)))
    }
}

impl TransportSettings {
    /// Serial bridge on `port` with default timing and no initial address.
    pub fn serial(port: impl Into<String>) -> Self {
        TransportSettings::Serial {
            port: port.into(),
            baud_rate: default_baud_rate(),
            poll_timeout_ms: default_poll_timeout_ms(),
            read_timeout_ms: 0,
            address: None,
        }
    }

    /// Default VISA resource manager, no initial address.
    pub fn visa() -> Self {
        TransportSettings::Visa {
            resource_manager: default_resource_manager(),
            address: None,
        }
    }

    /// Replace the initial address.
    pub fn with_address(mut self, target: &Address) -> Self {
        match &mut self {
            TransportSettings::Serial { address, .. } | TransportSettings::Visa { address, .. } => {
                *address = Some(target.into());
            }
        }
        self
    }

    /// Backend name as reported by [`Transport::backend`].
    pub fn backend_name(&self) -> &'static str {
        match self {
            TransportSettings::Serial { .. } => "prologix",
            TransportSettings::Visa { .. } => "visa",
        }
    }

    /// The configured initial address, if any.
    pub fn initial_address(&self) -> GpibResult<Option<Address>> {
        match self {
            TransportSettings::Serial { address, .. } | TransportSettings::Visa { address, .. } => {
                address.as_ref().map(AddressSetting::to_address).transpose()
            }
        }
    }

    /// Serial timing, or `None` for the VISA backend.
    pub fn serial_settings(&self) -> Option<SerialSettings> {
        match self {
            TransportSettings::Serial {
                baud_rate,
                poll_timeout_ms,
                read_timeout_ms,
                ..
            } => Some(SerialSettings {
                baud_rate: *baud_rate,
                poll_timeout: Duration::from_millis(*poll_timeout_ms),
                read_timeout: Duration::from_millis(*read_timeout_ms),
            }),
            TransportSettings::Visa { .. } => None,
        }
    }

    /// Reject settings the backend cannot honour.
    pub fn validate(&self) -> GpibResult<()> {
        if let TransportSettings::Serial {
            port,
            baud_rate,
            poll_timeout_ms,
            ..
        } = self
        {
            if port.trim().is_empty() {
                return Err(GpibError::Configuration("Serial port must not be empty".into()));
            }
            if *baud_rate == 0 {
                return Err(GpibError::Configuration("baud_rate must be greater than 0".into()));
            }
            let max_poll_ms = MAX_POLL_TIMEOUT.as_millis() as u64;
            if *poll_timeout_ms == 0 || *poll_timeout_ms > max_poll_ms {
                return Err(GpibError::Configuration(format!(
                    "poll_timeout_ms must be in 1..={}, got {}",
                    max_poll_ms, poll_timeout_ms
                )));
            }
        }

        if let Some(address) = self.initial_address()? {
            if matches!(self, TransportSettings::Serial { .. }) {
                match address.gpib_primary() {
                    Some(n) if n <= MAX_PRIMARY_ADDRESS => {}
                    _ => {
                        return Err(GpibError::Configuration(format!(
                            "Address '{}' has no GPIB primary address 0..={} for the serial bridge",
                            address, MAX_PRIMARY_ADDRESS
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    /// Bind the configured backend and apply the initial address.
    pub fn open(&self) -> GpibResult<InstrumentTransport> {
        let mut transport: InstrumentTransport = match self {
            TransportSettings::Serial { port, .. } => {
                let settings = self.serial_settings().unwrap_or_default();
                SerialGpibTransport::bind(port, settings)?.into()
            }
            TransportSettings::Visa {
                resource_manager, ..
            } => {
                let mut visa = VisaTransport::new()?;
                if resource_manager != "default" {
                    visa.configure(resource_manager)?;
                }
                visa.into()
            }
        };

        if let Some(address) = self.initial_address()? {
            transport.set_address(&address)?;
        }
        info!(backend = self.backend_name(), "transport opened");
        Ok(transport)
    }
}
