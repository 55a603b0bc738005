//! Tracing setup for the `rust_gpib` binary and for applications embedding the drivers.
//!
//! The library only emits `tracing` events:
//! - `trace` for every byte string written to or read from a transport
//! - `debug` for addressing and session changes
//! - `warn` for stale replies discarded by a drain
//!
//! Installing a subscriber is left to the application. [`init`] provides the
//! usual one: an `EnvFilter` (`RUST_LOG` wins over the configured level) feeding
//! a pretty, compact or JSON formatter on stderr.
//!
//! # Example
//! ```no_run
//! use rust_gpib::logging::{self, OutputFormat, TracingConfig};
//! use tracing::Level;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! logging::init(TracingConfig::new(Level::DEBUG).with_format(OutputFormat::Compact))?;
//! tracing::info!("bridge ready");
//! # Ok(())
//! # }
//! ```

use crate::config::GpibConfig;
use crate::error::{GpibError, GpibResult};
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Levels accepted by [`parse_log_level`].
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Multi-line, colored (interactive use)
    #[default]
    Pretty,
    /// One line per event, no colors
    Compact,
    /// One JSON object per event
    Json,
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Fallback level when `RUST_LOG` is unset.
    pub level: Level,
    /// Output format.
    pub format: OutputFormat,
    /// Emit span NEW/CLOSE events.
    pub with_span_events: bool,
    /// Include source file and line.
    pub with_file_and_line: bool,
    /// Include thread names.
    pub with_thread_names: bool,
    /// ANSI colors, Pretty format only.
    pub with_ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Pretty,
            with_span_events: false,
            with_file_and_line: false,
            with_thread_names: false,
            with_ansi: true,
        }
    }
}

impl TracingConfig {
    /// Defaults at `level`.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Level and format from a loaded [`GpibConfig`].
    pub fn from_config(config: &GpibConfig) -> GpibResult<Self> {
        Ok(Self::new(parse_log_level(&config.log_level)?).with_format(config.log_format))
    }

    /// Set the output format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Toggle span NEW/CLOSE events.
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.with_span_events = enabled;
        self
    }

    /// Toggle ANSI colors.
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }
}

/// Install the global subscriber.
///
/// Idempotent: if a subscriber is already installed this returns `Ok(())`,
/// so tests and embedding applications can call it freely.
pub fn init(config: TracingConfig) -> GpibResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_ascii_lowercase()));

    let span_events = if config.with_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_span_events(span_events)
        .with_file(config.with_file_and_line)
        .with_line_number(config.with_file_and_line)
        .with_thread_names(config.with_thread_names);

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        OutputFormat::Pretty => base
            .pretty()
            .with_ansi(config.with_ansi)
            .with_filter(env_filter)
            .boxed(),
        OutputFormat::Compact => base.compact().with_ansi(false).with_filter(env_filter).boxed(),
        OutputFormat::Json => base.json().with_ansi(false).with_filter(env_filter).boxed(),
    };

    match tracing_subscriber::registry().with(layer).try_init() {
        Ok(()) => Ok(()),
        Err(e) if e.to_string().contains("already been set") => Ok(()),
        Err(e) => Err(GpibError::Configuration(format!(
            "Failed to initialize tracing: {}",
            e
        ))),
    }
}

/// Initialize from the loaded configuration file.
pub fn init_from_config(config: &GpibConfig) -> GpibResult<()> {
    init(TracingConfig::from_config(config)?)
}

/// Parse a case-insensitive level name.
pub fn parse_log_level(level: &str) -> GpibResult<Level> {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(GpibError::Configuration(format!(
            "Invalid log level '{}'. Must be one of: {}",
            level,
            LOG_LEVELS.join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("trace").unwrap(), Level::TRACE);
        assert_eq!(parse_log_level("warn").unwrap(), Level::WARN);
        assert_eq!(parse_log_level("Debug").unwrap(), Level::DEBUG);
        assert!(matches!(
            parse_log_level("verbose"),
            Err(GpibError::Configuration(_))
        ));
    }

    #[test]
    fn test_tracing_config_builder() {
        let config = TracingConfig::new(Level::WARN)
            .with_format(OutputFormat::Json)
            .with_span_events(true)
            .with_ansi(false);

        assert_eq!(config.level, Level::WARN);
        assert_eq!(config.format, OutputFormat::Json);
        assert!(config.with_span_events);
        assert!(!config.with_ansi);
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = TracingConfig::new(Level::ERROR).with_format(OutputFormat::Compact);
        assert!(init(config.clone()).is_ok());
        assert!(init(config).is_ok());
    }
}
