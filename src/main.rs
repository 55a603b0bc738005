//! CLI entry point for rust_gpib
//!
//! Sends one command to one instrument and prints the reply.
//!
//! # Usage
//!
//! ```bash
//! rust_gpib --port /dev/ttyUSB0 --address 5 query "*IDN?"
//! rust_gpib --config gpib.toml power --wavelength 1064
//! rust_gpib --visa --address GPIB0::8::INSTR write "AGAN"
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rust_gpib::adapters::{InstrumentTransport, Transport, LINE_TERMINATOR};
use rust_gpib::instrument::Newport1830C;
use rust_gpib::logging::{self, OutputFormat};
use rust_gpib::{Address, GpibConfig, TransportSettings};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

#[derive(Parser)]
#[command(name = "rust_gpib", version)]
#[command(about = "Talk to GPIB instruments through a Prologix bridge or VISA", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serial port of a Prologix bridge (overrides the configured transport)
    #[arg(long, global = true, conflicts_with = "visa")]
    port: Option<String>,

    /// Use the default VISA resource manager
    #[arg(long, global = true)]
    visa: bool,

    /// Primary address (e.g. 5) or VISA resource string
    #[arg(long, short, global = true)]
    address: Option<String>,

    #[arg(long, global = true)]
    log_level: Option<String>,

    #[arg(long, global = true, value_enum)]
    log_format: Option<OutputFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a command without reading a reply
    Write { command: String },

    /// Send a command and print the reply
    Query {
        command: String,

        /// Settle time before the reply is read
        #[arg(long, default_value_t = 60)]
        delay_ms: u64,

        /// First-byte timeout (serial bridge only)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Read one pending reply
    Read {
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,
    },

    /// Serial-poll the addressed device
    Spoll,

    /// Print the address the transport targets
    Addr,

    /// Read optical power from a Newport 1830-C
    Power {
        /// Set the calibration wavelength (nm) first
        #[arg(long)]
        wavelength: Option<u16>,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    logging::init_from_config(&config)?;
    debug!(backend = config.transport.backend_name(), "configuration resolved");

    if let Commands::Config = cli.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let transport = config
        .transport
        .open()
        .context("Failed to open instrument transport")?;
    run(cli.command, transport)
}

fn resolve_config(cli: &Cli) -> Result<GpibConfig> {
    let mut config = match (&cli.config, &cli.port, cli.visa) {
        (Some(path), _, _) => GpibConfig::load_from(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        (None, Some(port), _) => {
            GpibConfig::from_env_over(GpibConfig::for_transport(TransportSettings::serial(port)))?
        }
        (None, None, true) => {
            GpibConfig::from_env_over(GpibConfig::for_transport(TransportSettings::visa()))?
        }
        (None, None, false) => bail!("No transport given: pass --config, --port or --visa"),
    };

    // Flags win over the file.
    if cli.config.is_some() {
        let previous = config.transport.initial_address()?;
        let replacement = match (&cli.port, cli.visa) {
            (Some(port), _) => Some(TransportSettings::serial(port)),
            (None, true) => Some(TransportSettings::visa()),
            (None, false) => None,
        };
        if let Some(mut transport) = replacement {
            if let Some(address) = previous {
                transport = transport.with_address(&address);
            }
            config.transport = transport;
        }
    }
    if let Some(address) = &cli.address {
        let address: Address = address.parse()?;
        config.transport = config.transport.with_address(&address);
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }

    config.validate()?;
    Ok(config)
}

fn with_terminator(command: &str) -> String {
    if command.ends_with('\n') {
        command.to_string()
    } else {
        format!("{}\n", command)
    }
}

fn run(command: Commands, mut transport: InstrumentTransport) -> Result<()> {
    match command {
        Commands::Write { command } => transport.write(&with_terminator(&command))?,
        Commands::Query {
            command,
            delay_ms,
            timeout_ms,
        } => {
            let message = with_terminator(&command);
            let delay = Duration::from_millis(delay_ms);
            let reply = match (&mut transport, timeout_ms) {
                (InstrumentTransport::Serial(serial), Some(ms)) => {
                    serial.query_with_timeout(&message, delay, Duration::from_millis(ms))?
                }
                (other, _) => other.query(&message, delay)?,
            };
            println!("{}", reply.trim_end());
        }
        Commands::Read { timeout_ms } => {
            let reply = transport.read(Duration::from_millis(timeout_ms), LINE_TERMINATOR)?;
            println!("{}", reply.trim_end());
        }
        Commands::Spoll => println!("{}", transport.read_status_byte()?),
        Commands::Addr => println!("{}", transport.address()?),
        Commands::Power { wavelength } => {
            let mut meter = Newport1830C::new(transport);
            if let Some(nm) = wavelength {
                meter.set_wavelength(nm)?;
            }
            println!("{:e}", meter.measure_power()?);
        }
        Commands::Config => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminator_appended_once() {
        assert_eq!(with_terminator("*IDN?"), "*IDN?\n");
        assert_eq!(with_terminator("D?\n"), "D?\n");
    }

    #[test]
    fn test_cli_parses_query() {
        let cli = Cli::try_parse_from([
            "rust_gpib", "--port", "/dev/ttyUSB0", "-a", "5", "query", "*IDN?", "--timeout-ms", "200",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Query { delay_ms: 60, timeout_ms: Some(200), .. }
        ));

        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.transport.initial_address().unwrap(), Some(Address::Gpib(5)));
    }

    #[test]
    fn test_port_conflicts_with_visa() {
        assert!(Cli::try_parse_from(["rust_gpib", "--port", "COM3", "--visa", "spoll"]).is_err());
    }
}
