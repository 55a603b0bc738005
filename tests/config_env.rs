//! Configuration loading with environment overrides
//!
//! These tests mutate process environment variables, so they run serially.

use rust_gpib::adapters::Transport;
use rust_gpib::config::{AddressSetting, GpibConfig, TransportSettings};
use rust_gpib::{Address, GpibError};
use serial_test::serial;
use std::io::Write;
use std::time::Duration;

const SERIAL_CONFIG: &str = r#"
log_level = "info"

[transport]
backend = "serial"
port = "/dev/ttyUSB0"
address = 5
"#;

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn clear_env() {
    for key in [
        "RUST_GPIB_LOG_LEVEL",
        "RUST_GPIB_TRANSPORT__PORT",
        "RUST_GPIB_TRANSPORT__ADDRESS",
        "RUST_GPIB_TRANSPORT__READ_TIMEOUT_MS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn env_overrides_file_values() {
    clear_env();
    std::env::set_var("RUST_GPIB_LOG_LEVEL", "debug");
    std::env::set_var("RUST_GPIB_TRANSPORT__PORT", "/dev/ttyACM3");
    std::env::set_var("RUST_GPIB_TRANSPORT__READ_TIMEOUT_MS", "250");

    let file = config_file(SERIAL_CONFIG);
    let config = GpibConfig::load_from(file.path());
    clear_env();
    let config = config.unwrap();

    assert_eq!(config.log_level, "debug");
    match &config.transport {
        TransportSettings::Serial { port, address, .. } => {
            assert_eq!(port, "/dev/ttyACM3");
            assert_eq!(address, &Some(AddressSetting::Primary(5)));
        }
        other => panic!("expected serial transport, got {:?}", other),
    }
    assert_eq!(
        config.transport.serial_settings().unwrap().read_timeout,
        Duration::from_millis(250)
    );
}

#[test]
#[serial]
fn env_overrides_flag_defaults() {
    clear_env();
    std::env::set_var("RUST_GPIB_TRANSPORT__ADDRESS", "12");

    let config = GpibConfig::from_env_over(GpibConfig::for_transport(TransportSettings::serial(
        "/dev/ttyUSB0",
    )));
    clear_env();

    assert_eq!(
        config.unwrap().transport.initial_address().unwrap(),
        Some(Address::Gpib(12))
    );
}

#[test]
#[serial]
fn invalid_env_level_fails_validation() {
    clear_env();
    std::env::set_var("RUST_GPIB_LOG_LEVEL", "chatty");

    let file = config_file(SERIAL_CONFIG);
    let result = GpibConfig::load_from(file.path());
    clear_env();

    assert!(matches!(result, Err(GpibError::Configuration(_))));
}

#[test]
#[serial]
fn opening_a_missing_port_reports_port_unavailable() {
    clear_env();
    let settings = TransportSettings::serial("/dev/rust-gpib-does-not-exist");

    match settings.open() {
        Err(GpibError::PortUnavailable { port, .. }) => {
            assert_eq!(port, "/dev/rust-gpib-does-not-exist")
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(transport) => panic!("opened a missing port: {}", transport.backend()),
    }
}
