//! VISA transport tests against the mock resource manager
//!
//! Run with: `cargo test --test visa_transport`

use rust_gpib::adapters::mock_adapter::{MockResourceManager, MockVisaHarness};
use rust_gpib::adapters::{InstrumentTransport, Transport, VisaTransport};
use rust_gpib::instrument::Newport1830C;
use rust_gpib::{Address, GpibError};
use std::time::Duration;

const METER: &str = "GPIB0::5::INSTR";
const LOCKIN: &str = "GPIB0::8::INSTR";

fn visa() -> (VisaTransport, MockVisaHarness) {
    let (manager, harness) = MockResourceManager::new();
    harness.add_resource(METER);
    harness.add_resource(LOCKIN);
    (VisaTransport::with_manager(Box::new(manager)), harness)
}

#[test]
fn address_round_trips_exactly() {
    let (mut transport, _harness) = visa();

    let resource = Address::Resource(METER.to_string());
    transport.set_address(&resource).unwrap();
    assert_eq!(transport.address().unwrap(), resource);

    // A bare primary address opens board 0 and is reported as given.
    transport.set_address(&Address::Gpib(8)).unwrap();
    assert_eq!(transport.address().unwrap(), Address::Gpib(8));
}

#[test]
fn write_before_addressing_is_a_transport_error() {
    let (mut transport, _harness) = visa();
    let err = transport.write("*IDN?\n").unwrap_err();
    assert!(matches!(err, GpibError::NotAddressed));
    assert!(err.is_transport());
}

#[test]
fn re_addressing_closes_the_previous_session() {
    let (mut transport, harness) = visa();

    transport.set_address(&Address::Gpib(5)).unwrap();
    assert_eq!(harness.live_sessions(METER), 1);

    transport.set_address(&Address::Gpib(8)).unwrap();
    assert_eq!(harness.live_sessions(METER), 0);
    assert_eq!(harness.live_sessions(LOCKIN), 1);

    transport.write("AGAN\n").unwrap();
    assert_eq!(harness.written_lines(LOCKIN), vec!["AGAN\n"]);
    assert!(harness.written_lines(METER).is_empty());
}

#[test]
fn failed_addressing_keeps_previous_session() {
    let (mut transport, harness) = visa();
    transport.set_address(&Address::Gpib(5)).unwrap();

    let err = transport
        .set_address(&Address::Resource("GPIB0::22::INSTR".to_string()))
        .unwrap_err();
    match err {
        GpibError::Address(msg) => assert!(msg.contains("GPIB0::22::INSTR")),
        other => panic!("expected address error, got {}", other),
    }

    assert_eq!(transport.address().unwrap(), Address::Gpib(5));
    assert_eq!(harness.live_sessions(METER), 1);
    transport.write("C\n").unwrap();
    assert_eq!(harness.written_lines(METER), vec!["C\n"]);
}

#[test]
fn drain_swallows_the_terminal_timeout() {
    let (mut transport, harness) = visa();
    transport.set_address(&Address::Gpib(5)).unwrap();
    harness.push_bytes(METER, b"+1.0E-9\n+2.0E-9\n");

    assert_eq!(transport.drain().unwrap(), 16);

    harness.respond_to(METER, "D?\n", b"+5.0E-9\n");
    assert_eq!(transport.query("D?\n", Duration::ZERO).unwrap(), "+5.0E-9\n");
}

#[test]
fn drain_propagates_other_failures() {
    let (mut transport, harness) = visa();
    transport.set_address(&Address::Gpib(5)).unwrap();
    harness.disconnect(METER);

    let err = transport.drain().unwrap_err();
    assert!(err.is_transport());
    assert!(!err.is_timeout());
}

#[test]
fn serial_poll_is_not_offered() {
    let (mut transport, _harness) = visa();
    transport.set_address(&Address::Gpib(5)).unwrap();
    assert!(matches!(
        transport.read_status_byte(),
        Err(GpibError::Unsupported {
            backend: "visa",
            operation: "read_status_byte"
        })
    ));
}

#[test]
fn power_meter_over_visa() {
    let (transport, harness) = visa();
    harness.push_bytes(METER, b"stale\n");
    harness.respond_to(METER, "D?\n", b"+7.50E-6\n");
    harness.respond_to(METER, "Q?\n", b"144\n");

    let mut meter = Newport1830C::new(InstrumentTransport::from(transport));
    meter.set_address(&METER.parse().unwrap()).unwrap();

    assert_eq!(meter.clear_comms().unwrap(), 6);
    meter.set_wavelength(633).unwrap();
    assert_eq!(meter.measure_power().unwrap(), 7.5e-6);

    let status = meter.update_status().unwrap();
    assert!(status.contains(rust_gpib::instrument::PowerMeterStatus::MESSAGE_AVAILABLE));
    assert!(status.contains(rust_gpib::instrument::PowerMeterStatus::READ_DONE));

    assert_eq!(harness.written_lines(METER), vec!["W0633\n", "D?\n", "Q?\n"]);
}
