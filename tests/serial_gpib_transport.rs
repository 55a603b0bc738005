//! Prologix bridge transport tests
//!
//! Drives `SerialGpibTransport` against the scripted mock bridge and checks
//! the wire protocol and the two-phase read contract.
//!
//! Run with: `cargo test --test serial_gpib_transport`

use rust_gpib::adapters::mock_adapter::{MockBridge, MockSerialPort};
use rust_gpib::adapters::serial_adapter::MAX_POLL_TIMEOUT;
use rust_gpib::adapters::{SerialGpibTransport, SerialSettings, Transport};
use rust_gpib::config::TransportSettings;
use rust_gpib::{Address, GpibError};
use std::time::{Duration, Instant};

/// Upper slack allowed on top of a requested wait.
const SLACK: Duration = Duration::from_millis(40);

fn bridge() -> (SerialGpibTransport<MockSerialPort>, MockBridge) {
    let (port, bridge) = MockBridge::new();
    (
        SerialGpibTransport::new(port, "/dev/ttyUSB0", SerialSettings::default()),
        bridge,
    )
}

// =============================================================================
// Two-phase read
// =============================================================================

#[test]
fn silent_device_returns_empty_after_timeout() {
    let (mut transport, bridge) = bridge();
    let timeout = Duration::from_millis(50);

    let start = Instant::now();
    let reply = transport.read(timeout, b'\n').unwrap();
    let elapsed = start.elapsed();

    assert_eq!(reply, "");
    assert!(elapsed >= timeout, "returned early after {:?}", elapsed);
    assert!(elapsed < timeout + SLACK, "overran deadline: {:?}", elapsed);
    assert_eq!(bridge.written_lines(), vec!["++read\n"]);
}

#[test]
fn first_byte_deadline_holds_at_the_longest_poll() {
    let (port, _bridge) = MockBridge::with_poll_timeout(MAX_POLL_TIMEOUT);
    let settings = SerialSettings {
        poll_timeout: MAX_POLL_TIMEOUT,
        ..SerialSettings::default()
    };
    let mut transport = SerialGpibTransport::new(port, "/dev/ttyUSB0", settings);
    let timeout = Duration::from_millis(50);

    let start = Instant::now();
    assert_eq!(transport.read(timeout, b'\n').unwrap(), "");
    let elapsed = start.elapsed();

    assert!(elapsed >= timeout);
    assert!(
        elapsed < timeout + MAX_POLL_TIMEOUT + SLACK,
        "overran deadline: {:?}",
        elapsed
    );
}

#[test]
fn poll_timeout_longer_than_the_cap_is_rejected() {
    let settings = TransportSettings::Serial {
        port: "/dev/ttyUSB0".to_string(),
        baud_rate: 9600,
        poll_timeout_ms: 500,
        read_timeout_ms: 50,
        address: None,
    };
    assert!(matches!(
        settings.validate(),
        Err(GpibError::Configuration(_))
    ));

    let at_cap = TransportSettings::Serial {
        port: "/dev/ttyUSB0".to_string(),
        baud_rate: 9600,
        poll_timeout_ms: MAX_POLL_TIMEOUT.as_millis() as u64,
        read_timeout_ms: 50,
        address: None,
    };
    assert!(at_cap.validate().is_ok());
}

#[test]
fn reply_is_returned_up_to_and_including_terminator() {
    let (mut transport, bridge) = bridge();
    bridge.reply_on_read(b"1.23\n9\n");

    let reply = transport.read(Duration::from_millis(100), b'\n').unwrap();

    assert_eq!(reply, "1.23\n");
    // The next reply stays in the stream.
    assert_eq!(bridge.bytes_remaining(), 2);
}

#[test]
fn idle_stream_yields_partial_reply() {
    let (mut transport, bridge) = bridge();
    bridge.reply_on_read(b"abc");

    let reply = transport.read(Duration::from_millis(100), b'\n').unwrap();
    assert_eq!(reply, "abc");
}

// =============================================================================
// Query ordering and timing
// =============================================================================

#[test]
fn query_writes_then_settles_then_triggers_read() {
    let (mut transport, bridge) = bridge();
    bridge.reply_on_read(b"+.11E-9\n");
    let delay = Duration::from_millis(60);

    let reply = transport.query("D?\n", delay).unwrap();
    assert_eq!(reply, "+.11E-9\n");

    let writes = bridge.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].as_str(), "D?\n");
    assert_eq!(writes[1].as_str(), "++read\n");
    assert!(
        writes[1].at.duration_since(writes[0].at) >= delay,
        "++read sent before settle delay elapsed"
    );
}

#[test]
fn explicit_timeout_overrides_settings() {
    let (mut transport, bridge) = bridge();
    let timeout = Duration::from_millis(30);

    let start = Instant::now();
    let reply = transport
        .query_with_timeout("*IDN?\n", Duration::ZERO, timeout)
        .unwrap();

    assert_eq!(reply, "");
    assert!(start.elapsed() >= timeout);
    assert_eq!(bridge.written_lines(), vec!["*IDN?\n", "++read\n"]);
}

// =============================================================================
// Serial poll
// =============================================================================

#[test]
fn status_byte_parses_decimal_reply() {
    let (mut transport, bridge) = bridge();
    bridge.reply_on_read(b"128\r\n");

    assert_eq!(transport.read_status_byte().unwrap(), 128);
    assert_eq!(bridge.written_lines(), vec!["++spoll\n", "++read\n"]);
}

#[test]
fn status_byte_rejects_non_numeric_reply() {
    let (mut transport, bridge) = bridge();
    bridge.reply_on_read(b"busy\n");

    match transport.read_status_byte() {
        Err(GpibError::Parse { raw, .. }) => assert_eq!(raw, "busy\n"),
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[test]
fn status_byte_after_timeout_is_a_parse_error() {
    let (mut transport, _bridge) = bridge();
    assert!(matches!(
        transport.read_status_byte(),
        Err(GpibError::Parse { .. })
    ));
}

// =============================================================================
// Addressing
// =============================================================================

#[test]
fn re_addressing_keeps_the_port_open() {
    let (mut transport, bridge) = bridge();

    transport.set_address(&Address::Gpib(5)).unwrap();
    transport.write("D?\n").unwrap();
    transport.set_address(&Address::Gpib(8)).unwrap();
    transport.write("*CLS\n").unwrap();

    assert!(!bridge.is_port_dropped());
    assert_eq!(
        bridge.written_lines(),
        vec!["++addr5\n", "D?\n", "++addr8\n", "*CLS\n"]
    );

    drop(transport);
    assert!(bridge.is_port_dropped());
}

#[test]
fn address_round_trips_through_bridge_echo() {
    let (mut transport, bridge) = bridge();
    bridge.emulate_addressing();

    for primary in [0u8, 5, 30] {
        transport.set_address(&Address::Gpib(primary)).unwrap();
        assert_eq!(transport.address().unwrap(), Address::Gpib(primary));
    }

    // A GPIB resource string is normalized to its primary address.
    transport
        .set_address(&"GPIB0::17::INSTR".parse().unwrap())
        .unwrap();
    assert_eq!(transport.address().unwrap(), Address::Gpib(17));
}

#[test]
fn addresses_the_bridge_cannot_reach_are_rejected() {
    let (mut transport, bridge) = bridge();

    let usb = Address::Resource("USB0::0x1AB1::0x04CE::DS1ZA1::INSTR".to_string());
    assert!(matches!(transport.set_address(&usb), Err(GpibError::Address(_))));
    assert!(matches!(
        transport.set_address(&Address::Gpib(31)),
        Err(GpibError::Address(_))
    ));
    assert!(bridge.written_lines().is_empty());
}

// =============================================================================
// Failures and drain
// =============================================================================

#[test]
fn disconnect_surfaces_as_transport_error() {
    let (mut transport, bridge) = bridge();
    bridge.disconnect();

    let err = transport.write("D?\n").unwrap_err();
    assert!(err.is_transport());
    assert!(!err.is_timeout());
}

#[test]
fn drain_discards_stale_replies() {
    let (mut transport, bridge) = bridge();
    bridge.push_bytes(b"+1.0E-9\n+2.0E-9\n");

    assert_eq!(transport.drain().unwrap(), 16);
    assert_eq!(bridge.bytes_remaining(), 0);

    bridge.reply_on("D?\n", b"+3.0E-9\n");
    assert_eq!(transport.query("D?\n", Duration::ZERO).unwrap(), "+3.0E-9\n");
}
