//! Tests requiring actual serial hardware.
//!
//! These tests are skipped if no hardware is available.
//!
//! # Running Hardware Tests
//!
//! ```bash
//! # Set environment variables
//! export TEST_PORT=COM3                  # or /dev/ttyUSB0 on Linux
//! export TEST_BAUD=9600                  # optional, default: 9600
//! export TEST_LOOPBACK=1                 # if port has TX-RX loopback
//!
//! # Run tests
//! cargo test --features hardware-tests -- --ignored
//! ```

use super::utils::{print_available_ports, TestPortConfig};
use crate::common::wait_until;
use std::sync::Arc;
use uart_control::{
    ConnectionService, ConnectionState, LogCache, LogFormatter, PortArbiter, SerialTransport,
    SerialWorker, SyncSerialPort, WorkerEvent,
};

#[test]
#[ignore] // Run with --ignored flag
fn test_real_port_open_close() {
    print_available_ports();
    let Some(test) = TestPortConfig::or_skip() else {
        return;
    };

    let mut port = SyncSerialPort::open(&test.port_name, &test.to_port_config())
        .expect("Failed to open test port");
    assert_eq!(port.name(), test.port_name);
    port.close().expect("Failed to close test port");
}

#[test]
#[ignore]
fn test_real_worker_loopback() {
    let Some(test) = TestPortConfig::or_skip() else {
        return;
    };
    if !test.loopback_enabled {
        println!("Skipping loopback test: TEST_LOOPBACK not set");
        return;
    }

    let worker = SerialWorker::new("HW", test.to_serial_config().worker_options());
    let events = worker.subscribe_channel();
    worker
        .configure(&test.port_name, test.baud_rate)
        .expect("configure");
    worker.start().expect("Failed to start worker");

    worker.write(b"PING\r\n".to_vec());
    let mut received = Vec::new();
    while !received.ends_with(b"PING\r\n") {
        match events.recv_timeout(crate::common::WAIT) {
            Ok(WorkerEvent::DataReceived(bytes)) => received.extend(bytes),
            Ok(_) => {}
            Err(_) => break,
        }
    }
    worker.stop();

    assert_eq!(received, b"PING\r\n");
    assert!(!PortArbiter::shared().is_in_use(&test.port_name));
}

#[test]
#[ignore]
fn test_real_service_session() {
    let Some(test) = TestPortConfig::or_skip() else {
        return;
    };

    let cache = Arc::new(LogCache::new());
    let service = ConnectionService::new(
        "HW",
        test.to_serial_config(),
        LogFormatter::default(),
        Arc::clone(&cache),
    );

    service.connect(&test.port_name).expect("connect");
    assert_eq!(service.state(), ConnectionState::Connected);

    service.send_command("PING").expect("send");
    assert_eq!(service.counters().tx_count, 1);
    if test.loopback_enabled {
        assert!(wait_until(|| cache.filter_cache("HW", "ping").len() >= 2));
    }

    service.disconnect().expect("disconnect");
    assert_eq!(service.counters().tx_count, 0);
    assert!(!PortArbiter::shared().is_in_use(&test.port_name));
}
