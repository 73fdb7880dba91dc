//! Shared test utilities for UART Control tests.
//!
//! This module provides common test infrastructure including:
//! - An in-memory harness wiring mock ports, an arbiter and a log cache
//! - Polling helpers for asynchronous worker events
//! - Log inspection helpers

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};
use uart_control::config::SerialConfig;
use uart_control::log_cache::{LogCache, LogEntry, LogFormatter};
use uart_control::port::{MockSerialPort, MockTransportFactory};
use uart_control::{ConnectionService, PortArbiter, ServiceBackend, WorkerOptions};

/// Default deadline for conditions that depend on the I/O thread.
pub const WAIT: Duration = Duration::from_secs(3);

/// Serial settings tuned for fast tests: 10 ms read poll, small queue.
pub fn fast_serial_config() -> SerialConfig {
    SerialConfig {
        read_poll_ms: 10,
        stop_timeout_ms: 500,
        write_queue_capacity: 16,
        ..SerialConfig::default()
    }
}

pub fn fast_worker_options() -> WorkerOptions {
    fast_serial_config().worker_options()
}

/// Everything a connection needs, backed by mocks.
pub struct Harness {
    pub factory: MockTransportFactory,
    pub arbiter: Arc<PortArbiter>,
    pub cache: Arc<LogCache>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            factory: MockTransportFactory::new(),
            arbiter: Arc::new(PortArbiter::new()),
            cache: Arc::new(LogCache::new()),
        }
    }

    /// Register a device that answers every write with the same bytes.
    pub fn echo_port(&self, name: &str) -> MockSerialPort {
        let port = MockSerialPort::echo(name);
        self.factory.insert(port.clone());
        port
    }

    pub fn silent_port(&self, name: &str) -> MockSerialPort {
        self.factory.add_port(name)
    }

    pub fn backend(&self) -> ServiceBackend {
        ServiceBackend {
            factory: Arc::new(self.factory.clone()),
            enumerator: Arc::new(self.factory.clone()),
            arbiter: Arc::clone(&self.arbiter),
        }
    }

    pub fn service(&self, label: &str) -> ConnectionService {
        self.service_with(label, fast_serial_config())
    }

    pub fn service_with(&self, label: &str, settings: SerialConfig) -> ConnectionService {
        ConnectionService::with_backend(
            label,
            settings,
            LogFormatter::default(),
            Arc::clone(&self.cache),
            self.backend(),
        )
    }
}

/// Poll `condition` until it holds or [`WAIT`] elapses.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Plain text of every entry, in order.
pub fn plain_lines(entries: &[Arc<LogEntry>]) -> Vec<String> {
    entries.iter().map(|entry| entry.plain.clone()).collect()
}
