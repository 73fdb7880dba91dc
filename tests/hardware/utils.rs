//! Utility functions for hardware testing.
//!
//! Reads the device under test from the environment and lists what the
//! system exposes.

#![allow(dead_code)]

use std::env;
use std::time::Duration;
use uart_control::config::SerialConfig;
use uart_control::{PortConfiguration, PortEnumerator, SystemPorts};

/// Test port configuration from environment.
pub struct TestPortConfig {
    pub port_name: String,
    pub baud_rate: u32,
    pub loopback_enabled: bool,
}

impl TestPortConfig {
    /// Get test configuration from environment variables.
    pub fn from_env() -> Option<Self> {
        let port_name = env::var("TEST_PORT").ok()?;
        let baud_rate = env::var("TEST_BAUD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(9600);
        let loopback_enabled = env::var("TEST_LOOPBACK").ok().as_deref() == Some("1");

        Some(TestPortConfig {
            port_name,
            baud_rate,
            loopback_enabled,
        })
    }

    /// Like [`from_env`](Self::from_env), printing why a test is skipped.
    pub fn or_skip() -> Option<Self> {
        let config = Self::from_env();
        if config.is_none() {
            println!("Skipping hardware test: TEST_PORT not set");
        }
        config
    }

    pub fn to_port_config(&self) -> PortConfiguration {
        PortConfiguration {
            baud_rate: self.baud_rate,
            timeout: Duration::from_millis(100),
            ..PortConfiguration::default()
        }
    }

    pub fn to_serial_config(&self) -> SerialConfig {
        SerialConfig {
            default_baud: self.baud_rate,
            read_poll_ms: 50,
            ..SerialConfig::default()
        }
    }
}

/// Print available ports for debugging.
pub fn print_available_ports() {
    match SystemPorts.list_available_ports() {
        Ok(ports) if ports.is_empty() => println!("No serial ports detected on this system"),
        Ok(ports) => {
            println!("Available serial ports ({}):", ports.len());
            for (idx, port) in ports.iter().enumerate() {
                println!("  {}. {}", idx + 1, port);
            }
        }
        Err(e) => println!("Port enumeration failed: {e}"),
    }
}
