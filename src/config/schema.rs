//! Configuration schema definitions.
//!
//! Every section and field has a default, so a partial (or absent) file is
//! always valid input.

use super::error::{ConfigError, ConfigResult};
use crate::port::{DataBits, FlowControl, Parity, PortConfiguration, StopBits};
use crate::worker::WorkerOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial port and worker tunables
    pub serial: SerialConfig,
    /// Log cache and line rendering
    pub console: ConsoleConfig,
    /// Diagnostic logging
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject values the core cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        let serial = &self.serial;
        if serial.default_baud == 0 {
            return Err(ConfigError::validation(
                "serial.default_baud",
                "must be greater than zero",
            ));
        }
        if serial.read_poll_ms == 0 {
            return Err(ConfigError::validation(
                "serial.read_poll_ms",
                "must be greater than zero",
            ));
        }
        if serial.write_queue_capacity == 0 {
            return Err(ConfigError::validation(
                "serial.write_queue_capacity",
                "must be greater than zero",
            ));
        }
        if serial.max_consecutive_errors == 0 {
            return Err(ConfigError::validation(
                "serial.max_consecutive_errors",
                "must be greater than zero",
            ));
        }
        if serial.read_buffer_size == 0 {
            return Err(ConfigError::validation(
                "serial.read_buffer_size",
                "must be greater than zero",
            ));
        }
        if let Some((alias, _)) = serial
            .port_aliases
            .iter()
            .find(|(_, target)| target.trim().is_empty())
        {
            return Err(ConfigError::validation(
                format!("serial.port_aliases.{alias}"),
                "alias target is empty",
            ));
        }
        Ok(())
    }
}

/// Serial port configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Baud rate used when a connection does not name one
    pub default_baud: u32,
    /// Read timeout in milliseconds; bounds `stop` latency
    pub read_poll_ms: u64,
    /// Outbound payloads held before the oldest is evicted
    pub write_queue_capacity: usize,
    /// How long `stop` waits for the I/O thread
    pub stop_timeout_ms: u64,
    /// Non-timeout read errors in a row before the session is dropped
    pub max_consecutive_errors: u32,
    /// Bytes requested per read
    pub read_buffer_size: usize,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// Appended to commands lacking it; empty disables
    pub line_ending: String,
    /// Friendly names for ports
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            default_baud: 115_200,
            read_poll_ms: 100,
            write_queue_capacity: 256,
            stop_timeout_ms: 1000,
            max_consecutive_errors: 3,
            read_buffer_size: 1024,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            line_ending: "\r\n".to_string(),
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    pub fn read_poll(&self) -> Duration {
        Duration::from_millis(self.read_poll_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Resolve a port name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    pub fn port_configuration(&self) -> PortConfiguration {
        PortConfiguration {
            baud_rate: self.default_baud,
            data_bits: self.data_bits,
            flow_control: self.flow_control,
            parity: self.parity,
            stop_bits: self.stop_bits,
            timeout: self.read_poll(),
        }
    }

    /// The tunables handed to each serial worker.
    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            port: self.port_configuration(),
            write_queue_capacity: self.write_queue_capacity,
            stop_timeout: self.stop_timeout(),
            max_consecutive_errors: self.max_consecutive_errors,
            read_buffer_size: self.read_buffer_size,
        }
    }
}

/// Log cache and rendering section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Entries kept per source; 0 keeps everything
    pub max_entries_per_source: usize,
    pub show_timestamps: bool,
    pub show_source: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            max_entries_per_source: 0,
            show_timestamps: true,
            show_source: true,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
    /// Daily-rotated log file (optional)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}
