//! Port-specific error types.
//!
//! Transport faults reported by a [`SerialTransport`](super::SerialTransport),
//! kept separate from the application-level [`UartError`](crate::UartError)
//! so the worker can decide which faults end a session.

use std::io::ErrorKind;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during serial port operations.
#[derive(Debug, Error)]
pub enum PortError {
    /// The specified serial port was not found on the system.
    #[error("Serial port not found: {0}")]
    NotFound(String),

    /// An I/O error occurred during port operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Port configuration failed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A read or write produced nothing within the timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The device went away or the handle was invalidated.
    #[error("Device disconnected: {0}")]
    Disconnected(String),

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a port name.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a Timeout error from a duration.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout(duration)
    }

    /// Create a Disconnected error from a reason.
    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self::Disconnected(reason.into())
    }

    /// True when the fault only means "no data this cycle".
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// True when the stream can no longer be used for this session.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Disconnected(_) | Self::NotFound(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                ErrorKind::BrokenPipe
                    | ErrorKind::NotConnected
                    | ErrorKind::UnexpectedEof
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::ConnectionReset
            ),
            Self::Serial(e) => matches!(e.kind(), serialport::ErrorKind::NoDevice),
            _ => false,
        }
    }
}
