use crate::port::PortError;
use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` type for the serial core.
pub type UartResult<T> = Result<T, UartError>;

/// Unified error type of the serial core.
///
/// The arbiter and the worker report these at their own call boundary;
/// [`ConnectionService`](crate::ConnectionService) maps them into state
/// transitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UartError {
    /// Another worker owns the port.
    #[error("Port {0} is already in use")]
    PortBusy(String),

    /// No such device.
    #[error("Serial port not found: {0}")]
    PortNotFound(String),

    /// The device exists but could not be opened (permissions, driver fault).
    #[error("Failed to open {port}: {reason}")]
    PortOpen { port: String, reason: String },

    /// A single read cycle produced no data. Recoverable.
    #[error("Read timed out after {0:?}")]
    IoTimeout(Duration),

    /// A read or write fault that leaves the stream usable. Recoverable.
    #[error("I/O error on {port}: {reason}")]
    Io { port: String, reason: String },

    /// The stream closed or was invalidated. Ends the session.
    #[error("I/O failure on {port}: {reason}")]
    IoFatal { port: String, reason: String },

    /// The outbound queue was full and its oldest payloads were dropped.
    #[error(
        "Write queue full (capacity {capacity}); dropped {dropped_payloads} payloads ({dropped_bytes} bytes)"
    )]
    QueueOverflow {
        capacity: usize,
        dropped_payloads: usize,
        dropped_bytes: usize,
    },

    /// The operation requires a connected port.
    #[error("Operation requires a connected port")]
    NotConnected,

    /// The operation is not valid in the current lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A supplied parameter was rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The operating system could not list ports.
    #[error("Port enumeration failed: {0}")]
    Enumeration(String),
}

impl UartError {
    /// Map a failure to open `port` into the open-time taxonomy.
    pub fn from_open(port: &str, err: PortError) -> Self {
        match err {
            PortError::NotFound(_) => Self::PortNotFound(port.to_string()),
            PortError::Serial(ref e) if e.kind() == serialport::ErrorKind::NoDevice => {
                Self::PortNotFound(port.to_string())
            }
            other => Self::PortOpen {
                port: port.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// Map an I/O fault on an open port.
    pub fn from_io(port: &str, err: &PortError) -> Self {
        match err {
            PortError::Timeout(d) => Self::IoTimeout(*d),
            e if e.is_timeout() => Self::IoTimeout(Duration::ZERO),
            e if e.is_fatal() => Self::IoFatal {
                port: port.to_string(),
                reason: e.to_string(),
            },
            e => Self::Io {
                port: port.to_string(),
                reason: e.to_string(),
            },
        }
    }

    /// Whether the condition ends the current session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::IoFatal { .. } | Self::PortNotFound(_) | Self::PortOpen { .. }
        )
    }
}
