//! UART Control Library
//!
//! The concurrent core of a serial-console tool: one background I/O worker
//! per port, a process-wide arbiter that prevents double-opens, a connection
//! state machine with traffic counters, and a log cache that keeps every
//! line as searchable plain text alongside display markup.
//!
//! # Modules
//!
//! - `arbiter`: Process-wide port ownership
//! - `worker`: Background read/write loop over one port
//! - `service`: Connection lifecycle, counters and log forwarding
//! - `log_cache`: Per-source log store, formatting and filtering
//! - `port`: Transport abstraction, hardware and mock backends
//! - `state`: Connection state and traffic counters
//! - `config`: Configuration management with TOML support
//! - `error`: Unified error handling
//! - `logging`: Tracing subscriber setup
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use uart_control::config::SerialConfig;
//! use uart_control::log_cache::{LogCache, LogFormatter};
//! use uart_control::port::MockTransportFactory;
//! use uart_control::{ConnectionService, PortArbiter, ServiceBackend};
//!
//! let factory = MockTransportFactory::new();
//! factory.add_port("COM5").set_echo(true);
//!
//! let cache = Arc::new(LogCache::new());
//! let service = ConnectionService::with_backend(
//!     "CPU1",
//!     SerialConfig::default(),
//!     LogFormatter::default(),
//!     Arc::clone(&cache),
//!     ServiceBackend {
//!         factory: Arc::new(factory.clone()),
//!         enumerator: Arc::new(factory),
//!         arbiter: Arc::new(PortArbiter::new()),
//!     },
//! );
//!
//! service.connect("COM5")?;
//! service.send_command("PING")?;
//! assert_eq!(service.counters().tx_count, 1);
//! service.disconnect()?;
//! # Ok::<(), uart_control::UartError>(())
//! ```

pub mod arbiter;
pub mod config;
pub mod error;
pub mod log_cache;
pub mod logging;
pub mod port;
pub mod service;
pub mod state;
pub mod worker;

// Re-export commonly used types for convenience
pub use arbiter::{OwnerToken, PortArbiter};
pub use error::{UartError, UartResult};
pub use log_cache::{strip_html, FormattedLine, LogCache, LogEntry, LogFormatter, MessageKind};
pub use port::{
    DataBits, FlowControl, MockSerialPort, MockTransportFactory, Parity, PortConfiguration,
    PortEnumerator, PortError, SerialTransport, StopBits, SyncSerialPort, SystemPorts,
    TransportFactory,
};
pub use service::{ConnectionService, ServiceBackend, ServiceEvent};
pub use state::{ConnectionState, CounterSnapshot, TrafficCounters};
pub use worker::{SerialWorker, WorkerEvent, WorkerOptions};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
