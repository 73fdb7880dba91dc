//! Port abstraction layer for serial communication.
//!
//! Provides the transport traits consumed by the serial worker, the
//! `serialport`-backed implementation, and an in-memory mock for tests.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::{MockSerialPort, MockTransportFactory};
pub use sync_port::*;
pub use traits::*;
