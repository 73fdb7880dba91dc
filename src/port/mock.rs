//! Mock serial port implementation for testing.
//!
//! Provides a `MockSerialPort` that simulates a device without hardware and
//! a `MockTransportFactory` that hands out mock ports by name. Clones of a
//! `MockSerialPort` share one state, so a test keeps a handle while the
//! worker owns the boxed transport.

use super::error::PortError;
use super::traits::{PortConfiguration, PortEnumerator, SerialTransport, TransportFactory};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, VecDeque};
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

/// Inner state of the mock port.
#[derive(Debug)]
struct MockPortState {
    /// Bytes to be returned by read operations.
    read_queue: VecDeque<u8>,
    /// Log of all payloads written to the port, one entry per write call.
    write_log: Vec<Vec<u8>>,
    /// Loop written bytes back into the read queue.
    echo: bool,
    /// Simulated device removal; every operation fails from now on.
    disconnected: bool,
    fail_next_read: Option<ErrorKind>,
    fail_next_write: Option<ErrorKind>,
    /// Upper bound on bytes accepted per write call.
    write_chunk_limit: Option<usize>,
    timeout: Duration,
    closed: bool,
}

impl Default for MockPortState {
    fn default() -> Self {
        Self {
            read_queue: VecDeque::new(),
            write_log: Vec::new(),
            echo: false,
            disconnected: false,
            fail_next_read: None,
            fail_next_write: None,
            write_chunk_limit: None,
            timeout: Duration::from_millis(100),
            closed: false,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<MockPortState>,
    data_ready: Condvar,
}

/// Mock serial port implementation for testing.
///
/// # Example
/// ```
/// use uart_control::port::{MockSerialPort, SerialTransport};
///
/// let mut port = MockSerialPort::new("MOCK0");
/// port.enqueue_read(b"Hello, World!");
///
/// let mut buffer = [0u8; 13];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"Hello, World!");
///
/// port.write_bytes(b"Response").unwrap();
/// assert_eq!(port.write_log(), vec![b"Response".to_vec()]);
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    name: String,
    shared: Arc<Shared>,
}

impl MockSerialPort {
    /// Create a new mock serial port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Create a mock that echoes every write back to the reader.
    pub fn echo(name: impl Into<String>) -> Self {
        let port = Self::new(name);
        port.set_echo(true);
        port
    }

    /// Enqueue bytes to be returned by subsequent read operations.
    pub fn enqueue_read(&self, data: &[u8]) {
        let mut state = self.shared.state.lock();
        state.read_queue.extend(data);
        self.shared.data_ready.notify_all();
    }

    pub fn set_echo(&self, echo: bool) {
        self.shared.state.lock().echo = echo;
    }

    /// Get a copy of all payloads written to the port.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.shared.state.lock().write_log.clone()
    }

    /// All written bytes, concatenated in write order.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.shared.state.lock().write_log.concat()
    }

    /// Clear the write log.
    pub fn clear_write_log(&self) {
        self.shared.state.lock().write_log.clear();
    }

    /// Fail the next read with the given I/O error kind.
    pub fn fail_next_read(&self, kind: ErrorKind) {
        self.shared.state.lock().fail_next_read = Some(kind);
        self.shared.data_ready.notify_all();
    }

    /// Fail the next write with the given I/O error kind.
    pub fn fail_next_write(&self, kind: ErrorKind) {
        self.shared.state.lock().fail_next_write = Some(kind);
    }

    /// Accept at most `limit` bytes per write call.
    pub fn set_write_chunk_limit(&self, limit: Option<usize>) {
        self.shared.state.lock().write_chunk_limit = limit;
    }

    /// Simulate the device being unplugged.
    pub fn disconnect(&self) {
        self.shared.state.lock().disconnected = true;
        self.shared.data_ready.notify_all();
    }

    /// Plug the simulated device back in.
    pub fn reconnect(&self) {
        let mut state = self.shared.state.lock();
        state.disconnected = false;
        state.closed = false;
    }

    /// Whether the current holder closed the transport.
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Get the number of bytes available to read.
    pub fn available_bytes(&self) -> usize {
        self.shared.state.lock().read_queue.len()
    }

    /// The read timeout most recently configured by the holder.
    pub fn timeout(&self) -> Duration {
        self.shared.state.lock().timeout
    }
}

impl SerialTransport for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.shared.state.lock();

        if state.disconnected {
            return Err(PortError::Io(ErrorKind::BrokenPipe.into()));
        }
        if let Some(kind) = state.fail_next_write.take() {
            return Err(PortError::Io(kind.into()));
        }

        let accepted = state
            .write_chunk_limit
            .map_or(data.len(), |limit| data.len().min(limit));
        let chunk = data[..accepted].to_vec();
        if state.echo {
            state.read_queue.extend(&chunk);
            self.shared.data_ready.notify_all();
        }
        state.write_log.push(chunk);

        Ok(accepted)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut state = self.shared.state.lock();

        if state.read_queue.is_empty() && !state.disconnected && state.fail_next_read.is_none()
        {
            let timeout = state.timeout;
            self.shared.data_ready.wait_for(&mut state, timeout);
        }

        if state.disconnected {
            return Err(PortError::disconnected(format!("{} removed", self.name)));
        }
        if let Some(kind) = state.fail_next_read.take() {
            return Err(PortError::Io(kind.into()));
        }
        if state.read_queue.is_empty() {
            return Err(PortError::timeout(state.timeout));
        }

        let n = buffer.len().min(state.read_queue.len());
        for (slot, byte) in buffer.iter_mut().zip(state.read_queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.shared.state.lock().timeout = timeout;
        Ok(())
    }

    fn close(&mut self) -> Result<(), PortError> {
        self.shared.state.lock().closed = true;
        Ok(())
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}

#[derive(Debug, Default)]
struct FactoryState {
    ports: BTreeMap<String, MockSerialPort>,
    open_failures: BTreeMap<String, ErrorKind>,
    open_counts: BTreeMap<String, usize>,
    open_delay: Duration,
}

/// Hands out [`MockSerialPort`]s by name and lists them as available ports.
#[derive(Debug, Default, Clone)]
pub struct MockTransportFactory {
    state: Arc<Mutex<FactoryState>>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device and return a handle sharing its state.
    pub fn add_port(&self, name: &str) -> MockSerialPort {
        let port = MockSerialPort::new(name);
        self.insert(port.clone());
        port
    }

    /// Register an already-built mock port.
    pub fn insert(&self, port: MockSerialPort) {
        self.state.lock().ports.insert(port.name.clone(), port);
    }

    /// Remove a device; later opens fail with `NotFound`.
    pub fn remove_port(&self, name: &str) -> Option<MockSerialPort> {
        self.state.lock().ports.remove(name)
    }

    pub fn port(&self, name: &str) -> Option<MockSerialPort> {
        self.state.lock().ports.get(name).cloned()
    }

    /// Make every open of `name` fail with the given I/O error kind.
    pub fn fail_open(&self, name: &str, kind: ErrorKind) {
        self.state
            .lock()
            .open_failures
            .insert(name.to_string(), kind);
    }

    pub fn clear_open_failure(&self, name: &str) {
        self.state.lock().open_failures.remove(name);
    }

    /// Make every open block for `delay` first, like a slow USB bridge.
    pub fn set_open_delay(&self, delay: Duration) {
        self.state.lock().open_delay = delay;
    }

    /// How many times `open` was attempted for `name`.
    pub fn open_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .open_counts
            .get(name)
            .copied()
            .unwrap_or(0)
    }
}

impl TransportFactory for MockTransportFactory {
    fn open(
        &self,
        port_name: &str,
        config: &PortConfiguration,
    ) -> Result<Box<dyn SerialTransport>, PortError> {
        let mut state = self.state.lock();
        *state.open_counts.entry(port_name.to_string()).or_insert(0) += 1;

        if let Some(kind) = state.open_failures.get(port_name) {
            return Err(PortError::Io((*kind).into()));
        }
        let mut port = state
            .ports
            .get(port_name)
            .cloned()
            .ok_or_else(|| PortError::not_found(port_name))?;
        let delay = state.open_delay;
        drop(state);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        port.shared.state.lock().closed = false;
        port.set_timeout(config.timeout)?;
        Ok(Box::new(port))
    }
}

impl PortEnumerator for MockTransportFactory {
    fn list_available_ports(&self) -> Result<Vec<String>, PortError> {
        Ok(self.state.lock().ports.keys().cloned().collect())
    }
}
