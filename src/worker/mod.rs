//! Background serial I/O worker.
//!
//! A [`SerialWorker`] owns one port for the lifetime of a session. `start`
//! acquires the port through the [`PortArbiter`], opens it and spawns a
//! dedicated thread that alternates between draining the outbound queue
//! and a bounded-timeout read. `stop` is cooperative: the loop re-checks its
//! stop flag once per read timeout, so shutdown latency is bounded by the
//! poll interval.
//!
//! Every `start` creates a fresh session with its own stop flag and exit
//! signal. A loop that outlives `stop` keeps its port reserved until it
//! actually exits, and the worker refuses to start again until then.
//!
//! ```text
//! write() ──> WriteQueue ──┐
//!                          ├──> I/O thread ──> SerialTransport
//! subscribe() <── EventBus ┘
//! ```

pub mod events;
pub mod queue;

pub use events::{EventBus, EventCallback, WorkerEvent};
pub use queue::{Overflow, WriteQueue};

use crate::arbiter::{OwnerToken, PortArbiter};
use crate::error::{UartError, UartResult};
use crate::port::{PortConfiguration, PortError, SerialTransport, SystemPorts, TransportFactory};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Tunables supplied by the configuration source at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Framing, default baud, and the read-poll timeout.
    pub port: PortConfiguration,
    pub write_queue_capacity: usize,
    /// Upper bound `stop` waits for the loop before detaching it.
    pub stop_timeout: Duration,
    /// Non-timeout read errors in a row before the session is declared dead.
    pub max_consecutive_errors: u32,
    pub read_buffer_size: usize,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            port: PortConfiguration::default(),
            write_queue_capacity: 256,
            stop_timeout: Duration::from_millis(1000),
            max_consecutive_errors: 3,
            read_buffer_size: 1024,
        }
    }
}

impl WorkerOptions {
    pub fn read_poll(&self) -> Duration {
        self.port.timeout
    }
}

#[derive(Debug)]
struct Settings {
    port_name: Option<String>,
    port: PortConfiguration,
}

/// State shared by the control side and every I/O loop of this worker.
#[derive(Debug)]
struct Shared {
    label: String,
    token: OwnerToken,
    arbiter: Arc<PortArbiter>,
    settings: RwLock<Settings>,
    queue: WriteQueue,
    events: EventBus,
    last_error: Mutex<Option<String>>,
    max_consecutive_errors: u32,
    read_buffer_size: usize,
}

impl Shared {
    fn record_error(&self, err: &UartError) {
        *self.last_error.lock() = Some(err.to_string());
    }
}

/// One run of the I/O loop.
#[derive(Debug)]
struct Session {
    port_name: String,
    stop_requested: AtomicBool,
    /// Cleared by `stop` or when the loop leaves its port.
    active: AtomicBool,
    exited: Mutex<bool>,
    exit_signal: Condvar,
    thread: Mutex<Option<ThreadId>>,
}

impl Session {
    fn new(port_name: String) -> Self {
        Self {
            port_name,
            stop_requested: AtomicBool::new(false),
            active: AtomicBool::new(true),
            exited: Mutex::new(false),
            exit_signal: Condvar::new(),
            thread: Mutex::new(None),
        }
    }

    fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.active.store(false, Ordering::Release);
    }

    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn on_own_thread(&self) -> bool {
        *self.thread.lock() == Some(thread::current().id())
    }

    fn has_exited(&self) -> bool {
        *self.exited.lock()
    }

    /// Wait up to `timeout` for the loop to finish; true if it did.
    fn wait_exited(&self, timeout: Duration) -> bool {
        let mut exited = self.exited.lock();
        if !*exited {
            self.exit_signal
                .wait_while_for(&mut exited, |done| !*done, timeout);
        }
        *exited
    }

    fn mark_exited(&self) {
        *self.exited.lock() = true;
        self.exit_signal.notify_all();
    }
}

#[derive(Debug)]
struct Running {
    session: Arc<Session>,
    join: JoinHandle<()>,
}

enum LoopExit {
    Stopped,
    Fatal(UartError),
}

/// Drives one port on a dedicated thread.
pub struct SerialWorker {
    factory: Arc<dyn TransportFactory>,
    shared: Arc<Shared>,
    /// Latest session; read without `handle` so callbacks on the I/O thread can stop it.
    current: RwLock<Option<Arc<Session>>>,
    handle: Mutex<Option<Running>>,
    stop_timeout: Duration,
}

impl SerialWorker {
    /// A worker over the system's hardware ports and the process-wide arbiter.
    pub fn new(label: impl Into<String>, options: WorkerOptions) -> Self {
        Self::with_backend(
            label,
            options,
            Arc::new(SystemPorts),
            PortArbiter::shared(),
        )
    }

    /// A worker over an injected transport factory and arbiter.
    pub fn with_backend(
        label: impl Into<String>,
        options: WorkerOptions,
        factory: Arc<dyn TransportFactory>,
        arbiter: Arc<PortArbiter>,
    ) -> Self {
        let shared = Shared {
            label: label.into(),
            token: OwnerToken::new(),
            arbiter,
            settings: RwLock::new(Settings {
                port_name: None,
                port: options.port.clone(),
            }),
            queue: WriteQueue::new(options.write_queue_capacity),
            events: EventBus::default(),
            last_error: Mutex::new(None),
            max_consecutive_errors: options.max_consecutive_errors.max(1),
            read_buffer_size: options.read_buffer_size.max(1),
        };

        Self {
            factory,
            shared: Arc::new(shared),
            current: RwLock::new(None),
            handle: Mutex::new(None),
            stop_timeout: options.stop_timeout,
        }
    }

    /// Select the port and baud rate for the next `start`.
    ///
    /// # Errors
    ///
    /// - `UartError::InvalidState` while the worker is running
    /// - `UartError::InvalidConfig` for an empty name or a zero baud rate
    pub fn configure(&self, port_name: &str, baud_rate: u32) -> UartResult<()> {
        if self.is_running() {
            return Err(UartError::InvalidState(format!(
                "cannot reconfigure {} while running",
                self.shared.label
            )));
        }
        if port_name.trim().is_empty() {
            return Err(UartError::InvalidConfig("port name is empty".into()));
        }
        if baud_rate == 0 {
            return Err(UartError::InvalidConfig(
                "baud rate must be greater than zero".into(),
            ));
        }

        let mut settings = self.shared.settings.write();
        settings.port_name = Some(port_name.to_string());
        settings.port.baud_rate = baud_rate;
        debug!(source = %self.shared.label, port = port_name, baud_rate, "worker configured");
        Ok(())
    }

    /// Acquire and open the configured port, then spawn the I/O loop.
    ///
    /// A no-op while already running. On failure the worker stays stopped
    /// and holds nothing.
    ///
    /// # Errors
    ///
    /// - `UartError::InvalidState` if no port is configured, or while a
    ///   previous loop that did not stop in time is still running
    /// - `UartError::PortBusy`, `PortNotFound` or `PortOpen` from acquiring
    ///   and opening the port
    pub fn start(&self) -> UartResult<()> {
        let mut slot = self.handle.lock();
        if let Some(running) = slot.as_ref() {
            if running.session.is_active() {
                return Ok(());
            }
            if !running.session.has_exited() {
                return Err(UartError::InvalidState(format!(
                    "{} is still shutting down its I/O loop on {}",
                    self.shared.label, running.session.port_name
                )));
            }
        }
        if let Some(previous) = slot.take() {
            if previous.join.join().is_err() {
                error!(source = %self.shared.label, "serial I/O thread panicked");
            }
        }

        let (port_name, config) = {
            let settings = self.shared.settings.read();
            let name = settings.port_name.clone().ok_or_else(|| {
                UartError::InvalidState(format!("{} has no port configured", self.shared.label))
            })?;
            (name, settings.port.clone())
        };

        let shared = &self.shared;
        shared.arbiter.acquire(&port_name, shared.token)?;

        let transport = match self.open_transport(&port_name, &config) {
            Ok(transport) => transport,
            Err(err) => {
                shared.arbiter.release(&port_name, shared.token);
                shared.record_error(&err);
                warn!(source = %shared.label, port = %port_name, error = %err, "open failed");
                return Err(err);
            }
        };

        let session = Arc::new(Session::new(port_name.clone()));
        *self.current.write() = Some(Arc::clone(&session));

        let thread_shared = Arc::clone(shared);
        let thread_session = Arc::clone(&session);
        let spawned = thread::Builder::new()
            .name(format!("serial-{}", shared.label))
            .spawn(move || run_loop(thread_shared, thread_session, transport));

        match spawned {
            Ok(join) => {
                *slot = Some(Running { session, join });
                info!(
                    source = %shared.label,
                    port = %port_name,
                    baud_rate = config.baud_rate,
                    "serial worker started"
                );
                Ok(())
            }
            Err(e) => {
                session.request_stop();
                session.mark_exited();
                shared.arbiter.release(&port_name, shared.token);
                let err = UartError::PortOpen {
                    port: port_name,
                    reason: format!("failed to spawn I/O thread: {e}"),
                };
                shared.record_error(&err);
                Err(err)
            }
        }
    }

    fn open_transport(
        &self,
        port_name: &str,
        config: &PortConfiguration,
    ) -> UartResult<Box<dyn SerialTransport>> {
        let mut transport = self
            .factory
            .open(port_name, config)
            .map_err(|e| UartError::from_open(port_name, e))?;
        transport
            .set_timeout(config.timeout)
            .map_err(|e| UartError::from_open(port_name, e))?;
        Ok(transport)
    }

    /// Signal the loop and wait (bounded) for it to exit.
    ///
    /// Idempotent. The loop releases the port when it exits. If it does not
    /// exit within the stop timeout it is detached and keeps the port
    /// reserved until it does. Called from the worker's own thread (inside
    /// an event callback) it only signals.
    pub fn stop(&self) {
        let Some(session) = self.current.read().clone() else {
            return;
        };
        session.request_stop();
        if session.on_own_thread() {
            return;
        }

        let mut slot = self.handle.lock();
        let Some(running) = slot.take() else {
            return;
        };
        running.session.request_stop();

        if running.session.wait_exited(self.stop_timeout) {
            if running.join.join().is_err() {
                error!(source = %self.shared.label, "serial I/O thread panicked");
            }
            debug!(source = %self.shared.label, "serial worker stopped");
        } else {
            warn!(
                source = %self.shared.label,
                port = %running.session.port_name,
                timeout = ?self.stop_timeout,
                "serial I/O thread did not exit in time; detaching"
            );
            *slot = Some(running);
        }
    }

    /// Queue a payload for transmission and return immediately.
    ///
    /// Valid in any state; payloads queued while stopped are sent once the
    /// loop runs. Evictions are reported as `QueueOverflow` by the I/O
    /// loop, never on the caller's thread. Returns false for an empty
    /// payload, which is ignored.
    pub fn write(&self, payload: impl Into<Vec<u8>>) -> bool {
        let payload = payload.into();
        if payload.is_empty() {
            return false;
        }
        if let Some(evicted) = self.shared.queue.push(payload) {
            trace!(
                source = %self.shared.label,
                dropped_bytes = evicted.len(),
                "write queue full; dropped oldest payload"
            );
        }
        true
    }

    /// Register an observer. Register before `start` to see every event.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&WorkerEvent) + Send + Sync + 'static,
    {
        self.shared.events.subscribe(callback);
    }

    pub fn subscribe_channel(&self) -> mpsc::Receiver<WorkerEvent> {
        self.shared.events.subscribe_channel()
    }

    pub fn is_running(&self) -> bool {
        self.current
            .read()
            .as_ref()
            .is_some_and(|session| session.is_active())
    }

    /// True while the I/O loop holds an open port.
    pub fn is_connected(&self) -> bool {
        self.is_running()
    }

    pub fn port_name(&self) -> Option<String> {
        self.shared.settings.read().port_name.clone()
    }

    pub fn baud_rate(&self) -> u32 {
        self.shared.settings.read().port.baud_rate
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn token(&self) -> OwnerToken {
        self.shared.token
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Discard pending outbound payloads, returning how many were dropped.
    pub fn flush_queue(&self) -> usize {
        self.shared.queue.clear()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().clone()
    }
}

impl Drop for SerialWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SerialWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialWorker")
            .field("label", &self.shared.label)
            .field("port_name", &self.port_name())
            .field("baud_rate", &self.baud_rate())
            .field("running", &self.is_running())
            .field("queued", &self.queue_len())
            .finish()
    }
}

fn run_loop(shared: Arc<Shared>, session: Arc<Session>, mut transport: Box<dyn SerialTransport>) {
    *session.thread.lock() = Some(thread::current().id());
    let port_name = session.port_name.as_str();

    let exit = io_loop(&shared, &session, transport.as_mut());

    if let Err(e) = transport.close() {
        debug!(port = %port_name, error = %e, "error while closing port");
    }
    drop(transport);
    session.active.store(false, Ordering::Release);
    shared.arbiter.release(port_name, shared.token);

    if let LoopExit::Fatal(err) = exit {
        error!(source = %shared.label, port = %port_name, error = %err, "serial session lost");
        shared.record_error(&err);
        shared.events.emit(&WorkerEvent::Error(err));
        shared.events.emit(&WorkerEvent::Disconnected);
    } else {
        debug!(source = %shared.label, port = %port_name, "I/O loop exited");
    }

    session.mark_exited();
}

fn report_overflow(shared: &Shared) {
    if let Some(overflow) = shared.queue.take_overflow() {
        let capacity = shared.queue.capacity();
        warn!(
            source = %shared.label,
            capacity,
            dropped_payloads = overflow.payloads,
            dropped_bytes = overflow.bytes,
            "write queue overflow; dropped oldest payloads"
        );
        shared.events.emit(&WorkerEvent::QueueOverflow {
            capacity,
            dropped_payloads: overflow.payloads,
            dropped_bytes: overflow.bytes,
        });
    }
}

fn io_loop(shared: &Shared, session: &Session, transport: &mut dyn SerialTransport) -> LoopExit {
    let port_name = session.port_name.as_str();
    let mut buffer = vec![0u8; shared.read_buffer_size];
    let mut error_streak = 0u32;

    'io: loop {
        if session.stop_requested() {
            break LoopExit::Stopped;
        }

        report_overflow(shared);
        for payload in shared.queue.drain() {
            if let Err(e) = write_all(transport, &payload) {
                let err = UartError::from_io(port_name, &e);
                if err.is_fatal() {
                    break 'io LoopExit::Fatal(err);
                }
                warn!(port = port_name, error = %err, "write failed; payload dropped");
                shared.record_error(&err);
                shared.events.emit(&WorkerEvent::Error(err));
                continue;
            }
            trace!(port = port_name, bytes = payload.len(), "tx");
        }

        match transport.read_bytes(&mut buffer) {
            Ok(0) => {}
            Ok(n) => {
                error_streak = 0;
                trace!(port = port_name, bytes = n, "rx");
                shared
                    .events
                    .emit(&WorkerEvent::DataReceived(buffer[..n].to_vec()));
            }
            Err(e) => match UartError::from_io(port_name, &e) {
                UartError::IoTimeout(_) => {}
                err if err.is_fatal() => break LoopExit::Fatal(err),
                err => {
                    error_streak += 1;
                    warn!(port = port_name, error = %err, streak = error_streak, "read failed");
                    if error_streak >= shared.max_consecutive_errors {
                        break LoopExit::Fatal(UartError::IoFatal {
                            port: port_name.to_string(),
                            reason: format!("{error_streak} consecutive read errors; last: {e}"),
                        });
                    }
                    shared.record_error(&err);
                    shared.events.emit(&WorkerEvent::Error(err));
                }
            },
        }
    }
}

/// Write the whole payload, continuing after partial writes.
fn write_all(transport: &mut dyn SerialTransport, payload: &[u8]) -> Result<(), PortError> {
    let mut written = 0;
    while written < payload.len() {
        match transport.write_bytes(&payload[written..])? {
            0 => {
                return Err(PortError::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "port accepted no bytes",
                )))
            }
            n => written += n,
        }
    }
    Ok(())
}
