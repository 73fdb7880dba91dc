//! Connection lifecycle for one logical serial link.
//!
//! The [`ConnectionService`] turns user intent (connect, disconnect, send)
//! into [`SerialWorker`] lifecycle calls, and turns worker events into state
//! transitions, traffic counters and log lines.
//!
//! # Architecture
//!
//! ```text
//! connect/send ──> ConnectionService ──> SerialWorker ──> PortArbiter
//!                        ▲    │                  │
//!           WorkerEvent ─┘    └──> LogCache      └──> SerialTransport
//! ```
//!
//! State, the current worker and the session id live behind one lock. Worker
//! callbacks take that lock too, so a transition and the delivery of a worker
//! event never interleave. Nothing slow or reentrant runs while it is held:
//! opening the port, stopping a worker, log cache appends and listeners all
//! happen after it is released, and the session id tells a late result
//! whether it still applies.

mod events;
mod lines;

pub use events::{ServiceCallback, ServiceEvent};

use crate::arbiter::PortArbiter;
use crate::config::SerialConfig;
use crate::error::{UartError, UartResult};
use crate::log_cache::{FormattedLine, LogCache, LogFormatter};
use crate::port::{PortEnumerator, SystemPorts, TransportFactory};
use crate::state::{ConnectionState, CounterSnapshot, TrafficCounters};
use crate::worker::{SerialWorker, WorkerEvent};
use events::EventQueue;
use lines::LineAssembler;
use parking_lot::{Mutex, ReentrantMutex};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Where workers get their ports from.
#[derive(Clone)]
pub struct ServiceBackend {
    pub factory: Arc<dyn TransportFactory>,
    pub enumerator: Arc<dyn PortEnumerator>,
    pub arbiter: Arc<PortArbiter>,
}

impl ServiceBackend {
    /// Hardware ports and the process-wide arbiter.
    pub fn system() -> Self {
        Self {
            factory: Arc::new(SystemPorts),
            enumerator: Arc::new(SystemPorts),
            arbiter: PortArbiter::shared(),
        }
    }
}

impl std::fmt::Debug for ServiceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceBackend")
            .field("factory", &self.factory)
            .field("arbiter", &self.arbiter)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct Inner {
    state: ConnectionState,
    worker: Option<Arc<SerialWorker>>,
    target: Option<String>,
    baud_rate: u32,
    /// Bumped whenever a worker is detached; events from older sessions are dropped.
    session: u64,
    assembler: LineAssembler,
    last_error: Option<String>,
}

impl Inner {
    fn transition(&mut self, to: ConnectionState, events: &EventQueue) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        debug!(%from, %to, "connection state changed");
        events.push(ServiceEvent::StateChanged { from, to });
    }
}

/// The part shared with worker callbacks.
#[derive(Debug)]
struct Core {
    label: String,
    inner: Mutex<Inner>,
    counters: TrafficCounters,
    events: EventQueue,
    cache: Arc<LogCache>,
    formatter: LogFormatter,
    /// Serialises sends so log order matches wire order.
    send_lock: ReentrantMutex<()>,
}

impl Core {
    fn counters_event(&self) -> ServiceEvent {
        ServiceEvent::CountersUpdated {
            counters: self.counters.snapshot(),
        }
    }

    fn system_line(&self, text: &str) -> FormattedLine {
        self.formatter.format_system(&self.label, text)
    }

    fn append(&self, lines: Vec<FormattedLine>) {
        for line in lines {
            self.cache.cache_formatted(&self.label, line);
        }
    }

    fn on_worker_event(&self, session: u64, event: &WorkerEvent) {
        let mut lines = Vec::new();
        let mut detached = None;
        {
            let mut inner = self.inner.lock();
            if inner.session != session {
                return;
            }

            match event {
                WorkerEvent::DataReceived(bytes) => {
                    if !inner.state.is_active() {
                        return;
                    }
                    self.counters.record_rx(bytes.len());
                    lines.extend(
                        inner
                            .assembler
                            .push(bytes)
                            .iter()
                            .map(|text| self.formatter.format_rx(&self.label, text)),
                    );
                    self.events.push(self.counters_event());
                }
                WorkerEvent::Error(err) => {
                    let message = err.to_string();
                    self.counters.record_error();
                    inner.last_error = Some(message.clone());
                    lines.push(self.system_line(&format!("Error: {message}")));
                    self.events.push(ServiceEvent::Error {
                        message,
                        fatal: err.is_fatal(),
                    });
                    self.events.push(self.counters_event());
                }
                WorkerEvent::QueueOverflow {
                    capacity,
                    dropped_payloads,
                    dropped_bytes,
                } => {
                    let err = UartError::QueueOverflow {
                        capacity: *capacity,
                        dropped_payloads: *dropped_payloads,
                        dropped_bytes: *dropped_bytes,
                    };
                    lines.push(self.system_line(&err.to_string()));
                    self.events.push(ServiceEvent::Error {
                        message: err.to_string(),
                        fatal: false,
                    });
                }
                WorkerEvent::Disconnected => {
                    let port = inner.target.take().unwrap_or_default();
                    warn!(source = %self.label, %port, "connection lost");

                    if let Some(rest) = inner.assembler.flush() {
                        lines.push(self.formatter.format_rx(&self.label, &rest));
                    }
                    lines.push(self.system_line(&format!("Connection lost: {port}")));

                    inner.session += 1;
                    detached = inner.worker.take();
                    inner.transition(ConnectionState::Error, &self.events);
                    inner.transition(ConnectionState::Disconnected, &self.events);
                    self.counters.reset();
                    self.events.push(self.counters_event());
                }
            }
        }

        if let Some(worker) = detached {
            // Runs on the worker's own thread: signals and releases only.
            worker.stop();
        }
        self.append(lines);
        self.events.deliver();
    }
}

/// Orchestrates one serial worker for one logical link, e.g. `CPU1`.
#[derive(Debug)]
pub struct ConnectionService {
    core: Arc<Core>,
    settings: SerialConfig,
    backend: ServiceBackend,
}

impl ConnectionService {
    /// A service over hardware ports and the process-wide arbiter.
    pub fn new(
        label: impl Into<String>,
        settings: SerialConfig,
        formatter: LogFormatter,
        cache: Arc<LogCache>,
    ) -> Self {
        Self::with_backend(label, settings, formatter, cache, ServiceBackend::system())
    }

    pub fn with_backend(
        label: impl Into<String>,
        settings: SerialConfig,
        formatter: LogFormatter,
        cache: Arc<LogCache>,
        backend: ServiceBackend,
    ) -> Self {
        let core = Core {
            label: label.into(),
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                worker: None,
                target: None,
                baud_rate: settings.default_baud,
                session: 0,
                assembler: LineAssembler::default(),
                last_error: None,
            }),
            counters: TrafficCounters::new(),
            events: EventQueue::default(),
            cache,
            formatter,
            send_lock: ReentrantMutex::new(()),
        };

        Self {
            core: Arc::new(core),
            settings,
            backend,
        }
    }

    /// Open `port_name` (or the port an alias of that name points to).
    ///
    /// A no-op while already connecting or connected to the same port. The
    /// port is opened without holding the state lock, so `Connecting` is
    /// observable and a `disconnect` issued meanwhile returns at once.
    ///
    /// # Errors
    ///
    /// - `UartError::InvalidState` while busy with a different port, or when
    ///   a `disconnect` ended the attempt before the port opened
    /// - `UartError::PortBusy`, `PortNotFound` or `PortOpen` if the worker
    ///   cannot start; the state passes through `Error` back to `Disconnected`
    pub fn connect(&self, port_name: &str) -> UartResult<()> {
        let core = &self.core;
        let port = self.settings.resolve_port(port_name);

        let (session, worker, baud_rate) = {
            let mut inner = core.inner.lock();
            match inner.state {
                ConnectionState::Connecting | ConnectionState::Connected
                    if inner.target.as_deref() == Some(port.as_str()) =>
                {
                    return Ok(());
                }
                ConnectionState::Disconnected => {}
                other => {
                    return Err(UartError::InvalidState(format!(
                        "cannot connect to {port} while {other}"
                    )));
                }
            }

            inner.session += 1;
            let session = inner.session;
            inner.target = Some(port.clone());
            inner.last_error = None;
            inner.assembler = LineAssembler::default();
            core.counters.reset();
            inner.transition(ConnectionState::Connecting, &core.events);

            let worker = Arc::new(SerialWorker::with_backend(
                core.label.clone(),
                self.settings.worker_options(),
                Arc::clone(&self.backend.factory),
                Arc::clone(&self.backend.arbiter),
            ));
            let weak: Weak<Core> = Arc::downgrade(core);
            worker.subscribe(move |event| {
                if let Some(core) = weak.upgrade() {
                    core.on_worker_event(session, event);
                }
            });
            inner.worker = Some(Arc::clone(&worker));
            (session, worker, inner.baud_rate)
        };
        core.events.deliver();

        let started = worker
            .configure(&port, baud_rate)
            .and_then(|()| worker.start());

        let mut lines = Vec::new();
        let result = {
            let mut inner = core.inner.lock();
            if inner.session != session {
                None
            } else {
                match started {
                    Ok(()) => {
                        core.counters.start_clock();
                        inner.transition(ConnectionState::Connected, &core.events);
                        core.events.push(core.counters_event());
                        info!(source = %core.label, %port, baud_rate, "connected");
                        lines.push(
                            core.system_line(&format!("Connected to {port} at {baud_rate} baud")),
                        );
                        Some(Ok(()))
                    }
                    Err(err) => {
                        inner.session += 1;
                        inner.worker = None;
                        inner.target = None;
                        inner.last_error = Some(err.to_string());
                        inner.transition(ConnectionState::Error, &core.events);
                        core.events.push(ServiceEvent::Error {
                            message: err.to_string(),
                            fatal: true,
                        });
                        inner.transition(ConnectionState::Disconnected, &core.events);
                        warn!(source = %core.label, %port, error = %err, "connect failed");
                        lines.push(core.system_line(&format!("Failed to connect: {err}")));
                        Some(Err(err))
                    }
                }
            }
        };

        let Some(result) = result else {
            // Superseded while opening; the disconnect has already settled.
            worker.stop();
            debug!(source = %core.label, %port, "connect cancelled while opening");
            return Err(UartError::InvalidState(format!(
                "connection to {port} ended while connecting"
            )));
        };

        core.append(lines);
        core.events.deliver();
        result
    }

    /// Stop the worker, release the port and zero the counters.
    ///
    /// A no-op unless connecting or connected.
    pub fn disconnect(&self) -> UartResult<()> {
        let core = &self.core;

        let (worker, port) = {
            let mut inner = core.inner.lock();
            if !inner.state.is_active() {
                return Ok(());
            }
            inner.session += 1;
            inner.transition(ConnectionState::Disconnecting, &core.events);
            (inner.worker.take(), inner.target.clone())
        };
        core.events.deliver();

        if let Some(worker) = worker {
            worker.stop();
        }

        let mut lines = Vec::new();
        {
            let mut inner = core.inner.lock();
            if let Some(rest) = inner.assembler.flush() {
                lines.push(core.formatter.format_rx(&core.label, &rest));
            }
            inner.target = None;
            core.counters.reset();
            inner.transition(ConnectionState::Disconnected, &core.events);
            core.events.push(core.counters_event());
        }

        let port = port.unwrap_or_default();
        info!(source = %core.label, %port, "disconnected");
        lines.push(core.system_line(&format!("Disconnected from {port}")));
        core.append(lines);
        core.events.deliver();
        Ok(())
    }

    /// Queue `text` for transmission, appending the configured line ending.
    ///
    /// # Errors
    ///
    /// - `UartError::NotConnected` unless connected; nothing is written
    pub fn send_command(&self, text: &str) -> UartResult<()> {
        let core = &self.core;
        let _send = core.send_lock.lock();

        let mut payload = text.to_string();
        let ending = self.settings.line_ending.as_str();
        if !ending.is_empty() && !payload.ends_with(ending) {
            payload.push_str(ending);
        }

        let worker = {
            let inner = core.inner.lock();
            let worker = match (&inner.worker, inner.state) {
                (Some(worker), ConnectionState::Connected) => Arc::clone(worker),
                _ => return Err(UartError::NotConnected),
            };
            if payload.is_empty() {
                return Ok(());
            }
            core.counters.record_tx(payload.len());
            core.events.push(core.counters_event());
            worker
        };

        let shown = text
            .strip_suffix(ending)
            .filter(|_| !ending.is_empty())
            .unwrap_or(text);
        core.append(vec![core.formatter.format_tx(&core.label, shown)]);
        worker.write(payload.into_bytes());
        core.events.deliver();
        Ok(())
    }

    /// Names of the ports the operating system reports, sorted.
    pub fn refresh_ports(&self) -> UartResult<Vec<String>> {
        let mut ports = self
            .backend
            .enumerator
            .list_available_ports()
            .map_err(|e| UartError::Enumeration(e.to_string()))?;
        ports.sort();
        ports.dedup();
        debug!(count = ports.len(), "ports enumerated");
        Ok(ports)
    }

    /// Baud rate used by the next `connect`.
    ///
    /// # Errors
    ///
    /// - `UartError::InvalidConfig` for zero
    /// - `UartError::InvalidState` unless disconnected
    pub fn set_baud_rate(&self, baud_rate: u32) -> UartResult<()> {
        if baud_rate == 0 {
            return Err(UartError::InvalidConfig(
                "baud rate must be greater than zero".into(),
            ));
        }
        let mut inner = self.core.inner.lock();
        if inner.state != ConnectionState::Disconnected {
            return Err(UartError::InvalidState(format!(
                "cannot change baud rate while {}",
                inner.state
            )));
        }
        inner.baud_rate = baud_rate;
        Ok(())
    }

    pub fn baud_rate(&self) -> u32 {
        self.core.inner.lock().baud_rate
    }

    pub fn state(&self) -> ConnectionState {
        self.core.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// The port of the current session.
    pub fn port_name(&self) -> Option<String> {
        self.core.inner.lock().target.clone()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.core.counters.snapshot()
    }

    /// The most recent surfaced failure, kept across sessions until the
    /// next `connect`.
    pub fn last_error(&self) -> Option<String> {
        self.core.inner.lock().last_error.clone()
    }

    /// Pending outbound payloads of the current worker.
    pub fn queued_writes(&self) -> usize {
        self.core
            .inner
            .lock()
            .worker
            .as_ref()
            .map_or(0, |worker| worker.queue_len())
    }

    pub fn label(&self) -> &str {
        &self.core.label
    }

    pub fn log_cache(&self) -> &Arc<LogCache> {
        &self.core.cache
    }

    pub fn settings(&self) -> &SerialConfig {
        &self.settings
    }

    /// Register a listener for state, counter and error notifications.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&ServiceEvent) + Send + Sync + 'static,
    {
        self.core.events.subscribe(Arc::new(listener));
    }
}

impl Drop for ConnectionService {
    fn drop(&mut self) {
        let worker = self.core.inner.lock().worker.take();
        if let Some(worker) = worker {
            worker.stop();
        }
    }
}
