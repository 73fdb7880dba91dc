use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    /// Transient: surfaced to listeners, then resolves to `Disconnected`.
    Error,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// Connecting or Connected.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Point-in-time copy of the traffic counters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub rx_count: u64,
    pub tx_count: u64,
    pub error_count: u64,
    pub bytes_rx: u64,
    pub bytes_tx: u64,
    /// Elapsed time since the Connected transition, zero when idle.
    #[serde(with = "duration_ms")]
    pub connection_time: Duration,
    pub connected_at: Option<DateTime<Local>>,
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Counters written by the I/O thread and read by the control thread.
///
/// Each counter is an independent atomic; `reset` clears them all while the
/// start marker is locked, so `snapshot` never mixes two sessions.
#[derive(Debug, Default)]
pub struct TrafficCounters {
    rx_count: AtomicU64,
    tx_count: AtomicU64,
    error_count: AtomicU64,
    bytes_rx: AtomicU64,
    bytes_tx: AtomicU64,
    started: Mutex<Option<(Instant, DateTime<Local>)>>,
}

impl TrafficCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_rx(&self, bytes: usize) {
        self.rx_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_rx.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_tx(&self, bytes: usize) {
        self.tx_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_tx.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Start the connection clock; the counters keep their values.
    pub fn start_clock(&self) {
        *self.started.lock() = Some((Instant::now(), Local::now()));
    }

    /// Zero everything and stop the clock.
    pub fn reset(&self) {
        let mut started = self.started.lock();
        self.zero();
        *started = None;
    }

    fn zero(&self) {
        self.rx_count.store(0, Ordering::Relaxed);
        self.tx_count.store(0, Ordering::Relaxed);
        self.error_count.store(0, Ordering::Relaxed);
        self.bytes_rx.store(0, Ordering::Relaxed);
        self.bytes_tx.store(0, Ordering::Relaxed);
    }

    pub fn rx_count(&self) -> u64 {
        self.rx_count.load(Ordering::Relaxed)
    }

    pub fn tx_count(&self) -> u64 {
        self.tx_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Sampled on demand; zero while no session is running.
    pub fn connection_time(&self) -> Duration {
        self.started
            .lock()
            .map(|(instant, _)| instant.elapsed())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let started = self.started.lock();
        CounterSnapshot {
            rx_count: self.rx_count.load(Ordering::Relaxed),
            tx_count: self.tx_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            bytes_rx: self.bytes_rx.load(Ordering::Relaxed),
            bytes_tx: self.bytes_tx.load(Ordering::Relaxed),
            connection_time: started
                .map(|(instant, _)| instant.elapsed())
                .unwrap_or_default(),
            connected_at: started.map(|(_, at)| at),
        }
    }
}
