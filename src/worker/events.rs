//! Worker event stream.

use crate::error::UartError;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

/// Something the worker observed on its port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// One inbound chunk, exactly as read.
    DataReceived(Vec<u8>),
    /// An I/O fault. `IoFatal` faults are always followed by `Disconnected`.
    Error(UartError),
    /// The stream closed unexpectedly and the loop has exited.
    Disconnected,
    /// The outbound queue was full and its oldest payloads were dropped.
    QueueOverflow {
        capacity: usize,
        dropped_payloads: usize,
        dropped_bytes: usize,
    },
}

impl WorkerEvent {
    /// True for faults that ended the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Error(err) if err.is_fatal())
    }
}

pub type EventCallback = Arc<dyn Fn(&WorkerEvent) + Send + Sync>;

#[derive(Clone)]
enum Subscriber {
    Callback(EventCallback),
    Channel(mpsc::Sender<WorkerEvent>),
}

/// Observer list. Each observer sees events in emission order.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<(u64, Subscriber)>>,
    next_id: AtomicU64,
}

impl EventBus {
    fn add(&self, subscriber: Subscriber) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push((id, subscriber));
    }

    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&WorkerEvent) + Send + Sync + 'static,
    {
        self.add(Subscriber::Callback(Arc::new(callback)));
    }

    /// Deliver events through a channel instead of a callback.
    ///
    /// The subscription ends once the receiver is dropped.
    pub fn subscribe_channel(&self) -> mpsc::Receiver<WorkerEvent> {
        let (tx, rx) = mpsc::channel();
        self.add(Subscriber::Channel(tx));
        rx
    }

    pub fn emit(&self, event: &WorkerEvent) {
        // Snapshot so observers may subscribe from inside a callback.
        let subscribers = self.subscribers.read().clone();
        let mut closed = Vec::new();
        for (id, subscriber) in subscribers {
            match subscriber {
                Subscriber::Callback(callback) => callback(event),
                Subscriber::Channel(tx) => {
                    if tx.send(event.clone()).is_err() {
                        closed.push(id);
                    }
                }
            }
        }
        if !closed.is_empty() {
            self.subscribers
                .write()
                .retain(|(id, _)| !closed.contains(id));
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.len())
            .finish()
    }
}
