//! Connection notifications and their ordered delivery.

use crate::state::{ConnectionState, CounterSnapshot};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What the presentation layer hears from a [`ConnectionService`](super::ConnectionService).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    CountersUpdated {
        counters: CounterSnapshot,
    },
    /// A surfaced failure. Fatal ones end the session.
    Error { message: String, fatal: bool },
}

pub type ServiceCallback = Arc<dyn Fn(&ServiceEvent) + Send + Sync>;

/// Events are queued in the order their transitions happened and delivered
/// by one thread at a time with no service lock held, so a listener may call
/// back into the service.
#[derive(Default)]
pub(crate) struct EventQueue {
    pending: Mutex<VecDeque<ServiceEvent>>,
    delivering: AtomicBool,
    listeners: RwLock<Vec<ServiceCallback>>,
}

impl EventQueue {
    pub(crate) fn subscribe(&self, callback: ServiceCallback) {
        self.listeners.write().push(callback);
    }

    pub(crate) fn push(&self, event: ServiceEvent) {
        self.pending.lock().push_back(event);
    }

    /// Deliver everything queued. If another thread is already delivering,
    /// it picks up this caller's events instead.
    pub(crate) fn deliver(&self) {
        loop {
            if self
                .delivering
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }

            loop {
                let next = self.pending.lock().pop_front();
                let Some(event) = next else { break };
                let listeners = self.listeners.read().clone();
                for listener in listeners {
                    listener(&event);
                }
            }

            self.delivering.store(false, Ordering::Release);
            // An event queued between the last pop and the release above
            // would otherwise wait for the next delivery.
            if self.pending.lock().is_empty() {
                return;
            }
        }
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("pending", &self.pending.lock().len())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}
