//! Process-wide port ownership.
//!
//! A [`PortArbiter`] maps port names to the [`OwnerToken`] of the worker
//! holding them. All operations run under one short-held lock that is never
//! held during port I/O.

use crate::error::{UartError, UartResult};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

static SHARED: Lazy<Arc<PortArbiter>> = Lazy::new(|| Arc::new(PortArbiter::new()));

/// Opaque identity of a port holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerToken(Uuid);

impl OwnerToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OwnerToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Grants exclusive ownership of a named port to one holder at a time.
#[derive(Debug, Default)]
pub struct PortArbiter {
    owners: Mutex<HashMap<String, OwnerToken>>,
}

impl PortArbiter {
    /// A fresh, empty registry. Tests inject their own instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn shared() -> Arc<PortArbiter> {
        Arc::clone(&SHARED)
    }

    /// Take ownership of `port_name`.
    ///
    /// Idempotent for the current owner.
    ///
    /// # Errors
    ///
    /// - `UartError::PortBusy` if a different token holds the port
    pub fn acquire(&self, port_name: &str, owner: OwnerToken) -> UartResult<()> {
        let mut owners = self.owners.lock();
        match owners.get(port_name) {
            Some(current) if *current == owner => Ok(()),
            Some(current) => {
                warn!(port = port_name, holder = %current, "port busy");
                Err(UartError::PortBusy(port_name.to_string()))
            }
            None => {
                owners.insert(port_name.to_string(), owner);
                debug!(port = port_name, %owner, "port acquired");
                Ok(())
            }
        }
    }

    /// Give up ownership. A no-op unless `owner` is the current holder.
    pub fn release(&self, port_name: &str, owner: OwnerToken) {
        let mut owners = self.owners.lock();
        if owners.get(port_name) == Some(&owner) {
            owners.remove(port_name);
            debug!(port = port_name, %owner, "port released");
        }
    }

    pub fn is_in_use(&self, port_name: &str) -> bool {
        self.owners.lock().contains_key(port_name)
    }

    /// Snapshot of the names currently held.
    pub fn active_ports(&self) -> BTreeSet<String> {
        self.owners.lock().keys().cloned().collect()
    }

    /// The holder of `port_name`, if any.
    pub fn owner_of(&self, port_name: &str) -> Option<OwnerToken> {
        self.owners.lock().get(port_name).copied()
    }

    /// Drop every ownership record regardless of holder.
    pub fn reset(&self) {
        let mut owners = self.owners.lock();
        if !owners.is_empty() {
            debug!(count = owners.len(), "port registry reset");
        }
        owners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_acquire_release_cycle() {
        let arbiter = PortArbiter::new();
        let a = OwnerToken::new();
        let b = OwnerToken::new();

        arbiter.acquire("COM5", a).unwrap();
        assert_eq!(
            arbiter.acquire("COM5", b),
            Err(UartError::PortBusy("COM5".into()))
        );

        arbiter.release("COM5", a);
        assert!(arbiter.acquire("COM5", b).is_ok());
        assert_eq!(arbiter.owner_of("COM5"), Some(b));
    }

    #[test]
    fn test_acquire_is_idempotent_for_holder() {
        let arbiter = PortArbiter::new();
        let a = OwnerToken::new();
        arbiter.acquire("COM5", a).unwrap();
        arbiter.acquire("COM5", a).unwrap();
        assert_eq!(arbiter.active_ports().len(), 1);
    }

    #[test]
    fn test_release_by_stranger_is_noop() {
        let arbiter = PortArbiter::new();
        let a = OwnerToken::new();
        arbiter.acquire("COM5", a).unwrap();

        arbiter.release("COM5", OwnerToken::new());
        assert!(arbiter.is_in_use("COM5"));

        arbiter.release("COM5", a);
        arbiter.release("COM5", a);
        assert!(!arbiter.is_in_use("COM5"));
    }

    #[test]
    fn test_reset_clears_everything() {
        let arbiter = PortArbiter::new();
        arbiter.acquire("COM1", OwnerToken::new()).unwrap();
        arbiter.acquire("COM2", OwnerToken::new()).unwrap();

        arbiter.reset();
        assert!(arbiter.active_ports().is_empty());
    }

    #[test]
    fn test_concurrent_acquire_has_single_winner() {
        let arbiter = Arc::new(PortArbiter::new());
        let barrier = Arc::new(Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let arbiter = Arc::clone(&arbiter);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    arbiter.acquire("COM7", OwnerToken::new()).is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    proptest! {
        #[test]
        fn prop_second_owner_blocked_until_release(name in "[A-Za-z0-9/._-]{1,24}") {
            let arbiter = PortArbiter::new();
            let a = OwnerToken::new();
            let b = OwnerToken::new();

            prop_assert!(arbiter.acquire(&name, a).is_ok());
            prop_assert_eq!(arbiter.acquire(&name, b), Err(UartError::PortBusy(name.clone())));
            arbiter.release(&name, a);
            prop_assert!(arbiter.acquire(&name, b).is_ok());
        }
    }
}
