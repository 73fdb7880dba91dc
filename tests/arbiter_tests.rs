//! Port ownership across workers and the process-wide registry.

mod common;

use common::{fast_worker_options, wait_until, Harness};
use serial_test::serial;
use std::sync::{Arc, Barrier};
use std::thread;
use uart_control::{OwnerToken, PortArbiter, SerialWorker, UartError};

#[test]
#[serial]
fn test_shared_registry_is_process_wide() {
    let arbiter = PortArbiter::shared();
    arbiter.reset();

    let token = OwnerToken::new();
    PortArbiter::shared().acquire("COM5", token).unwrap();
    assert!(arbiter.is_in_use("COM5"));
    assert!(arbiter.active_ports().contains("COM5"));

    PortArbiter::shared().reset();
    assert!(!arbiter.is_in_use("COM5"));
}

#[test]
#[serial]
fn test_reset_frees_ports_held_by_anyone() {
    let arbiter = PortArbiter::shared();
    arbiter.reset();
    arbiter.acquire("COM1", OwnerToken::new()).unwrap();
    arbiter.acquire("COM2", OwnerToken::new()).unwrap();
    assert_eq!(arbiter.active_ports().len(), 2);

    arbiter.reset();
    assert!(arbiter.active_ports().is_empty());
}

#[test]
fn test_racing_workers_open_port_once() {
    let harness = Harness::new();
    harness.silent_port("COM5");

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let worker = SerialWorker::with_backend(
                format!("W{i}"),
                fast_worker_options(),
                Arc::new(harness.factory.clone()),
                Arc::clone(&harness.arbiter),
            );
            worker.configure("COM5", 115_200).unwrap();
            Arc::new(worker)
        })
        .collect();

    let barrier = Arc::new(Barrier::new(workers.len()));
    let handles: Vec<_> = workers
        .iter()
        .map(|worker| {
            let worker = Arc::clone(worker);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                worker.start()
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| *e == UartError::PortBusy("COM5".into())));
    assert_eq!(harness.factory.open_count("COM5"), 1);

    for worker in &workers {
        worker.stop();
    }
    assert!(!harness.arbiter.is_in_use("COM5"));
}

#[test]
fn test_dead_worker_does_not_hold_port() {
    let harness = Harness::new();
    let port = harness.silent_port("COM5");

    let worker = SerialWorker::with_backend(
        "CPU1",
        fast_worker_options(),
        Arc::new(harness.factory.clone()),
        Arc::clone(&harness.arbiter),
    );
    worker.configure("COM5", 115_200).unwrap();
    worker.start().unwrap();
    assert_eq!(
        harness.arbiter.owner_of("COM5"),
        Some(worker.token())
    );

    port.disconnect();
    assert!(wait_until(|| !harness.arbiter.is_in_use("COM5")));
    assert!(!worker.is_running());
}
