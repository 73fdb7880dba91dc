//! Serial worker behaviour against in-memory devices.

mod common;

use common::{fast_worker_options, wait_until, Harness, WAIT};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uart_control::{
    PortArbiter, PortConfiguration, PortError, SerialTransport, SerialWorker, TransportFactory,
    UartError, WorkerEvent, WorkerOptions,
};

fn worker(harness: &Harness, options: WorkerOptions) -> SerialWorker {
    SerialWorker::with_backend(
        "CPU1",
        options,
        Arc::new(harness.factory.clone()),
        Arc::clone(&harness.arbiter),
    )
}

#[test]
fn test_ping_echo_end_to_end() {
    let harness = Harness::new();
    harness.echo_port("COM5");
    let worker = worker(&harness, fast_worker_options());
    let events = worker.subscribe_channel();

    worker.configure("COM5", 115_200).unwrap();
    worker.start().unwrap();
    assert!(worker.is_connected());
    assert_eq!(worker.port_name().as_deref(), Some("COM5"));
    assert_eq!(worker.baud_rate(), 115_200);

    assert!(worker.write(b"PING".to_vec()));
    let event = events.recv_timeout(WAIT).unwrap();
    assert_eq!(event, WorkerEvent::DataReceived(b"PING".to_vec()));

    worker.stop();
    assert!(!worker.is_connected());
}

#[test]
fn test_writes_keep_fifo_order_under_load() {
    let harness = Harness::new();
    let port = harness.silent_port("COM5");
    let mut options = fast_worker_options();
    options.write_queue_capacity = 1024;
    let worker = worker(&harness, options);

    worker.configure("COM5", 115_200).unwrap();
    worker.start().unwrap();

    let expected: Vec<Vec<u8>> = (0..200).map(|i| format!("cmd{i};").into_bytes()).collect();
    for payload in &expected {
        worker.write(payload.clone());
    }

    let total: usize = expected.iter().map(Vec::len).sum();
    assert!(wait_until(|| port.written_bytes().len() == total));
    assert_eq!(port.written_bytes(), expected.concat());
    worker.stop();
}

#[test]
fn test_overflow_keeps_most_recent_payloads() {
    let harness = Harness::new();
    let port = harness.silent_port("COM5");
    let mut options = fast_worker_options();
    options.write_queue_capacity = 3;
    let worker = worker(&harness, options);
    let events = worker.subscribe_channel();

    for payload in ["a", "b", "c", "d", "e"] {
        worker.write(payload.as_bytes().to_vec());
    }

    worker.configure("COM5", 115_200).unwrap();
    worker.start().unwrap();
    assert!(wait_until(|| port.written_bytes() == b"cde"));
    assert_eq!(
        events.recv_timeout(WAIT).unwrap(),
        WorkerEvent::QueueOverflow {
            capacity: 3,
            dropped_payloads: 2,
            dropped_bytes: 2
        }
    );
    worker.stop();
}

#[test]
fn test_flush_queue_discards_pending() {
    let harness = Harness::new();
    let worker = worker(&harness, fast_worker_options());
    worker.write(b"x".to_vec());
    worker.write(b"y".to_vec());
    assert_eq!(worker.flush_queue(), 2);
    assert_eq!(worker.queue_len(), 0);
}

#[test]
fn test_stop_latency_is_bounded_by_poll() {
    let harness = Harness::new();
    harness.silent_port("COM5");
    let mut options = fast_worker_options();
    options.port.timeout = Duration::from_millis(50);
    let worker = worker(&harness, options);

    worker.configure("COM5", 115_200).unwrap();
    worker.start().unwrap();
    std::thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    worker.stop();
    assert!(started.elapsed() < Duration::from_millis(400));
    assert!(!harness.arbiter.is_in_use("COM5"));
}

#[test]
fn test_stop_from_event_callback_does_not_hang() {
    let harness = Harness::new();
    let port = harness.silent_port("COM5");
    let worker = Arc::new(worker(&harness, fast_worker_options()));

    let weak = Arc::downgrade(&worker);
    worker.subscribe(move |event| {
        if let (WorkerEvent::DataReceived(_), Some(worker)) = (event, weak.upgrade()) {
            worker.stop();
        }
    });

    worker.configure("COM5", 115_200).unwrap();
    worker.start().unwrap();
    port.enqueue_read(b"bye\n");

    assert!(wait_until(|| !worker.is_running()));
    assert!(!harness.arbiter.is_in_use("COM5"));
    worker.stop();
}

#[test]
fn test_non_fatal_write_error_drops_payload() {
    let harness = Harness::new();
    let port = harness.silent_port("COM5");
    let worker = worker(&harness, fast_worker_options());
    let events = worker.subscribe_channel();

    worker.configure("COM5", 115_200).unwrap();
    port.fail_next_write(std::io::ErrorKind::PermissionDenied);
    worker.write(b"lost".to_vec());
    worker.write(b"kept".to_vec());
    worker.start().unwrap();

    let event = events.recv_timeout(WAIT).unwrap();
    assert!(matches!(event, WorkerEvent::Error(UartError::Io { .. })));
    assert!(wait_until(|| port.written_bytes() == b"kept"));
    assert!(worker.is_running());
    assert!(worker.last_error().is_some());
    worker.stop();
}

/// A device whose first read hangs far longer than the poll interval.
#[derive(Debug, Default)]
struct StallingDevice {
    stalled: AtomicBool,
    in_read: AtomicUsize,
    peak_readers: AtomicUsize,
}

#[derive(Debug)]
struct StallingPort {
    device: Arc<StallingDevice>,
}

impl SerialTransport for StallingPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        Ok(data.len())
    }

    fn read_bytes(&mut self, _buffer: &mut [u8]) -> Result<usize, PortError> {
        let device = &self.device;
        let readers = device.in_read.fetch_add(1, Ordering::SeqCst) + 1;
        device.peak_readers.fetch_max(readers, Ordering::SeqCst);
        let pause = if device.stalled.swap(true, Ordering::SeqCst) {
            Duration::from_millis(10)
        } else {
            Duration::from_millis(300)
        };
        std::thread::sleep(pause);
        device.in_read.fetch_sub(1, Ordering::SeqCst);
        Err(PortError::timeout(pause))
    }

    fn name(&self) -> &str {
        "COM5"
    }

    fn set_timeout(&mut self, _timeout: Duration) -> Result<(), PortError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct StallingFactory {
    device: Arc<StallingDevice>,
}

impl TransportFactory for StallingFactory {
    fn open(
        &self,
        _port_name: &str,
        _config: &PortConfiguration,
    ) -> Result<Box<dyn SerialTransport>, PortError> {
        Ok(Box::new(StallingPort {
            device: Arc::clone(&self.device),
        }))
    }
}

#[test]
fn test_detached_loop_keeps_port_until_it_exits() {
    let factory = Arc::new(StallingFactory::default());
    let device = Arc::clone(&factory.device);
    let arbiter = Arc::new(PortArbiter::new());
    let mut options = fast_worker_options();
    options.stop_timeout = Duration::from_millis(50);
    let worker = SerialWorker::with_backend("CPU1", options, factory, Arc::clone(&arbiter));

    worker.configure("COM5", 115_200).unwrap();
    worker.start().unwrap();
    assert!(wait_until(|| device.in_read.load(Ordering::SeqCst) == 1));

    let started = Instant::now();
    worker.stop();
    assert!(started.elapsed() < Duration::from_millis(250));
    assert!(!worker.is_running());
    assert!(arbiter.is_in_use("COM5"));
    assert!(matches!(worker.start(), Err(UartError::InvalidState(_))));

    assert!(wait_until(|| worker.start().is_ok()));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(device.peak_readers.load(Ordering::SeqCst), 1);
    assert_eq!(arbiter.owner_of("COM5"), Some(worker.token()));

    worker.stop();
    assert!(!arbiter.is_in_use("COM5"));
}

