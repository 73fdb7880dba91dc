//! Bounded outbound FIFO.
//!
//! When full, the oldest payload is evicted to admit the new one. Evictions
//! are tallied until the I/O loop collects them, so producers never run
//! observers.

use parking_lot::Mutex;
use std::collections::VecDeque;

/// Payloads evicted since the tally was last taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Overflow {
    pub payloads: usize,
    pub bytes: usize,
}

#[derive(Debug, Default)]
struct Slots {
    items: VecDeque<Vec<u8>>,
    evicted: Overflow,
}

#[derive(Debug)]
pub struct WriteQueue {
    slots: Mutex<Slots>,
    capacity: usize,
}

impl WriteQueue {
    /// A queue holding at most `capacity` payloads (minimum one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Mutex::new(Slots {
                items: VecDeque::with_capacity(capacity.min(1024)),
                evicted: Overflow::default(),
            }),
            capacity,
        }
    }

    /// Append a payload, returning the evicted oldest payload on overflow.
    pub fn push(&self, payload: Vec<u8>) -> Option<Vec<u8>> {
        let mut slots = self.slots.lock();
        let evicted = if slots.items.len() >= self.capacity {
            slots.items.pop_front()
        } else {
            None
        };
        if let Some(dropped) = &evicted {
            slots.evicted.payloads += 1;
            slots.evicted.bytes += dropped.len();
        }
        slots.items.push_back(payload);
        evicted
    }

    /// Take every queued payload in FIFO order.
    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.slots.lock().items.drain(..).collect()
    }

    /// Collect and zero the eviction tally; `None` if nothing was dropped.
    pub fn take_overflow(&self) -> Option<Overflow> {
        let mut slots = self.slots.lock();
        if slots.evicted.payloads == 0 {
            return None;
        }
        Some(std::mem::take(&mut slots.evicted))
    }

    /// Discard all payloads, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut slots = self.slots.lock();
        let count = slots.items.len();
        slots.items.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.slots.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = WriteQueue::new(8);
        queue.push(b"one".to_vec());
        queue.push(b"two".to_vec());
        assert_eq!(queue.drain(), vec![b"one".to_vec(), b"two".to_vec()]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let queue = WriteQueue::new(2);
        assert_eq!(queue.push(b"a".to_vec()), None);
        assert_eq!(queue.push(b"b".to_vec()), None);
        assert_eq!(queue.push(b"c".to_vec()), Some(b"a".to_vec()));
        assert_eq!(queue.drain(), vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_overflow_tally_is_taken_once() {
        let queue = WriteQueue::new(1);
        assert_eq!(queue.take_overflow(), None);

        queue.push(b"aa".to_vec());
        queue.push(b"bbb".to_vec());
        queue.push(b"c".to_vec());
        assert_eq!(
            queue.take_overflow(),
            Some(Overflow {
                payloads: 2,
                bytes: 5
            })
        );
        assert_eq!(queue.take_overflow(), None);
        assert_eq!(queue.drain(), vec![b"c".to_vec()]);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let queue = WriteQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.push(b"x".to_vec());
        assert_eq!(queue.push(b"y".to_vec()), Some(b"x".to_vec()));
    }

    #[test]
    fn test_clear_reports_count() {
        let queue = WriteQueue::new(4);
        queue.push(vec![1]);
        queue.push(vec![2]);
        assert_eq!(queue.clear(), 2);
        assert_eq!(queue.len(), 0);
    }
}
