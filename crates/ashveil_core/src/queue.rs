//! # Drain Queues
//!
//! The single synchronization primitive between the network threads and the
//! simulation thread: many producers push, one consumer swaps the whole
//! backlog out at tick start.
//!
//! ## Contract
//!
//! - `push` may be called from any thread.
//! - `drain` atomically returns every pushed-but-not-yet-drained item in FIFO
//!   order and leaves the queue empty.
//! - `len` / `is_empty` reflect a recent state; no stronger guarantee.

use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;

/// Multi-producer, swap-drain queue.
///
/// Clones share the same backlog, so a clone is a producer handle that can be
/// handed to the network threads while the simulation thread keeps the
/// original for draining.
#[derive(Debug)]
pub struct DrainQueue<T> {
    items: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for DrainQueue<T> {
    fn clone(&self) -> Self {
        Self { items: Arc::clone(&self.items) }
    }
}

impl<T> Default for DrainQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DrainQueue<T> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self { items: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Appends an item to the backlog.
    pub fn push(&self, item: T) {
        self.items.lock().push(item);
    }

    /// Swaps the entire backlog out, leaving the queue empty.
    #[must_use]
    pub fn drain(&self) -> Vec<T> {
        mem::take(&mut *self.items.lock())
    }

    /// Current backlog depth.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether the backlog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn drain_returns_fifo_and_empties() {
        let queue = DrainQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);

        assert_eq!(queue.drain(), vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_on_empty_queue_is_empty() {
        let queue: DrainQueue<u32> = DrainQueue::new();
        assert!(queue.drain().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn clones_share_the_backlog() {
        let queue = DrainQueue::new();
        let producer = queue.clone();
        producer.push("hello");

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain(), vec!["hello"]);
        assert!(producer.is_empty());
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        let queue = DrainQueue::new();
        let handles: Vec<_> = (0..4)
            .map(|p| {
                let producer = queue.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        producer.push((p, i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let items = queue.drain();
        assert_eq!(items.len(), 400);
        // FIFO per producer.
        for p in 0..4 {
            let seen: Vec<u32> = items.iter().filter(|(q, _)| *q == p).map(|&(_, i)| i).collect();
            assert_eq!(seen, (0..100).collect::<Vec<_>>());
        }
    }
}
