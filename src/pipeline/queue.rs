//! Bounded signal queue
//!
//! A fixed-capacity ring buffer shared by every producer and consumer thread
//! of one pipeline edge. Besides the items, the queue counts the producers
//! that are still registered on it. That count is what lets a consumer tell
//! "temporarily empty" apart from "nothing will ever arrive again":
//!
//! ```text
//!   producers ──enqueue──▶ ┌───┬───┬───┬───┐ ──dequeue──▶ consumers
//!   (leases)               │ 3 │ 4 │   │   │              (leases)
//!                          └───┴───┴───┴───┘
//!                          out=3     in=5   producers=2
//! ```
//!
//! `dequeue` blocks while the buffer is empty and at least one producer is
//! registered. Once the last producer unregisters and the buffer drains,
//! every waiting and future `dequeue` returns [`Dequeued::EndOfStream`].
//!
//! All state lives behind one mutex and one condition variable. Every
//! transition that could unblock a waiter uses `notify_all`, because
//! producers blocked on a full buffer and consumers blocked on an empty one
//! wait on the same condition.
//!
//! Producers and consumers normally hold a [`ProducerLease`] or
//! [`ConsumerLease`]. Leases register on creation and unregister on drop, so
//! a worker that returns early or panics still releases its registration.

use crate::error::QueueError;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, trace};

/// Outcome of a dequeue
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Dequeued<T> {
    /// The oldest item in the queue
    Item(T),

    /// The queue is empty and no producer remains registered
    EndOfStream,
}

impl<T> Dequeued<T> {
    /// Convert into an `Option`, mapping end-of-stream to `None`
    pub fn into_item(self) -> Option<T> {
        match self {
            Dequeued::Item(item) => Some(item),
            Dequeued::EndOfStream => None,
        }
    }

    /// Returns true if this is the end-of-stream signal
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Dequeued::EndOfStream)
    }
}

/// Statistics for a queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total items enqueued
    pub enqueued: AtomicU64,

    /// Total items dequeued
    pub dequeued: AtomicU64,

    /// Number of enqueues that had to wait for space
    pub full_waits: AtomicU64,

    /// Number of dequeues that had to wait for an item
    pub empty_waits: AtomicU64,

    /// Largest size observed
    pub peak_size: AtomicUsize,
}

impl QueueStats {
    /// Get total items enqueued
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Get total items dequeued
    pub fn dequeued(&self) -> u64 {
        self.dequeued.load(Ordering::Relaxed)
    }

    /// Get the number of times a producer blocked on a full queue
    pub fn full_waits(&self) -> u64 {
        self.full_waits.load(Ordering::Relaxed)
    }

    /// Get the number of times a consumer blocked on an empty queue
    pub fn empty_waits(&self) -> u64 {
        self.empty_waits.load(Ordering::Relaxed)
    }

    /// Get the peak number of buffered items
    pub fn peak_size(&self) -> usize {
        self.peak_size.load(Ordering::Relaxed)
    }
}

/// State guarded by the queue mutex
struct Ring<T> {
    slots: Box<[Option<T>]>,

    /// Logical tail; the next write goes to `in_count % capacity`
    in_count: u64,

    /// Logical head; the next read comes from `out_count % capacity`
    out_count: u64,

    producers: usize,
    consumers: usize,
    abandoned: bool,
}

impl<T> Ring<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            in_count: 0,
            out_count: 0,
            producers: 0,
            consumers: 0,
            abandoned: false,
        }
    }

    fn len(&self) -> usize {
        (self.in_count - self.out_count) as usize
    }

    fn is_full(&self) -> bool {
        self.len() == self.slots.len()
    }

    fn slot(&self, counter: u64) -> usize {
        (counter % self.slots.len() as u64) as usize
    }

    fn push(&mut self, item: T) {
        let idx = self.slot(self.in_count);
        debug_assert!(self.slots[idx].is_none());
        self.slots[idx] = Some(item);
        self.in_count += 1;
    }

    fn pop(&mut self) -> Option<T> {
        if self.len() == 0 {
            return None;
        }
        let idx = self.slot(self.out_count);
        let item = self.slots[idx].take();
        self.out_count += 1;
        item
    }
}

/// Fixed-capacity blocking queue with producer-count termination
pub struct BoundedSignalQueue<T> {
    /// Name used in logs and errors
    name: &'static str,

    /// Fixed capacity
    capacity: usize,

    /// Ring buffer, counters and registrations
    state: Mutex<Ring<T>>,

    /// Broadcast on every transition that could unblock a waiter
    changed: Condvar,

    /// Queue statistics
    stats: QueueStats,
}

impl<T> BoundedSignalQueue<T> {
    /// Create a new queue with the specified capacity
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. A zero-slot ring would block every
    /// enqueue forever; configuration validation rejects it first.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        assert!(capacity > 0, "queue '{}' needs a capacity of at least 1", name);

        Self {
            name,
            capacity,
            state: Mutex::new(Ring::with_capacity(capacity)),
            changed: Condvar::new(),
            stats: QueueStats::default(),
        }
    }

    /// Append an item, blocking while the queue is full
    ///
    /// Fails only if the queue was abandoned by its consumers, in which case
    /// the item is dropped.
    pub fn enqueue(&self, item: T) -> Result<(), QueueError> {
        let mut ring = self.state.lock();

        if ring.is_full() && !ring.abandoned {
            self.stats.full_waits.fetch_add(1, Ordering::Relaxed);
            while ring.is_full() && !ring.abandoned {
                self.changed.wait(&mut ring);
            }
        }

        if ring.abandoned {
            return Err(QueueError::Abandoned { queue: self.name });
        }

        ring.push(item);
        let len = ring.len();
        drop(ring);

        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        self.stats.peak_size.fetch_max(len, Ordering::Relaxed);
        self.changed.notify_all();
        Ok(())
    }

    /// Remove the oldest item, blocking while the queue is empty and
    /// producers remain registered
    pub fn dequeue(&self) -> Dequeued<T> {
        let mut ring = self.state.lock();
        let mut waited = false;

        loop {
            if let Some(item) = ring.pop() {
                drop(ring);
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                self.changed.notify_all();
                return Dequeued::Item(item);
            }

            if ring.producers == 0 {
                trace!(queue = self.name, "End of stream");
                return Dequeued::EndOfStream;
            }

            if !waited {
                self.stats.empty_waits.fetch_add(1, Ordering::Relaxed);
                waited = true;
            }

            // Spurious wakeups land back here and re-check both conditions
            self.changed.wait(&mut ring);
        }
    }

    /// Remove the oldest item without blocking
    ///
    /// Returns `None` if the call would have blocked (empty queue with
    /// producers still registered).
    pub fn try_dequeue(&self) -> Option<Dequeued<T>> {
        let mut ring = self.state.lock();

        if let Some(item) = ring.pop() {
            drop(ring);
            self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
            self.changed.notify_all();
            return Some(Dequeued::Item(item));
        }

        if ring.producers == 0 {
            Some(Dequeued::EndOfStream)
        } else {
            None
        }
    }

    /// Register a producer. Must precede the producer's first enqueue.
    pub fn register_producer(&self) {
        let mut ring = self.state.lock();
        ring.producers += 1;
        trace!(queue = self.name, producers = ring.producers, "Producer registered");
    }

    /// Unregister a producer, waking every waiter when the last one leaves
    pub fn unregister_producer(&self) -> Result<(), QueueError> {
        let mut ring = self.state.lock();
        if ring.producers == 0 {
            return Err(QueueError::ProducerUnderflow { queue: self.name });
        }

        ring.producers -= 1;
        let remaining = ring.producers;
        drop(ring);

        trace!(queue = self.name, producers = remaining, "Producer unregistered");
        if remaining == 0 {
            self.changed.notify_all();
        }
        Ok(())
    }

    /// Register a consumer
    pub fn register_consumer(&self) {
        let mut ring = self.state.lock();
        ring.consumers += 1;
    }

    /// Unregister a consumer; the queue is abandoned when the last one leaves
    pub fn unregister_consumer(&self) -> Result<(), QueueError> {
        let mut ring = self.state.lock();
        if ring.consumers == 0 {
            return Err(QueueError::ConsumerUnderflow { queue: self.name });
        }

        ring.consumers -= 1;
        let remaining = ring.consumers;
        if remaining == 0 {
            ring.abandoned = true;
        }
        drop(ring);

        if remaining == 0 {
            trace!(queue = self.name, "Last consumer left, queue abandoned");
            self.changed.notify_all();
        }
        Ok(())
    }

    /// Mark the queue as having no consumers
    ///
    /// Blocked and future enqueues fail with [`QueueError::Abandoned`].
    pub fn abandon(&self) {
        self.state.lock().abandoned = true;
        self.changed.notify_all();
    }

    /// Current number of buffered items
    pub fn size(&self) -> usize {
        self.state.lock().len()
    }

    /// Fixed capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Number of registered producers
    pub fn producers(&self) -> usize {
        self.state.lock().producers
    }

    /// Number of registered consumers
    pub fn consumers(&self) -> usize {
        self.state.lock().consumers
    }

    /// Check if the queue has been abandoned by its consumers
    pub fn is_abandoned(&self) -> bool {
        self.state.lock().abandoned
    }

    /// Queue name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Queue statistics
    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    /// Acquire a producer lease on this queue
    pub fn producer(self: &Arc<Self>) -> ProducerLease<T> {
        ProducerLease::acquire(self)
    }

    /// Acquire a consumer lease on this queue
    pub fn consumer(self: &Arc<Self>) -> ConsumerLease<T> {
        ConsumerLease::acquire(self)
    }
}

impl<T> fmt::Debug for BoundedSignalQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ring = self.state.lock();
        f.debug_struct("BoundedSignalQueue")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("size", &ring.len())
            .field("producers", &ring.producers)
            .field("consumers", &ring.consumers)
            .field("abandoned", &ring.abandoned)
            .finish()
    }
}

/// Producer registration held for the duration of a worker's productive work
pub struct ProducerLease<T> {
    queue: Arc<BoundedSignalQueue<T>>,
}

impl<T> ProducerLease<T> {
    /// Register as a producer on `queue`
    pub fn acquire(queue: &Arc<BoundedSignalQueue<T>>) -> Self {
        queue.register_producer();
        Self {
            queue: Arc::clone(queue),
        }
    }

    /// Enqueue an item, blocking while the queue is full
    pub fn enqueue(&self, item: T) -> Result<(), QueueError> {
        self.queue.enqueue(item)
    }

    /// The queue this lease is registered on
    pub fn queue(&self) -> &BoundedSignalQueue<T> {
        &self.queue
    }
}

impl<T> Drop for ProducerLease<T> {
    fn drop(&mut self) {
        if let Err(e) = self.queue.unregister_producer() {
            error!(error = %e, "Producer lease released twice");
        }
    }
}

/// Consumer registration; the last one to drop abandons the queue
pub struct ConsumerLease<T> {
    queue: Arc<BoundedSignalQueue<T>>,
}

impl<T> ConsumerLease<T> {
    /// Register as a consumer on `queue`
    pub fn acquire(queue: &Arc<BoundedSignalQueue<T>>) -> Self {
        queue.register_consumer();
        Self {
            queue: Arc::clone(queue),
        }
    }

    /// Dequeue the next item, blocking while producers remain
    pub fn dequeue(&self) -> Dequeued<T> {
        self.queue.dequeue()
    }

    /// Dequeue without blocking
    pub fn try_dequeue(&self) -> Option<Dequeued<T>> {
        self.queue.try_dequeue()
    }

    /// Iterate over items until end-of-stream
    pub fn iter(&self) -> Drain<'_, T> {
        Drain { lease: self }
    }

    /// The queue this lease is registered on
    pub fn queue(&self) -> &BoundedSignalQueue<T> {
        &self.queue
    }
}

impl<T> Drop for ConsumerLease<T> {
    fn drop(&mut self) {
        if let Err(e) = self.queue.unregister_consumer() {
            error!(error = %e, "Consumer lease released twice");
        }
    }
}

/// Blocking iterator over a queue, ending at end-of-stream
pub struct Drain<'a, T> {
    lease: &'a ConsumerLease<T>,
}

impl<T> Iterator for Drain<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.lease.dequeue().into_item()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_queue_basic() {
        let queue = Arc::new(BoundedSignalQueue::new("test", 4));
        let producer = queue.producer();

        producer.enqueue("/a").unwrap();
        producer.enqueue("/b").unwrap();
        assert_eq!(queue.size(), 2);
        assert_eq!(queue.capacity(), 4);
        assert!(!queue.is_empty());

        assert_eq!(queue.dequeue(), Dequeued::Item("/a"));
        assert_eq!(queue.dequeue(), Dequeued::Item("/b"));
        assert!(queue.is_empty());

        drop(producer);
        assert!(queue.dequeue().is_end_of_stream());
    }

    #[test]
    fn test_no_producers_is_end_of_stream() {
        let queue: BoundedSignalQueue<u32> = BoundedSignalQueue::new("empty", 2);
        assert_eq!(queue.producers(), 0);
        assert_eq!(queue.dequeue(), Dequeued::EndOfStream);
        assert_eq!(queue.try_dequeue(), Some(Dequeued::EndOfStream));
    }

    #[test]
    fn test_try_dequeue_would_block() {
        let queue = Arc::new(BoundedSignalQueue::new("pending", 2));
        let producer = queue.producer();

        // Empty with a producer registered: would block, not end-of-stream
        assert_eq!(queue.try_dequeue(), None);

        producer.enqueue(1).unwrap();
        assert_eq!(queue.try_dequeue(), Some(Dequeued::Item(1)));

        drop(producer);
        assert_eq!(queue.try_dequeue(), Some(Dequeued::EndOfStream));
    }

    #[test]
    fn test_items_outlive_producers() {
        let queue = Arc::new(BoundedSignalQueue::new("drain", 3));
        {
            let producer = queue.producer();
            producer.enqueue(1).unwrap();
            producer.enqueue(2).unwrap();
        }

        // No producers left, but buffered items still come out first
        assert_eq!(queue.producers(), 0);
        assert_eq!(queue.dequeue(), Dequeued::Item(1));
        assert_eq!(queue.dequeue(), Dequeued::Item(2));
        assert_eq!(queue.dequeue(), Dequeued::EndOfStream);
    }

    #[test]
    fn test_capacity_two_three_items() {
        let queue = Arc::new(BoundedSignalQueue::new("abc", 2));
        let producer = queue.producer();

        let handle = thread::spawn(move || {
            for item in ["A", "B", "C"] {
                producer.enqueue(item).unwrap();
            }
        });

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(queue.dequeue());
        }
        handle.join().unwrap();

        assert_eq!(
            seen,
            vec![
                Dequeued::Item("A"),
                Dequeued::Item("B"),
                Dequeued::Item("C"),
                Dequeued::EndOfStream,
            ]
        );
    }

    #[test]
    fn test_wraparound_fifo() {
        let queue = Arc::new(BoundedSignalQueue::new("wrap", 3));
        let producer = queue.producer();

        let handle = thread::spawn(move || {
            for i in 0..1000u32 {
                producer.enqueue(i).unwrap();
            }
        });

        let consumer = queue.consumer();
        let received: Vec<u32> = consumer.iter().collect();
        handle.join().unwrap();

        assert_eq!(received, (0..1000).collect::<Vec<_>>());
        assert!(queue.stats().peak_size() <= queue.capacity());
    }

    #[test]
    fn test_capacity_invariant_under_contention() {
        let queue = Arc::new(BoundedSignalQueue::new("bounded", 4));
        let mut handles = Vec::new();

        for p in 0..4u32 {
            let producer = queue.producer();
            handles.push(thread::spawn(move || {
                for i in 0..250u32 {
                    producer.enqueue(p * 1000 + i).unwrap();
                    assert!(producer.queue().size() <= producer.queue().capacity());
                }
            }));
        }

        let mut consumers = Vec::new();
        for _ in 0..3 {
            let consumer = queue.consumer();
            consumers.push(thread::spawn(move || {
                let mut count = 0usize;
                for _ in consumer.iter() {
                    assert!(consumer.queue().size() <= consumer.queue().capacity());
                    count += 1;
                }
                count
            }));
        }

        for h in handles {
            h.join().unwrap();
        }
        let total: usize = consumers.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(total, 1000);
        assert_eq!(queue.stats().enqueued(), 1000);
        assert_eq!(queue.stats().dequeued(), 1000);
        assert!(queue.stats().peak_size() <= 4);
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn test_per_producer_order_preserved() {
        let queue = Arc::new(BoundedSignalQueue::new("interleave", 2));
        let mut handles = Vec::new();

        for p in 0..3usize {
            let producer = queue.producer();
            handles.push(thread::spawn(move || {
                for i in 0..100usize {
                    producer.enqueue((p, i)).unwrap();
                }
            }));
        }

        let mut last = [None::<usize>; 3];
        while let Dequeued::Item((p, i)) = queue.dequeue() {
            if let Some(prev) = last[p] {
                assert!(i > prev, "producer {} went backwards: {} after {}", p, i, prev);
            }
            last[p] = Some(i);
        }

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(last, [Some(99), Some(99), Some(99)]);
    }

    #[test]
    fn test_last_unregister_wakes_all_consumers() {
        let queue: Arc<BoundedSignalQueue<u32>> = Arc::new(BoundedSignalQueue::new("wake", 2));
        let producers: Vec<_> = (0..3).map(|_| queue.producer()).collect();
        assert_eq!(queue.producers(), 3);

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.dequeue())
            })
            .collect();

        thread::sleep(Duration::from_millis(50));

        // Release in an order unrelated to registration
        let mut producers = producers;
        drop(producers.remove(1));
        drop(producers.remove(0));
        assert_eq!(queue.producers(), 1);
        drop(producers);

        for w in waiters {
            assert_eq!(w.join().unwrap(), Dequeued::EndOfStream);
        }
        assert_eq!(queue.producers(), 0);
    }

    #[test]
    fn test_register_unregister_from_many_threads() {
        let queue: Arc<BoundedSignalQueue<u32>> = Arc::new(BoundedSignalQueue::new("count", 1));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for _ in 0..100 {
                        queue.register_producer();
                        queue.unregister_producer().unwrap();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(queue.producers(), 0);
        assert_eq!(queue.dequeue(), Dequeued::EndOfStream);
    }

    #[test]
    fn test_producer_underflow() {
        let queue: BoundedSignalQueue<u32> = BoundedSignalQueue::new("underflow", 1);
        queue.register_producer();
        queue.unregister_producer().unwrap();

        let err = queue.unregister_producer().unwrap_err();
        assert_eq!(err, QueueError::ProducerUnderflow { queue: "underflow" });
        assert_eq!(queue.producers(), 0);

        assert!(matches!(
            queue.unregister_consumer(),
            Err(QueueError::ConsumerUnderflow { .. })
        ));
    }

    #[test]
    fn test_panicking_producer_releases_lease() {
        let queue = Arc::new(BoundedSignalQueue::new("panic", 2));
        let producer = queue.producer();

        let result = thread::spawn(move || {
            producer.enqueue(1u32).unwrap();
            panic!("worker failed mid-stream");
        })
        .join();

        assert!(result.is_err());
        assert_eq!(queue.producers(), 0);
        assert_eq!(queue.dequeue(), Dequeued::Item(1));
        assert_eq!(queue.dequeue(), Dequeued::EndOfStream);
    }

    #[test]
    fn test_last_consumer_abandons_queue() {
        let queue = Arc::new(BoundedSignalQueue::new("abandon", 1));
        let consumer = queue.consumer();
        let producer = queue.producer();

        producer.enqueue(1u32).unwrap();
        let blocked = thread::spawn(move || producer.enqueue(2));

        thread::sleep(Duration::from_millis(20));
        drop(consumer);

        assert_eq!(
            blocked.join().unwrap(),
            Err(QueueError::Abandoned { queue: "abandon" })
        );
        assert!(queue.is_abandoned());
    }

    #[test]
    fn test_abandon_without_consumers() {
        let queue = Arc::new(BoundedSignalQueue::new("unread", 2));
        let producer = queue.producer();

        queue.abandon();
        assert!(producer.enqueue(1u32).is_err());
        assert_eq!(queue.size(), 0);
        assert_eq!(queue.stats().enqueued(), 0);
    }

    #[test]
    fn test_queue_stats() {
        let queue = Arc::new(BoundedSignalQueue::new("stats", 1));
        let producer = queue.producer();

        producer.enqueue(1u32).unwrap();
        let handle = thread::spawn(move || producer.enqueue(2).unwrap());

        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.dequeue(), Dequeued::Item(1));
        handle.join().unwrap();
        assert_eq!(queue.dequeue(), Dequeued::Item(2));
        assert_eq!(queue.dequeue(), Dequeued::EndOfStream);

        let stats = queue.stats();
        assert_eq!(stats.enqueued(), 2);
        assert_eq!(stats.dequeued(), 2);
        assert_eq!(stats.peak_size(), 1);
    }

    #[test]
    #[should_panic(expected = "capacity of at least 1")]
    fn test_zero_capacity_rejected() {
        let _queue: BoundedSignalQueue<u32> = BoundedSignalQueue::new("zero", 0);
    }

    #[test]
    fn test_dequeued_helpers() {
        assert_eq!(Dequeued::Item(5).into_item(), Some(5));
        assert_eq!(Dequeued::<u8>::EndOfStream.into_item(), None);
        assert!(!Dequeued::Item(()).is_end_of_stream());
    }
}
