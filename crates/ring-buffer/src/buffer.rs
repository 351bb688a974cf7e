//! Bounded, mutex-guarded FIFO ring buffer with overflow accounting.
//!
//! Every producer-visible operation (`offer`, `poll`, `poll_batch`, `drain`)
//! takes the same internal mutex; the `offered`/`dropped` lifetime counters
//! are atomics so a reader never needs the lock just to check them.

use crate::config::{BufferConfig, OverflowPolicy};
use crate::invariants;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Receives items evicted or rejected by an `offer` that overflowed the
/// buffer. Runs under the buffer's lock — implementations must be
/// non-blocking and must not re-enter the same buffer.
pub trait OverflowSink<T>: Send + Sync {
    fn on_overflow(&self, item: T);
}

impl<T, F> OverflowSink<T> for F
where
    F: Fn(T) + Send + Sync,
{
    fn on_overflow(&self, item: T) {
        self(item)
    }
}

struct Inner<T> {
    items: VecDeque<T>,
    last_flush_at: Instant,
}

/// A fixed-capacity FIFO queue for one telemetry category.
pub struct RingBuffer<T> {
    inner: Mutex<Inner<T>>,
    config: BufferConfig,
    offered: AtomicU64,
    dropped: AtomicU64,
    on_overflow: Box<dyn OverflowSink<T>>,
}

impl<T> RingBuffer<T> {
    /// Creates a buffer with the given configuration. `on_overflow` is
    /// invoked once per evicted or rejected item, under the buffer's lock.
    pub fn new(config: BufferConfig, on_overflow: impl OverflowSink<T> + 'static) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(config.capacity),
                last_flush_at: Instant::now(),
            }),
            config,
            offered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            on_overflow: Box::new(on_overflow),
        }
    }

    /// Maximum number of items this buffer may hold.
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Current number of items in the buffer.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    /// True if the buffer currently holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lifetime count of items offered to this buffer.
    pub fn offered(&self) -> u64 {
        self.offered.load(Ordering::Relaxed)
    }

    /// Lifetime count of items dropped (evicted or rejected) by this buffer.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Offers an item. Returns `true` if it was accepted — either because
    /// there was room, or because `drop_oldest` evicted the head to make
    /// room. Returns `false` only under `drop_newest` when the buffer was
    /// already full, in which case `item` itself was passed to the overflow
    /// sink instead of being stored.
    pub fn offer(&self, item: T) -> bool {
        self.offered.fetch_add(1, Ordering::Relaxed);

        let accepted = {
            let mut inner = self.inner.lock().unwrap();
            if inner.items.len() < self.config.capacity {
                inner.items.push_back(item);
                true
            } else {
                match self.config.overflow_policy {
                    OverflowPolicy::DropOldest => {
                        let evicted = inner.items.pop_front();
                        inner.items.push_back(item);
                        if let Some(evicted) = evicted {
                            self.dropped.fetch_add(1, Ordering::Relaxed);
                            self.on_overflow.on_overflow(evicted);
                        }
                        true
                    }
                    OverflowPolicy::DropNewest => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        self.on_overflow.on_overflow(item);
                        false
                    }
                }
            }
        };

        invariants::assert_bounded(self.len(), self.config.capacity);
        invariants::assert_dropped_le_offered(self.offered(), self.dropped());
        accepted
    }

    /// Removes and returns the head item, if any.
    pub fn poll(&self) -> Option<T> {
        self.inner.lock().unwrap().items.pop_front()
    }

    /// Removes and returns up to `max` items from the head, in FIFO order.
    pub fn poll_batch(&self, max: usize) -> Vec<T> {
        let mut inner = self.inner.lock().unwrap();
        let n = max.min(inner.items.len());
        inner.items.drain(..n).collect()
    }

    /// Removes and returns every item currently in the buffer.
    pub fn drain(&self) -> Vec<T> {
        self.inner.lock().unwrap().items.drain(..).collect()
    }

    /// True iff the buffer holds enough items, or has held at least one
    /// item for at least `max_age`, to justify a flush.
    pub fn is_ready_to_flush(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        Self::ready(&self.config, &inner)
    }

    /// If ready to flush, atomically drains up to `batch_size` items and
    /// resets the flush clock. Returns an empty vector otherwise.
    pub fn poll_if_ready(&self) -> Vec<T> {
        let mut inner = self.inner.lock().unwrap();
        if !Self::ready(&self.config, &inner) {
            return Vec::new();
        }
        let n = inner.items.len().min(self.config.batch_size.max(1));
        let items: Vec<T> = inner.items.drain(..n).collect();
        inner.last_flush_at = Instant::now();
        items
    }

    fn ready(config: &BufferConfig, inner: &Inner<T>) -> bool {
        let size = inner.items.len();
        if size == 0 {
            return false;
        }
        size >= config.batch_size
            || (!config.max_age.is_zero() && inner.last_flush_at.elapsed() >= config.max_age)
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Returns a copy of the head item without removing it.
    pub fn peek(&self) -> Option<T> {
        self.inner.lock().unwrap().items.front().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn counting_sink() -> (impl OverflowSink<i32>, std::sync::Arc<StdMutex<Vec<i32>>>) {
        let dropped = std::sync::Arc::new(StdMutex::new(Vec::new()));
        let captured = dropped.clone();
        (move |item| captured.lock().unwrap().push(item), dropped)
    }

    #[test]
    fn offer_accepts_until_capacity() {
        let (sink, _dropped) = counting_sink();
        let config = BufferConfig {
            capacity: 2,
            ..BufferConfig::default()
        };
        let buf = RingBuffer::new(config, sink);
        assert!(buf.offer(1));
        assert!(buf.offer(2));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn drop_oldest_evicts_head_and_keeps_newest() {
        let (sink, dropped) = counting_sink();
        let config = BufferConfig {
            capacity: 2,
            overflow_policy: OverflowPolicy::DropOldest,
            ..BufferConfig::default()
        };
        let buf = RingBuffer::new(config, sink);
        assert!(buf.offer(1));
        assert!(buf.offer(2));
        assert!(buf.offer(3));

        assert_eq!(buf.drain(), vec![2, 3]);
        assert_eq!(*dropped.lock().unwrap(), vec![1]);
        assert_eq!(buf.offered(), 3);
        assert_eq!(buf.dropped(), 1);
    }

    #[test]
    fn drop_newest_rejects_incoming_item() {
        let (sink, dropped) = counting_sink();
        let config = BufferConfig {
            capacity: 2,
            overflow_policy: OverflowPolicy::DropNewest,
            ..BufferConfig::default()
        };
        let buf = RingBuffer::new(config, sink);
        assert!(buf.offer(1));
        assert!(buf.offer(2));
        assert!(!buf.offer(3));

        assert_eq!(buf.drain(), vec![1, 2]);
        assert_eq!(*dropped.lock().unwrap(), vec![3]);
    }

    #[test]
    fn ready_by_batch_size() {
        let (sink, _) = counting_sink();
        let config = BufferConfig {
            capacity: 10,
            batch_size: 3,
            ..BufferConfig::default()
        };
        let buf = RingBuffer::new(config, sink);
        buf.offer(1);
        buf.offer(2);
        assert!(!buf.is_ready_to_flush());
        buf.offer(3);
        assert!(buf.is_ready_to_flush());
        assert_eq!(buf.poll_if_ready(), vec![1, 2, 3]);
        assert!(!buf.is_ready_to_flush());
    }

    #[test]
    fn ready_by_max_age() {
        use std::time::Duration;
        let (sink, _) = counting_sink();
        let config = BufferConfig {
            capacity: 10,
            batch_size: 100,
            max_age: Duration::from_millis(20),
            ..BufferConfig::default()
        };
        let buf = RingBuffer::new(config, sink);
        buf.offer(1);
        assert!(!buf.is_ready_to_flush());
        std::thread::sleep(Duration::from_millis(30));
        assert!(buf.is_ready_to_flush());
        assert_eq!(buf.poll_if_ready(), vec![1]);
    }

    #[test]
    fn peek_does_not_remove() {
        let (sink, _) = counting_sink();
        let buf = RingBuffer::new(BufferConfig::default(), sink);
        buf.offer(42);
        assert_eq!(buf.peek(), Some(42));
        assert_eq!(buf.len(), 1);
    }
}
