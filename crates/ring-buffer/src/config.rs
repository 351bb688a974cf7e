use std::time::Duration;

/// What happens to an `offer` once the ring buffer is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the oldest item to make room for the new one.
    DropOldest,
    /// Reject the incoming item, leaving the buffer unchanged.
    DropNewest,
}

/// Configuration for a single category's ring buffer.
#[derive(Debug, Clone, Copy)]
pub struct BufferConfig {
    /// Maximum number of items the buffer may hold at once.
    pub capacity: usize,
    /// What to do when `offer` is called on a full buffer.
    pub overflow_policy: OverflowPolicy,
    /// Minimum size that makes the buffer ready to flush.
    pub batch_size: usize,
    /// Maximum time since the last flush before the buffer becomes ready
    /// regardless of size, as long as it holds at least one item.
    /// `Duration::ZERO` disables the age trigger.
    pub max_age: Duration,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 30,
            overflow_policy: OverflowPolicy::DropOldest,
            batch_size: 1,
            max_age: Duration::ZERO,
        }
    }
}

impl BufferConfig {
    /// Configuration for error events: small ring, flush on every item.
    pub fn error() -> Self {
        Self::default()
    }

    /// Configuration for transactions: identical shape to errors.
    pub fn transaction() -> Self {
        Self::default()
    }

    /// Configuration for monitor check-ins: identical shape to errors.
    pub fn monitor() -> Self {
        Self::default()
    }

    /// Configuration for log records: larger ring, batched, age-triggered.
    pub fn log() -> Self {
        Self {
            capacity: 1000,
            overflow_policy: OverflowPolicy::DropOldest,
            batch_size: 100,
            max_age: Duration::from_secs(5),
        }
    }
}
