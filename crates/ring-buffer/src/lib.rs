//! Bounded per-category ring buffer
//!
//! A fixed-capacity FIFO queue with a configurable overflow policy and a
//! flush-readiness predicate driven by batch size and item age. Every item
//! that can't fit is handed to an overflow sink so the caller can account
//! for it (a dropped-item counter, a log line, both).
//!
//! Unlike a lock-free SPSC ring, this buffer is a single mutex around a
//! `VecDeque`: producers and the one consumer all take the same lock, which
//! keeps the overflow accounting and the flush-readiness check atomic with
//! respect to each other without any unsafe code.

mod buffer;
mod config;
mod invariants;

pub use buffer::{OverflowSink, RingBuffer};
pub use config::{BufferConfig, OverflowPolicy};
