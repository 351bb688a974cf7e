//! Dual-mode HTTP transport: a blocking path for short-lived processes and
//! an async path with a bounded queue, a worker task, and retry/backoff.

pub mod async_transport;
pub mod sync;

pub use async_transport::{AsyncTransport, AsyncTransportConfig};
pub use sync::SyncTransport;

use crate::category::Category;
use crate::envelope::Envelope;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Async transport only: the bounded queue was full.
    #[error("transport queue is full")]
    QueueFull,
    /// Async transport only: `close()` was already called.
    #[error("transport is closed")]
    Closed,
    /// Sync transport only: the underlying HTTP request failed.
    #[error("http transport error: {0}")]
    Http(String),
}

/// What the scheduler needs from either transport implementation.
pub trait TransportHandle: Send + Sync {
    fn send_envelope(&self, envelope: Envelope) -> Result<(), TransportError>;
    fn is_rate_limited(&self, category: Category) -> bool;
    fn flush(&self, timeout: Duration) -> bool;
    fn close(&self);
}

fn drain_response_body_capped(mut reader: impl std::io::Read, cap: usize) {
    let mut buf = [0u8; 4096];
    let mut read_total = 0usize;
    while read_total < cap {
        match reader.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => read_total += n,
        }
    }
}

const RESPONSE_DRAIN_CAP: usize = 16 * 1024;
