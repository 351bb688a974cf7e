//! Telemetry ingestion and delivery core
//!
//! Turns SDK-level observations (errors, transactions, check-ins, logs)
//! into envelopes and gets them to an ingestion endpoint, without the
//! caller ever blocking on the network.
//!
//! - [`item`] — the tagged item type and its identifiers.
//! - [`envelope`] — the newline-delimited wire format that groups items.
//! - [`category`] / [`ratelimit`] — rate-limit accounting and scheduling
//!   priority.
//! - [`aggregator`] — counts and periodically reports dropped items.
//! - [`endpoint`] — DSN parsing into an ingestion URL and auth header.
//! - [`scheduler`] — the weighted round-robin buffer-to-transport loop.
//! - [`transport`] — the blocking and async HTTP delivery paths.
//! - [`client`] — the facade tying all of the above together.

pub mod aggregator;
pub mod category;
pub mod client;
pub mod endpoint;
pub mod envelope;
pub mod item;
pub mod ratelimit;
pub mod scheduler;
pub mod transport;
mod util;

pub use aggregator::{Aggregator, DiscardReason};
pub use category::{Category, Priority};
pub use client::{Client, ClientConfig, ClientError};
pub use endpoint::{EndpointDescriptor, EndpointError};
pub use envelope::{CodecError, Envelope, EnvelopeHeader, EnvelopeItem};
pub use item::{Dsc, EventId, Item, ItemKind, SdkInfo, TraceContext};
pub use ratelimit::RateLimitMap;
pub use scheduler::Scheduler;
pub use transport::{AsyncTransport, AsyncTransportConfig, SyncTransport, TransportError, TransportHandle};
