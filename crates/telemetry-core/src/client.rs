//! Top-level client facade: wires the endpoint, buffers, aggregator,
//! scheduler and transport together behind `capture`/`flush`/`close`.

use crate::aggregator::Aggregator;
use crate::endpoint::{EndpointDescriptor, EndpointError};
use crate::item::{Item, SdkInfo};
use crate::scheduler::Scheduler;
use crate::transport::{AsyncTransport, AsyncTransportConfig, SyncTransport, TransportHandle};
use std::sync::Arc;
use std::time::Duration;

/// Everything needed to parse a DSN and identify this SDK to the
/// ingestion endpoint.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub dsn: String,
    pub sdk_name: String,
    pub sdk_version: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

/// Entry point for the rest of the SDK: capture items, flush on demand,
/// and shut down cleanly at process exit. Internally this is just a
/// handle to the scheduler, which owns the buffers and the transport.
pub struct Client {
    scheduler: Arc<Scheduler>,
}

impl Client {
    /// Builds a client backed by the blocking transport. Works outside a
    /// tokio runtime — suitable for short-lived processes.
    pub fn new_sync(config: ClientConfig) -> Result<Self, ClientError> {
        let endpoint = EndpointDescriptor::parse(&config.dsn)?;
        let aggregator = Arc::new(Aggregator::new());
        let transport = Arc::new(SyncTransport::new(
            endpoint,
            config.sdk_name.clone(),
            config.sdk_version.clone(),
            Arc::clone(&aggregator),
        ));
        Ok(Self::with_transport_and_aggregator(config, transport, aggregator))
    }

    /// Builds a client backed by the async transport. Must be called
    /// from within a tokio runtime: the transport captures the current
    /// `Handle` so its synchronous `flush`/`close` methods can bridge
    /// back into async code.
    pub fn new_async(config: ClientConfig, transport_config: AsyncTransportConfig) -> Result<Self, ClientError> {
        let endpoint = EndpointDescriptor::parse(&config.dsn)?;
        let aggregator = Arc::new(Aggregator::new());
        let transport = Arc::new(AsyncTransport::new(
            endpoint,
            config.sdk_name.clone(),
            config.sdk_version.clone(),
            Arc::clone(&aggregator),
            transport_config,
        ));
        transport.start();
        Ok(Self::with_transport_and_aggregator(config, transport, aggregator))
    }

    /// Builds a client around a transport that's already configured —
    /// used by callers (and tests) that want a custom `TransportHandle`
    /// or one of the `disabled()` constructors.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn TransportHandle>) -> Self {
        Self::with_transport_and_aggregator(config, transport, Arc::new(Aggregator::new()))
    }

    fn with_transport_and_aggregator(
        config: ClientConfig,
        transport: Arc<dyn TransportHandle>,
        aggregator: Arc<Aggregator>,
    ) -> Self {
        let sdk_info = Some(SdkInfo {
            name: config.sdk_name,
            version: config.sdk_version,
        });
        let scheduler = Scheduler::new(aggregator, transport, sdk_info);
        scheduler.start();
        Self { scheduler }
    }

    /// Routes an item into its category's buffer for eventual delivery.
    pub fn capture(&self, item: Item) {
        self.scheduler.capture(item);
    }

    /// Drains every buffer and waits up to `timeout` for the transport to
    /// confirm everything in flight has been sent.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.scheduler.flush(timeout)
    }

    /// Flushes, stops the scheduler thread, and closes the transport.
    /// Safe to call more than once.
    pub fn close(&self, timeout: Duration) -> bool {
        self.scheduler.stop(timeout)
    }
}
