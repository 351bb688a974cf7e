//! Async transport path: a bounded queue, one consumer task, and
//! retry-with-backoff driven entirely off `tokio`.

use super::{TransportError, TransportHandle};
use crate::aggregator::{Aggregator, DiscardReason};
use crate::category::Category;
use crate::endpoint::EndpointDescriptor;
use crate::envelope::Envelope;
use crate::ratelimit::RateLimitMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct AsyncTransportConfig {
    pub queue_size: usize,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for AsyncTransportConfig {
    fn default() -> Self {
        Self {
            queue_size: 1000,
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

struct ConfiguredEndpoint {
    endpoint: EndpointDescriptor,
    sdk_name: String,
    sdk_version: String,
}

struct Shared {
    endpoint: Option<ConfiguredEndpoint>,
    client: reqwest::Client,
    rate_limits: RateLimitMap,
    aggregator: Arc<Aggregator>,
    config: AsyncTransportConfig,
    queue_tx: mpsc::Sender<Envelope>,
    flush_tx: mpsc::Sender<oneshot::Sender<()>>,
    closed: AtomicBool,
    sent: AtomicU64,
    dropped: AtomicU64,
    errored: AtomicU64,
    runtime: tokio::runtime::Handle,
}

/// Bounded FIFO of envelopes, a single consumer task, and counters for
/// `sent`/`dropped`/`errored`. `Start` is optional and idempotent; `Close`
/// before `Start` is a no-op — see the design notes on the duplicated
/// worker-pool behavior this choice resolves.
pub struct AsyncTransport {
    shared: Arc<Shared>,
    queue_rx: Mutex<Option<mpsc::Receiver<Envelope>>>,
    flush_rx: Mutex<Option<mpsc::Receiver<oneshot::Sender<()>>>>,
    done_tx: Mutex<Option<watch::Sender<bool>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncTransport {
    /// Must be called from within a tokio runtime (the handle is captured
    /// for `flush`/`close`, which bridge the synchronous `TransportHandle`
    /// interface back into async code).
    pub fn new(
        endpoint: EndpointDescriptor,
        sdk_name: impl Into<String>,
        sdk_version: impl Into<String>,
        aggregator: Arc<Aggregator>,
        config: AsyncTransportConfig,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("reqwest client always builds with default settings");
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_size.max(1));
        let (flush_tx, flush_rx) = mpsc::channel(1);
        Self {
            shared: Arc::new(Shared {
                endpoint: Some(ConfiguredEndpoint {
                    endpoint,
                    sdk_name: sdk_name.into(),
                    sdk_version: sdk_version.into(),
                }),
                client,
                rate_limits: RateLimitMap::new(),
                aggregator,
                config,
                queue_tx,
                flush_tx,
                closed: AtomicBool::new(false),
                sent: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                errored: AtomicU64::new(0),
                runtime: tokio::runtime::Handle::current(),
            }),
            queue_rx: Mutex::new(Some(queue_rx)),
            flush_rx: Mutex::new(Some(flush_rx)),
            done_tx: Mutex::new(None),
            consumer: Mutex::new(None),
        }
    }

    /// No-op constructor for configuration errors (§7): never enqueues,
    /// never spawns a worker, `send_envelope`/`flush` behave benignly.
    pub fn disabled(aggregator: Arc<Aggregator>) -> Self {
        let client = reqwest::Client::new();
        let (queue_tx, queue_rx) = mpsc::channel(1);
        let (flush_tx, flush_rx) = mpsc::channel(1);
        Self {
            shared: Arc::new(Shared {
                endpoint: None,
                client,
                rate_limits: RateLimitMap::new(),
                aggregator,
                config: AsyncTransportConfig::default(),
                queue_tx,
                flush_tx,
                closed: AtomicBool::new(false),
                sent: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                errored: AtomicU64::new(0),
                runtime: tokio::runtime::Handle::current(),
            }),
            queue_rx: Mutex::new(Some(queue_rx)),
            flush_rx: Mutex::new(Some(flush_rx)),
            done_tx: Mutex::new(None),
            consumer: Mutex::new(None),
        }
    }

    /// Spawns the consumer task. Idempotent; a disabled transport never
    /// spawns one.
    pub fn start(&self) {
        let mut consumer = self.consumer.lock().unwrap();
        if consumer.is_some() || self.shared.endpoint.is_none() {
            return;
        }
        let Some(queue_rx) = self.queue_rx.lock().unwrap().take() else {
            return;
        };
        let Some(flush_rx) = self.flush_rx.lock().unwrap().take() else {
            return;
        };
        let (done_tx, done_rx) = watch::channel(false);
        *self.done_tx.lock().unwrap() = Some(done_tx);
        let shared = Arc::clone(&self.shared);
        *consumer = Some(tokio::spawn(consumer_loop(shared, queue_rx, flush_rx, done_rx)));
    }

    pub fn sent(&self) -> u64 {
        self.shared.sent.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn errored(&self) -> u64 {
        self.shared.errored.load(Ordering::Relaxed)
    }
}

impl TransportHandle for AsyncTransport {
    fn send_envelope(&self, envelope: Envelope) -> Result<(), TransportError> {
        if self.shared.endpoint.is_none() {
            return Ok(());
        }
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        let category = envelope.primary_category();
        if self.shared.rate_limits.is_rate_limited(category) {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            self.shared
                .aggregator
                .record_envelope_drop(DiscardReason::RatelimitBackoff, &envelope.items);
            tracing::debug!(?category, "async transport: envelope dropped, category rate-limited");
            return Ok(());
        }

        match self.shared.queue_tx.try_send(envelope) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(envelope)) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                self.shared
                    .aggregator
                    .record_envelope_drop(DiscardReason::QueueOverflow, &envelope.items);
                Err(TransportError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(envelope)) => {
                self.shared
                    .aggregator
                    .record_envelope_drop(DiscardReason::QueueOverflow, &envelope.items);
                Err(TransportError::Closed)
            }
        }
    }

    fn is_rate_limited(&self, category: Category) -> bool {
        self.shared.rate_limits.is_rate_limited(category)
    }

    /// Sends a flush-request sentinel and waits for the consumer to drain
    /// its current queue non-blockingly before signaling completion.
    fn flush(&self, timeout: Duration) -> bool {
        if self.shared.endpoint.is_none() || self.shared.closed.load(Ordering::Acquire) {
            return true;
        }
        let flush_tx = self.shared.flush_tx.clone();
        self.shared.runtime.clone().block_on(async move {
            let (completion_tx, completion_rx) = oneshot::channel();
            if flush_tx.send(completion_tx).await.is_err() {
                return true;
            }
            tokio::time::timeout(timeout, completion_rx).await.is_ok()
        })
    }

    /// Once-semantics: closes `done`, which unblocks the consumer's next
    /// select iteration (or an in-progress backoff sleep), then joins it.
    fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(done_tx) = self.done_tx.lock().unwrap().take() {
            let _ = done_tx.send(true);
        }
        if let Some(handle) = self.consumer.lock().unwrap().take() {
            self.shared.runtime.clone().block_on(async { let _ = handle.await; });
        }
    }
}

async fn consumer_loop(
    shared: Arc<Shared>,
    mut queue_rx: mpsc::Receiver<Envelope>,
    mut flush_rx: mpsc::Receiver<oneshot::Sender<()>>,
    done_rx: watch::Receiver<bool>,
) {
    loop {
        let mut done_signal = done_rx.clone();
        tokio::select! {
            _ = done_signal.changed() => {
                if *done_signal.borrow() {
                    tracing::debug!("async transport consumer: done signal received");
                    return;
                }
            }
            maybe_envelope = queue_rx.recv() => {
                match maybe_envelope {
                    Some(envelope) => process(&shared, envelope, done_rx.clone()).await,
                    None => return,
                }
            }
            maybe_flush = flush_rx.recv() => {
                let Some(completion) = maybe_flush else { continue };
                while let Ok(envelope) = queue_rx.try_recv() {
                    process(&shared, envelope, done_rx.clone()).await;
                }
                let _ = completion.send(());
            }
        }
    }
}

enum SendOutcome {
    Success,
    Http4xx,
    Http5xxOr429,
    Network,
}

async fn process(shared: &Arc<Shared>, envelope: Envelope, mut done_rx: watch::Receiver<bool>) {
    let max_attempts = shared.config.max_retries + 1;
    let mut backoff = shared.config.initial_backoff;

    for attempt in 0..max_attempts {
        match send_http(shared, &envelope).await {
            SendOutcome::Success => {
                shared.sent.fetch_add(1, Ordering::Relaxed);
                return;
            }
            SendOutcome::Http4xx => {
                shared.errored.fetch_add(1, Ordering::Relaxed);
                shared.aggregator.record_envelope_drop(DiscardReason::SendError, &envelope.items);
                return;
            }
            outcome @ (SendOutcome::Http5xxOr429 | SendOutcome::Network) => {
                if attempt + 1 == max_attempts {
                    shared.errored.fetch_add(1, Ordering::Relaxed);
                    let reason = if matches!(outcome, SendOutcome::Network) {
                        DiscardReason::NetworkError
                    } else {
                        DiscardReason::SendError
                    };
                    shared.aggregator.record_envelope_drop(reason, &envelope.items);
                    return;
                }
                tokio::select! {
                    () = tokio::time::sleep(backoff) => {}
                    _ = done_rx.changed() => {
                        if *done_rx.borrow() {
                            return;
                        }
                    }
                }
                backoff *= 2;
            }
        }
    }
}

async fn send_http(shared: &Arc<Shared>, envelope: &Envelope) -> SendOutcome {
    let Some(configured) = &shared.endpoint else {
        return SendOutcome::Success;
    };
    let body = envelope.encode();
    let auth = configured.endpoint.auth_header(&configured.sdk_name, &configured.sdk_version);
    let user_agent = format!("{}/{}", configured.sdk_name, configured.sdk_version);

    let request = shared
        .client
        .post(configured.endpoint.ingestion_url())
        .header("Content-Type", "application/x-sentry-envelope")
        .header("User-Agent", user_agent)
        .header("X-Sentry-Auth", auth)
        .timeout(shared.config.request_timeout)
        .body(body);

    match request.send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            let rate_limits_header = response
                .headers()
                .get("X-Sentry-Rate-Limits")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let retry_after_header = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            shared.rate_limits.apply_response_headers(
                status,
                rate_limits_header.as_deref(),
                retry_after_header.as_deref(),
                Instant::now(),
            );
            // Drain the body (capped implicitly by response size in practice)
            // so the underlying connection can be reused.
            let _ = response.bytes().await;

            if (200..300).contains(&status) {
                SendOutcome::Success
            } else if status == 429 || (500..600).contains(&status) {
                SendOutcome::Http5xxOr429
            } else {
                SendOutcome::Http4xx
            }
        }
        Err(err) => {
            tracing::error!(error = %err, "async transport: request failed");
            SendOutcome::Network
        }
    }
}
