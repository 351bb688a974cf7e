//! Blocking transport path: used from short-lived processes where
//! spinning up a background worker isn't worth it.

use super::{drain_response_body_capped, TransportError, TransportHandle, RESPONSE_DRAIN_CAP};
use crate::aggregator::{Aggregator, DiscardReason};
use crate::category::Category;
use crate::endpoint::EndpointDescriptor;
use crate::envelope::Envelope;
use crate::ratelimit::RateLimitMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Configured {
    endpoint: EndpointDescriptor,
    client: reqwest::blocking::Client,
    rate_limits: RateLimitMap,
    aggregator: Arc<Aggregator>,
    sdk_name: String,
    sdk_version: String,
}

/// `send_envelope` blocks on the HTTP call; `flush` always returns `true`
/// because sends are already synchronous.
pub struct SyncTransport {
    inner: Option<Configured>,
}

impl SyncTransport {
    pub fn new(
        endpoint: EndpointDescriptor,
        sdk_name: impl Into<String>,
        sdk_version: impl Into<String>,
        aggregator: Arc<Aggregator>,
    ) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest blocking client always builds with default settings");
        Self {
            inner: Some(Configured {
                endpoint,
                client,
                rate_limits: RateLimitMap::new(),
                aggregator,
                sdk_name: sdk_name.into(),
                sdk_version: sdk_version.into(),
            }),
        }
    }

    /// Explicit no-op constructor, used when DSN parsing fails so the SDK
    /// degrades to a benign no-op transport rather than refusing to start.
    pub fn disabled() -> Self {
        Self { inner: None }
    }
}

impl TransportHandle for SyncTransport {
    fn send_envelope(&self, envelope: Envelope) -> Result<(), TransportError> {
        let Some(configured) = &self.inner else {
            return Ok(());
        };

        let category = envelope.primary_category();
        if configured.rate_limits.is_rate_limited(category) {
            configured
                .aggregator
                .record_envelope_drop(DiscardReason::RatelimitBackoff, &envelope.items);
            tracing::debug!(?category, "sync transport: envelope dropped, category rate-limited");
            return Ok(());
        }

        let body = envelope.encode();
        let auth = configured.endpoint.auth_header(&configured.sdk_name, &configured.sdk_version);
        let user_agent = format!("{}/{}", configured.sdk_name, configured.sdk_version);

        let result = configured
            .client
            .post(configured.endpoint.ingestion_url())
            .header("Content-Type", "application/x-sentry-envelope")
            .header("User-Agent", user_agent)
            .header("X-Sentry-Auth", auth)
            .body(body)
            .send();

        match result {
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
                configured.rate_limits.apply_response_headers(
                    status,
                    rate_limits_header.as_deref(),
                    retry_after_header.as_deref(),
                    Instant::now(),
                );
                if status >= 400 {
                    tracing::warn!(status, "sync transport: ingestion endpoint returned an error status");
                }
                drain_response_body_capped(response, RESPONSE_DRAIN_CAP);
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "sync transport: request failed");
                Err(TransportError::Http(err.to_string()))
            }
        }
    }

    fn is_rate_limited(&self, category: Category) -> bool {
        self.inner.as_ref().is_some_and(|configured| configured.rate_limits.is_rate_limited(category))
    }

    fn flush(&self, _timeout: Duration) -> bool {
        true
    }

    fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeHeader;
    use crate::item::{Item, ItemKind};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn dsn_for(mock_server: &MockServer) -> String {
        let uri = mock_server.uri();
        let host_port = uri.strip_prefix("http://").expect("wiremock always serves http");
        format!("http://testkey@{host_port}/1")
    }

    fn error_envelope() -> Envelope {
        let item = Item::new(ItemKind::Event, &json!({"message": "boom"})).unwrap();
        Envelope::new(
            EnvelopeHeader {
                event_id: Some(item.event_id),
                ..Default::default()
            },
            vec![EnvelopeItem::from_item(&item)],
        )
    }

    #[test]
    fn disabled_transport_is_a_silent_noop() {
        let transport = SyncTransport::disabled();
        assert!(transport.send_envelope(error_envelope()).is_ok());
        assert!(!transport.is_rate_limited(Category::Error));
        assert!(transport.flush(Duration::from_secs(1)));
    }

    #[test]
    fn flush_always_returns_true_since_sends_are_already_synchronous() {
        let endpoint = EndpointDescriptor::parse("http://key@localhost:1/1").unwrap();
        let transport = SyncTransport::new(endpoint, "test-sdk", "0.0.0", Arc::new(Aggregator::new()));
        assert!(transport.flush(Duration::from_secs(0)));
    }

    #[tokio::test]
    async fn rate_limited_category_is_dropped_without_a_request_and_recorded() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/1/envelope/"))
            .respond_with(ResponseTemplate::new(429).insert_header("X-Sentry-Rate-Limits", "60:error:organization"))
            .mount(&mock_server)
            .await;

        let endpoint = EndpointDescriptor::parse(&dsn_for(&mock_server)).unwrap();
        let aggregator = Arc::new(Aggregator::new());
        let transport = Arc::new(SyncTransport::new(endpoint, "test-sdk", "0.0.0", Arc::clone(&aggregator)));

        let first = Arc::clone(&transport);
        tokio::task::spawn_blocking(move || first.send_envelope(error_envelope())).await.unwrap().unwrap();
        assert!(transport.is_rate_limited(Category::Error));

        let second = Arc::clone(&transport);
        tokio::task::spawn_blocking(move || second.send_envelope(error_envelope())).await.unwrap().unwrap();

        let requests = mock_server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1, "second send should have been dropped as rate-limited, not sent");

        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot[&(DiscardReason::RatelimitBackoff, Category::Error)], 1);
    }

    #[tokio::test]
    async fn server_error_status_is_logged_not_propagated_as_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/1/envelope/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let endpoint = EndpointDescriptor::parse(&dsn_for(&mock_server)).unwrap();
        let transport = SyncTransport::new(endpoint, "test-sdk", "0.0.0", Arc::new(Aggregator::new()));

        let result = tokio::task::spawn_blocking(move || transport.send_envelope(error_envelope())).await.unwrap();
        assert!(result.is_ok(), "a 4xx/5xx response status must not surface as a transport error");
    }
}
