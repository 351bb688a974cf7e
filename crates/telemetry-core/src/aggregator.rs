//! Client-report aggregator: counts dropped items by (reason, category)
//! and emits a periodic `client_report` item summarising them.

use crate::category::Category;
use crate::envelope::EnvelopeItem;
use crate::item::{Item, ItemKind};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;

/// The enumerated cause of a drop recorded by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscardReason {
    QueueOverflow,
    BufferOverflow,
    RatelimitBackoff,
    BeforeSend,
    EventProcessor,
    SampleRate,
    NetworkError,
    SendError,
    InternalSdkError,
}

impl DiscardReason {
    fn wire_name(self) -> &'static str {
        match self {
            Self::QueueOverflow => "queue_overflow",
            Self::BufferOverflow => "buffer_overflow",
            Self::RatelimitBackoff => "ratelimit_backoff",
            Self::BeforeSend => "before_send",
            Self::EventProcessor => "event_processor",
            Self::SampleRate => "sample_rate",
            Self::NetworkError => "network_error",
            Self::SendError => "send_error",
            Self::InternalSdkError => "internal_sdk_error",
        }
    }
}

#[derive(Serialize)]
struct DiscardedEvent {
    reason: &'static str,
    category: String,
    quantity: u64,
}

/// One mutex for the outer map; per-key counters are plain `u64` behind
/// that same lock (the map itself, not the leaves, is the hot contention
/// point here since writes always touch a (reason, category) pair that
/// may not exist yet).
#[derive(Debug, Default)]
pub struct Aggregator {
    counters: Mutex<HashMap<(DiscardReason, Category), u64>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `client_report` is never recorded as a discard on drop — that
    /// would recurse. Callers should not call `record` with this
    /// category; this guard makes the invariant load-bearing instead of
    /// merely documented.
    pub fn record(&self, reason: DiscardReason, category: Category, n: i64) {
        if n <= 0 || category == Category::ClientReport {
            return;
        }
        let mut counters = self.counters.lock().unwrap();
        *counters.entry((reason, category)).or_insert(0) += n as u64;
    }

    /// Atomically reads and zeros all non-zero counters, returning a
    /// `client_report` item. Returns `None` if nothing was discarded.
    pub fn take_report(&self) -> Option<Item> {
        let drained: HashMap<(DiscardReason, Category), u64> = {
            let mut counters = self.counters.lock().unwrap();
            std::mem::take(&mut *counters)
        };
        if drained.is_empty() {
            return None;
        }
        let discarded_events: Vec<DiscardedEvent> = drained
            .into_iter()
            .filter(|(_, quantity)| *quantity > 0)
            .map(|((reason, category), quantity)| DiscardedEvent {
                reason: reason.wire_name(),
                category: category.to_string(),
                quantity,
            })
            .collect();
        if discarded_events.is_empty() {
            return None;
        }
        Item::new(ItemKind::ClientReport, &json!({ "discarded_events": discarded_events })).ok()
    }

    /// Non-resetting read of the current counters. Test-only: production
    /// callers always go through `take_report`, which is the one place
    /// counters are allowed to reset.
    #[cfg(test)]
    pub fn snapshot(&self) -> HashMap<(DiscardReason, Category), u64> {
        self.counters.lock().unwrap().clone()
    }

    /// Records drops for every item in an abandoned envelope, per §4.3:
    /// event -> error; transaction -> transaction plus span count; log ->
    /// log plus log_byte using payload length. Attachments and
    /// client-reports are skipped.
    pub fn record_envelope_drop(&self, reason: DiscardReason, items: &[EnvelopeItem]) {
        for item in items {
            match item.item_type.as_str() {
                "event" => self.record(reason, Category::Error, 1),
                "transaction" => {
                    self.record(reason, Category::Transaction, 1);
                    if let Some(span_count) = item.span_count {
                        self.record(reason, Category::Span, i64::from(span_count));
                    }
                }
                "check_in" => self.record(reason, Category::Monitor, 1),
                "log" => {
                    let count = item.item_count.unwrap_or(1) as i64;
                    self.record(reason, Category::Log, count);
                    self.record(reason, Category::LogByte, item.payload.len() as i64);
                }
                _ => {}
            }
        }
    }
}
