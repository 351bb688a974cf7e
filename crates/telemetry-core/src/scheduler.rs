//! Weighted round-robin scheduler: drains the category ring buffers onto
//! the transport, favoring higher-priority categories without ever
//! starving the lower ones.

use crate::aggregator::{Aggregator, DiscardReason};
use crate::category::{Category, Priority};
use crate::envelope::{Envelope, EnvelopeHeader, EnvelopeItem};
use crate::item::{EventId, Item, SdkInfo};
use crate::transport::TransportHandle;
use crate::util::now_rfc3339;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use telemetry_ring_buffer::{BufferConfig, RingBuffer};

const WAIT_TICK: Duration = Duration::from_millis(100);

struct SchedulerState {
    cycle: Vec<Priority>,
    cycle_pos: usize,
    built_mask: u8,
    shutdown: bool,
}

/// Owns the four category buffers and the thread that drains them onto
/// the transport in weighted round-robin order.
///
/// The cycle is a flat `Vec<Priority>` built by repeating each non-empty
/// priority `default_weight()` times — a simple concatenation rather than
/// an interleaved (Nagle/smooth) WRR schedule. It's rebuilt only when the
/// set of non-empty priorities changes since the last build, which a
/// steady producer load never does.
pub struct Scheduler {
    buffers: HashMap<Category, Arc<RingBuffer<Item>>>,
    aggregator: Arc<Aggregator>,
    transport: Arc<dyn TransportHandle>,
    sdk_info: Option<SdkInfo>,
    state: Mutex<SchedulerState>,
    cv: Condvar,
    consumer: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
    rebuild_count: AtomicU64,
}

impl Scheduler {
    pub fn new(aggregator: Arc<Aggregator>, transport: Arc<dyn TransportHandle>, sdk_info: Option<SdkInfo>) -> Arc<Self> {
        let mut buffers: HashMap<Category, Arc<RingBuffer<Item>>> = HashMap::new();
        for (category, config) in [
            (Category::Error, BufferConfig::error()),
            (Category::Transaction, BufferConfig::transaction()),
            (Category::Monitor, BufferConfig::monitor()),
            (Category::Log, BufferConfig::log()),
        ] {
            let agg = Arc::clone(&aggregator);
            let buffer = RingBuffer::new(config, move |item: Item| {
                agg.record(DiscardReason::BufferOverflow, item.category(), 1);
            });
            buffers.insert(category, Arc::new(buffer));
        }

        Arc::new(Self {
            buffers,
            aggregator,
            transport,
            sdk_info,
            state: Mutex::new(SchedulerState {
                cycle: Vec::new(),
                cycle_pos: 0,
                built_mask: 0,
                shutdown: false,
            }),
            cv: Condvar::new(),
            consumer: Mutex::new(None),
            stopped: AtomicBool::new(false),
            rebuild_count: AtomicU64::new(0),
        })
    }

    /// Spawns the consumer thread. Idempotent: calling this twice is a
    /// no-op on the second call.
    pub fn start(self: &Arc<Self>) {
        let mut consumer = self.consumer.lock().unwrap();
        if consumer.is_some() {
            return;
        }
        let scheduler = Arc::clone(self);
        *consumer = Some(
            std::thread::Builder::new()
                .name("telemetry-scheduler".to_string())
                .spawn(move || scheduler.run())
                .expect("failed to spawn scheduler thread"),
        );
    }

    /// Routes an item into its category's buffer and wakes the consumer.
    /// Items for categories with no buffer (attachments, client reports —
    /// the latter are only ever produced internally by `take_report`) are
    /// dropped with a warning; callers should not route them here.
    pub fn capture(&self, item: Item) {
        let category = item.category();
        let Some(buffer) = self.buffers.get(&category) else {
            tracing::warn!(%category, "scheduler: no buffer owns this category, dropping item");
            return;
        };
        buffer.offer(item);
        self.cv.notify_all();
    }

    /// Drains every buffer unconditionally and sends whatever it holds,
    /// then asks the transport to flush, bounded by the remaining time
    /// in `timeout`. Returns `true` if the transport reports a clean
    /// flush within the deadline.
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        for (&category, buffer) in &self.buffers {
            let items = buffer.drain();
            if !items.is_empty() {
                self.dispatch(category, items);
            }
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.transport.flush(remaining)
    }

    /// Flushes, then stops the consumer thread and closes the transport.
    /// Idempotent: a second call is a harmless no-op returning `true`.
    pub fn stop(&self, timeout: Duration) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return true;
        }
        let flushed = self.flush(timeout);
        {
            let mut state = self.state.lock().unwrap();
            state.shutdown = true;
        }
        self.cv.notify_all();
        if let Some(handle) = self.consumer.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.transport.close();
        flushed
    }

    /// Number of times the priority cycle has actually been rebuilt.
    /// Exposed for tests asserting that steady-state polling doesn't
    /// thrash the cycle on every wakeup.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuild_count.load(Ordering::Relaxed)
    }

    fn run(self: Arc<Self>) {
        loop {
            {
                let mut state = self.state.lock().unwrap();
                while !self.any_buffer_ready() && !state.shutdown {
                    let (guard, _timed_out) = self.cv.wait_timeout(state, WAIT_TICK).unwrap();
                    state = guard;
                }
                if state.shutdown {
                    return;
                }
            }

            let priority = {
                let mut state = self.state.lock().unwrap();
                let mask = self.nonempty_mask();
                if mask != state.built_mask {
                    state.cycle = Self::build_cycle(mask);
                    state.cycle_pos = 0;
                    state.built_mask = mask;
                    self.rebuild_count.fetch_add(1, Ordering::Relaxed);
                }
                if state.cycle.is_empty() {
                    continue;
                }
                let len = state.cycle.len();
                let priority = state.cycle[state.cycle_pos % len];
                state.cycle_pos = (state.cycle_pos + 1) % len;
                priority
            };

            let Some(category) = priority.buffer_category() else {
                continue;
            };
            if self.transport.is_rate_limited(category) {
                continue;
            }
            let buffer = self
                .buffers
                .get(&category)
                .expect("every scheduled priority maps to a registered buffer");
            let items = buffer.poll_if_ready();
            if items.is_empty() {
                continue;
            }
            self.dispatch(category, items);
        }
    }

    fn any_buffer_ready(&self) -> bool {
        self.buffers.values().any(|buffer| buffer.is_ready_to_flush())
    }

    fn nonempty_mask(&self) -> u8 {
        let mut mask = 0u8;
        for (bit, priority) in [Priority::Critical, Priority::High, Priority::Medium, Priority::Low]
            .into_iter()
            .enumerate()
        {
            if let Some(category) = priority.buffer_category() {
                if !self.buffers[&category].is_empty() {
                    mask |= 1 << bit;
                }
            }
        }
        mask
    }

    fn build_cycle(mask: u8) -> Vec<Priority> {
        let mut cycle = Vec::new();
        for (bit, priority) in [Priority::Critical, Priority::High, Priority::Medium, Priority::Low]
            .into_iter()
            .enumerate()
        {
            if mask & (1 << bit) != 0 {
                cycle.extend(std::iter::repeat(priority).take(priority.default_weight()));
            }
        }
        cycle
    }

    /// Assembles an envelope from a batch of same-category items, appends
    /// a client report if one is due, and hands it to the transport. A
    /// send failure is accounted as a dropped batch rather than retried
    /// here — retrying is the transport's job.
    fn dispatch(&self, category: Category, items: Vec<Item>) {
        let mut envelope_items: Vec<EnvelopeItem> = if category == Category::Log {
            vec![EnvelopeItem::log_batch(&items)]
        } else {
            items.iter().map(EnvelopeItem::from_item).collect()
        };

        if let Some(report) = self.aggregator.take_report() {
            envelope_items.push(EnvelopeItem::from_item(&report));
        }

        let header = EnvelopeHeader {
            event_id: items.first().map(|item| item.event_id).or_else(|| Some(EventId::generate())),
            sent_at: Some(now_rfc3339()),
            dsn: None,
            sdk_info: self.sdk_info.clone(),
            trace_context: items.first().and_then(|item| item.trace_context.clone()),
        };

        let envelope = Envelope::new(header, envelope_items.clone());
        if let Err(err) = self.transport.send_envelope(envelope) {
            tracing::warn!(error = %err, %category, "scheduler: transport rejected envelope, counting as dropped");
            let reportable: Vec<EnvelopeItem> = envelope_items
                .into_iter()
                .filter(|item| item.item_type != "client_report")
                .collect();
            self.aggregator.record_envelope_drop(DiscardReason::QueueOverflow, &reportable);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemKind;
    use crate::transport::TransportError;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    struct RecordingTransport {
        sent: StdMutex<Vec<Envelope>>,
    }

    impl RecordingTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self { sent: StdMutex::new(Vec::new()) })
        }
    }

    impl TransportHandle for RecordingTransport {
        fn send_envelope(&self, envelope: Envelope) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(envelope);
            Ok(())
        }
        fn is_rate_limited(&self, _category: Category) -> bool {
            false
        }
        fn flush(&self, _timeout: Duration) -> bool {
            true
        }
        fn close(&self) {}
    }

    #[test]
    fn capture_and_stop_delivers_buffered_item() {
        let transport = RecordingTransport::new();
        let aggregator = Arc::new(Aggregator::new());
        let scheduler = Scheduler::new(aggregator, transport.clone(), None);
        scheduler.start();

        let event = Item::new(ItemKind::Event, &json!({"message": "boom"})).unwrap();
        scheduler.capture(event.clone());

        assert!(scheduler.stop(Duration::from_secs(2)));
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].items[0].item_type, "event");
    }

    #[test]
    fn stop_is_idempotent() {
        let transport = RecordingTransport::new();
        let aggregator = Arc::new(Aggregator::new());
        let scheduler = Scheduler::new(aggregator, transport, None);
        scheduler.start();
        assert!(scheduler.stop(Duration::from_millis(200)));
        assert!(scheduler.stop(Duration::from_millis(200)));
    }

    #[test]
    fn build_cycle_for_critical_and_medium_has_length_eight() {
        let mask = (1 << 0) | (1 << 2); // Critical + Medium bits, per nonempty_mask's bit layout
        let cycle = Scheduler::build_cycle(mask);
        assert_eq!(cycle.len(), 8);
        assert_eq!(cycle.iter().filter(|&&p| p == Priority::Critical).count(), 5);
        assert_eq!(cycle.iter().filter(|&&p| p == Priority::Medium).count(), 3);
    }

    #[test]
    fn eighty_poll_walk_distributes_five_to_three() {
        let mask = (1 << 0) | (1 << 2);
        let cycle = Scheduler::build_cycle(mask);
        let mut critical = 0;
        let mut medium = 0;
        for i in 0..80 {
            match cycle[i % cycle.len()] {
                Priority::Critical => critical += 1,
                Priority::Medium => medium += 1,
                other => panic!("unexpected priority in cycle: {other:?}"),
            }
        }
        assert_eq!(critical, 50);
        assert_eq!(medium, 30);
    }

    #[test]
    fn cycle_is_not_rebuilt_on_steady_state_polls() {
        let transport = RecordingTransport::new();
        let aggregator = Arc::new(Aggregator::new());
        let scheduler = Scheduler::new(aggregator, transport, None);
        scheduler.start();

        for i in 0..20 {
            let event = Item::new(ItemKind::Event, &json!({"n": i})).unwrap();
            scheduler.capture(event);
            std::thread::sleep(Duration::from_millis(5));
        }
        scheduler.stop(Duration::from_secs(2));
        // Only one priority (Critical) is ever active in this test, so the
        // cycle should be built once and never rebuilt afterwards.
        assert!(scheduler.rebuild_count() <= 2);
    }
}
