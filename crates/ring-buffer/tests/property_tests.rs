//! Property-based tests for the ring buffer invariants:
//! `0 <= size <= capacity`, `offered == accepted + dropped`, and FIFO
//! survivorship under each overflow policy.

use proptest::prelude::*;
use telemetry_ring_buffer::{BufferConfig, OverflowPolicy, RingBuffer};

fn buffer_with_capacity(capacity: usize, policy: OverflowPolicy) -> RingBuffer<u64> {
    let config = BufferConfig {
        capacity,
        overflow_policy: policy,
        batch_size: 1,
        max_age: std::time::Duration::ZERO,
    };
    RingBuffer::new(config, |_item: u64| {})
}

proptest! {
    #[test]
    fn size_never_exceeds_capacity(
        capacity in 1usize..32,
        offers in prop::collection::vec(any::<u64>(), 0..200),
        policy in prop_oneof![Just(OverflowPolicy::DropOldest), Just(OverflowPolicy::DropNewest)],
    ) {
        let buf = buffer_with_capacity(capacity, policy);
        for item in offers {
            buf.offer(item);
            prop_assert!(buf.len() <= capacity);
        }
    }

    #[test]
    fn offered_equals_accepted_plus_dropped(
        capacity in 1usize..32,
        offers in prop::collection::vec(any::<u64>(), 0..200),
        policy in prop_oneof![Just(OverflowPolicy::DropOldest), Just(OverflowPolicy::DropNewest)],
    ) {
        let buf = buffer_with_capacity(capacity, policy);
        let total = offers.len() as u64;
        for item in offers {
            buf.offer(item);
        }
        let accepted = buf.len() as u64;
        prop_assert_eq!(buf.offered(), total);
        prop_assert_eq!(accepted + buf.dropped(), total);
    }

    #[test]
    fn drop_oldest_keeps_last_capacity_items_in_fifo_order(
        capacity in 1usize..16,
        offers in prop::collection::vec(any::<u64>(), 0..100),
    ) {
        let buf = buffer_with_capacity(capacity, OverflowPolicy::DropOldest);
        for &item in &offers {
            buf.offer(item);
        }
        let expected: Vec<u64> = offers
            .iter()
            .rev()
            .take(capacity)
            .rev()
            .copied()
            .collect();
        prop_assert_eq!(buf.drain(), expected);
    }

    #[test]
    fn drop_newest_keeps_first_capacity_items_in_fifo_order(
        capacity in 1usize..16,
        offers in prop::collection::vec(any::<u64>(), 0..100),
    ) {
        let buf = buffer_with_capacity(capacity, OverflowPolicy::DropNewest);
        for &item in &offers {
            buf.offer(item);
        }
        let expected: Vec<u64> = offers.iter().take(capacity).copied().collect();
        prop_assert_eq!(buf.drain(), expected);
    }
}

#[test]
fn flush_readiness_combines_batch_size_and_age() {
    let config = BufferConfig {
        capacity: 1000,
        overflow_policy: OverflowPolicy::DropOldest,
        batch_size: 100,
        max_age: std::time::Duration::from_millis(30),
    };
    let buf = RingBuffer::new(config, |_item: u64| {});

    for i in 0..10 {
        buf.offer(i);
    }
    assert!(!buf.is_ready_to_flush(), "10 items, no age elapsed: not ready");

    std::thread::sleep(std::time::Duration::from_millis(40));
    assert!(buf.is_ready_to_flush(), "age elapsed with items present: ready");

    let drained = buf.poll_if_ready();
    assert_eq!(drained.len(), 10);
    assert!(!buf.is_ready_to_flush());
}
