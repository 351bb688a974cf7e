//! Debug assertion helpers for ring buffer invariants.
//!
//! Only active in debug builds (`debug_assert!` is a no-op in release), so
//! there is zero overhead in release builds.

/// Assert that the current size never exceeds capacity.
///
/// Used after every `offer` and `poll_batch`/`drain` call.
pub(crate) fn assert_bounded(size: usize, capacity: usize) {
    debug_assert!(
        size <= capacity,
        "ring buffer size {size} exceeds capacity {capacity}"
    );
}

/// Assert that dropped items never exceed offered items, so that
/// `accepted = offered - dropped` always stays non-negative.
pub(crate) fn assert_dropped_le_offered(offered: u64, dropped: u64) {
    debug_assert!(
        dropped <= offered,
        "dropped {dropped} exceeds offered {offered}"
    );
}
