//! Rate-limit map: per-category deadlines parsed from response headers.

use crate::category::Category;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Read/write under one mutex owned by the transport; read by the
/// scheduler before drain and by the transport before send.
#[derive(Debug, Default)]
pub struct RateLimitMap {
    deadlines: Mutex<HashMap<Category, Instant>>,
}

impl RateLimitMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A category is rate-limited iff `now < map[category]` OR `now < map[all]`.
    pub fn is_rate_limited(&self, category: Category) -> bool {
        let now = Instant::now();
        let deadlines = self.deadlines.lock().unwrap();
        let specific = deadlines.get(&category).is_some_and(|deadline| now < *deadline);
        let blanket = deadlines.get(&Category::All).is_some_and(|deadline| now < *deadline);
        specific || blanket
    }

    /// Merges a single (category, deadline) pair: keeps the later deadline.
    pub fn merge(&self, category: Category, deadline: Instant) {
        let mut deadlines = self.deadlines.lock().unwrap();
        deadlines
            .entry(category)
            .and_modify(|existing| {
                if deadline > *existing {
                    *existing = deadline;
                }
            })
            .or_insert(deadline);
    }

    fn merge_all(&self, entries: impl IntoIterator<Item = (Category, Instant)>) {
        for (category, deadline) in entries {
            self.merge(category, deadline);
        }
    }

    /// Parses `X-Sentry-Rate-Limits` and merges every resulting deadline.
    pub fn apply_rate_limits_header(&self, header: &str, now: Instant) {
        self.merge_all(parse_rate_limits_header(header, now));
    }

    /// Parses `Retry-After` (only consulted on HTTP 429 when the sentry
    /// header is absent) and merges the resulting blanket deadline.
    pub fn apply_retry_after_header(&self, header: &str, now: Instant) {
        self.merge(Category::All, parse_retry_after(header, now));
    }

    /// Convenience used by both transports: apply whichever header the
    /// response actually carried.
    pub fn apply_response_headers(
        &self,
        status: u16,
        rate_limits_header: Option<&str>,
        retry_after_header: Option<&str>,
        now: Instant,
    ) {
        if let Some(header) = rate_limits_header {
            self.apply_rate_limits_header(header, now);
        } else if status == 429 {
            if let Some(header) = retry_after_header {
                self.apply_retry_after_header(header, now);
            }
        }
    }
}

/// `retry_s:categories:scope:reason` groups, comma-separated; categories
/// semicolon-separated; empty/missing categories apply to `all`; unknown
/// categories are ignored; `retry_s` must be a positive integer.
pub fn parse_rate_limits_header(header: &str, now: Instant) -> Vec<(Category, Instant)> {
    let mut out = Vec::new();
    for group in header.split(',') {
        let group = group.trim();
        if group.is_empty() {
            continue;
        }
        let mut parts = group.splitn(4, ':');
        let Some(retry_s) = parts.next().and_then(|s| s.trim().parse::<u64>().ok()) else {
            continue;
        };
        let deadline = now + Duration::from_secs(retry_s);
        let categories_field = parts.next().unwrap_or("").trim();
        if categories_field.is_empty() {
            out.push((Category::All, deadline));
            continue;
        }
        for name in categories_field.split(';') {
            if let Some(category) = Category::from_wire_name(name.trim()) {
                out.push((category, deadline));
            }
        }
    }
    out
}

/// Fractional seconds value; any fractional part rounds up to the next
/// whole second; negatives/NaN/infinities/overflow all map to `now + 0s`.
pub fn parse_retry_after(value: &str, now: Instant) -> Instant {
    let parsed: f64 = value.trim().parse().unwrap_or(f64::NAN);
    let seconds: u64 = if !parsed.is_finite() || parsed < 0.0 {
        0
    } else {
        let ceil = parsed.ceil();
        if ceil > u64::MAX as f64 {
            0
        } else {
            ceil as u64
        }
    };
    now + Duration::from_secs(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs_between(a: Instant, b: Instant) -> i64 {
        if b >= a {
            b.duration_since(a).as_secs() as i64
        } else {
            -(a.duration_since(b).as_secs() as i64)
        }
    }

    #[test]
    fn single_category_deadline() {
        let t0 = Instant::now();
        let parsed = parse_rate_limits_header("4:error", t0);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].0, Category::Error);
        assert_eq!(secs_between(t0, parsed[0].1), 4);
    }

    #[test]
    fn semicolon_separated_categories_share_deadline() {
        let t0 = Instant::now();
        let parsed = parse_rate_limits_header("5:error;transaction", t0);
        assert_eq!(parsed.len(), 2);
        assert!(parsed.iter().all(|(_, d)| secs_between(t0, *d) == 5));
        assert!(parsed.iter().any(|(c, _)| *c == Category::Error));
        assert!(parsed.iter().any(|(c, _)| *c == Category::Transaction));
    }

    #[test]
    fn later_deadline_wins_regardless_of_scope() {
        let t0 = Instant::now();
        let map = RateLimitMap::new();
        map.apply_rate_limits_header("30:error:scope1, 20:error:scope2, 40:error", t0);
        let deadlines = map.deadlines.lock().unwrap();
        assert_eq!(secs_between(t0, deadlines[&Category::Error]), 40);
    }

    #[test]
    fn missing_categories_apply_to_all() {
        let t0 = Instant::now();
        let map = RateLimitMap::new();
        map.apply_rate_limits_header("30:error, 40::", t0);
        let deadlines = map.deadlines.lock().unwrap();
        assert_eq!(secs_between(t0, deadlines[&Category::Error]), 30);
        assert_eq!(secs_between(t0, deadlines[&Category::All]), 40);
    }

    #[test]
    fn retry_after_rounds_fractional_seconds_up() {
        let t0 = Instant::now();
        let deadline = parse_retry_after("3.1", t0);
        assert_eq!(secs_between(t0, deadline), 4);
    }

    #[test]
    fn retry_after_invalid_values_map_to_zero() {
        let t0 = Instant::now();
        for value in ["-1", "Inf", "NaN", "garbage"] {
            let deadline = parse_retry_after(value, t0);
            assert_eq!(secs_between(t0, deadline), 0, "value={value}");
        }
    }

    #[test]
    fn is_rate_limited_checks_specific_and_blanket() {
        let map = RateLimitMap::new();
        let now = Instant::now();
        map.merge(Category::Error, now + Duration::from_secs(60));
        assert!(map.is_rate_limited(Category::Error));
        assert!(!map.is_rate_limited(Category::Monitor));

        map.merge(Category::All, now + Duration::from_secs(60));
        assert!(map.is_rate_limited(Category::Monitor));
    }

    #[test]
    fn expired_deadline_is_not_rate_limited() {
        let map = RateLimitMap::new();
        map.merge(Category::Error, Instant::now() - Duration::from_secs(1));
        assert!(!map.is_rate_limited(Category::Error));
    }
}
