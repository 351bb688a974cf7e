//! Small shared helpers that don't belong to any one module.

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Current time formatted as an RFC 3339 timestamp, used for the
/// envelope header's `sent_at` field and the client report's timestamp.
pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
