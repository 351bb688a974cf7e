//! The telemetry item: a tagged sum type for everything the core buffers,
//! schedules and ships.

use crate::category::Category;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// 32-hex-digit identifier, UUIDv4-shaped: version nibble `0x4`, RFC 4122
/// variant bits `0b10`. `uuid::Uuid::new_v4` already produces exactly this
/// bit layout, so this type is a thin wrapper rather than a hand-rolled
/// generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(Uuid);

impl EventId {
    /// Generates a new random event id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Renders as 32 lowercase hex digits, no dashes.
    pub fn as_hex(&self) -> String {
        self.0.simple().to_string()
    }

    /// Parses 32 hex digits (dashes optional) back into an `EventId`.
    pub fn from_hex(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    pub(crate) fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_hex())
    }
}

/// Raised when a mutation is attempted against a frozen [`Dsc`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("dynamic sampling context is frozen and can no longer be mutated")]
pub struct DscFrozenError;

/// Dynamic sampling context: a key/value trace-metadata mapping that
/// becomes immutable once frozen by the first outbound propagation.
///
/// Backed by a `BTreeMap` rather than a `HashMap` so iteration order (and
/// therefore envelope-header serialization) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dsc {
    values: BTreeMap<String, String>,
    frozen: bool,
}

impl Dsc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Idempotent: freezing an already-frozen `Dsc` is a no-op.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), DscFrozenError> {
        if self.frozen {
            return Err(DscFrozenError);
        }
        self.values.insert(key.into(), value.into());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Trace id plus the dynamic sampling context propagated alongside it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: String,
    pub dsc: Dsc,
}

/// SDK name and version, echoed in the envelope header and auth header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkInfo {
    pub name: String,
    pub version: String,
}

/// The variant-specific data every item carries, beyond its common fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    Event,
    Transaction { span_count: u32 },
    CheckIn,
    LogRecord,
    ClientReport,
    Attachment { filename: String, content_type: Option<String> },
}

impl ItemKind {
    pub fn category(&self) -> Category {
        match self {
            Self::Event => Category::Error,
            Self::Transaction { .. } => Category::Transaction,
            Self::CheckIn => Category::Monitor,
            Self::LogRecord => Category::Log,
            Self::ClientReport => Category::ClientReport,
            Self::Attachment { .. } => Category::All,
        }
    }

    pub fn wire_type(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Transaction { .. } => "transaction",
            Self::CheckIn => "check_in",
            Self::LogRecord => "log",
            Self::ClientReport => "client_report",
            Self::Attachment { .. } => "attachment",
        }
    }
}

/// One telemetry record. Immutable once constructed — `payload` is the
/// canonical JSON serialization computed at construction time, matching
/// the design note that items arrive at the buffer already serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub kind: ItemKind,
    pub event_id: EventId,
    pub payload: Vec<u8>,
    pub sdk_info: Option<SdkInfo>,
    pub trace_context: Option<TraceContext>,
}

impl Item {
    /// Builds an item whose payload is the canonical JSON encoding of
    /// `value`, serialized once, here.
    pub fn new<T: Serialize>(kind: ItemKind, value: &T) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_vec(value)?;
        Ok(Self {
            kind,
            event_id: EventId::generate(),
            payload,
            sdk_info: None,
            trace_context: None,
        })
    }

    /// Builds an item directly from already-serialized JSON bytes.
    pub fn from_raw_payload(kind: ItemKind, payload: Vec<u8>) -> Self {
        Self {
            kind,
            event_id: EventId::generate(),
            payload,
            sdk_info: None,
            trace_context: None,
        }
    }

    pub fn category(&self) -> Category {
        self.kind.category()
    }

    pub fn with_sdk_info(mut self, sdk_info: SdkInfo) -> Self {
        self.sdk_info = Some(sdk_info);
        self
    }

    pub fn with_trace_context(mut self, trace_context: TraceContext) -> Self {
        self.trace_context = Some(trace_context);
        self
    }

    /// Byte length of `payload` — used for `log_byte` accounting and for
    /// the item header's `length` field.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_is_uuid_v4_shaped() {
        for _ in 0..1000 {
            let id = EventId::generate();
            let hex = id.as_hex();
            assert_eq!(hex.len(), 32);
            assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
            let bytes = id.0.as_bytes();
            assert_eq!(bytes[6] & 0xf0, 0x40);
            assert_eq!(bytes[8] & 0xc0, 0x80);
        }
    }

    #[test]
    fn frozen_dsc_rejects_mutation() {
        let mut dsc = Dsc::new();
        dsc.insert("trace_id", "abc").unwrap();
        dsc.freeze();
        assert!(dsc.insert("trace_id", "def").is_err());
        dsc.freeze(); // idempotent
        assert!(dsc.is_frozen());
    }
}
