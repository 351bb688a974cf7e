//! Envelope wire format: newline-separated JSON records framing
//! heterogeneous telemetry items into a single HTTP POST body.

use crate::item::{EventId, Item, SdkInfo, TraceContext};
use serde_json::{json, Value};
use thiserror::Error;

/// Envelope header: identifies the batch and optionally echoes SDK/trace
/// metadata shared by every item in it.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeHeader {
    pub event_id: Option<EventId>,
    pub sent_at: Option<String>,
    pub dsn: Option<String>,
    pub sdk_info: Option<SdkInfo>,
    pub trace_context: Option<TraceContext>,
}

/// One item's header plus its payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeItem {
    pub item_type: String,
    pub payload: Vec<u8>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub item_count: Option<usize>,
    pub span_count: Option<u32>,
}

impl EnvelopeItem {
    pub fn from_item(item: &Item) -> Self {
        let (filename, content_type) = match &item.kind {
            crate::item::ItemKind::Attachment { filename, content_type } => {
                (Some(filename.clone()), content_type.clone())
            }
            _ => (None, None),
        };
        let span_count = match &item.kind {
            crate::item::ItemKind::Transaction { span_count } => Some(*span_count),
            _ => None,
        };
        Self {
            item_type: item.kind.wire_type().to_string(),
            payload: item.payload.clone(),
            filename,
            content_type,
            item_count: None,
            span_count,
        }
    }

    /// Combines several log-record items' payloads into one batched
    /// `log` envelope item, per §4.4 step 5: "logs batch into a single
    /// envelope-item".
    pub fn log_batch(items: &[Item]) -> Self {
        let bodies: Vec<Value> = items
            .iter()
            .map(|item| serde_json::from_slice(&item.payload).unwrap_or(Value::Null))
            .collect();
        let payload = serde_json::to_vec(&json!({ "items": bodies })).unwrap_or_default();
        Self {
            item_type: "log".to_string(),
            payload,
            filename: None,
            content_type: None,
            item_count: Some(items.len()),
            span_count: None,
        }
    }
}

/// A header plus an ordered list of items, ready to encode or just decoded.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    pub header: EnvelopeHeader,
    pub items: Vec<EnvelopeItem>,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unexpected end of envelope")]
    UnexpectedEof,
    #[error("invalid header JSON: {0}")]
    InvalidHeaderJson(#[from] serde_json::Error),
    #[error("item payload truncated: expected {expected} bytes, found {found}")]
    TruncatedPayload { expected: usize, found: usize },
    #[error("missing newline terminator after item payload")]
    MissingNewlineAfterPayload,
}

impl Envelope {
    pub fn new(header: EnvelopeHeader, items: Vec<EnvelopeItem>) -> Self {
        Self { header, items }
    }

    /// Writes the envelope header, then for each item its header, a
    /// newline, the payload bytes, and a trailing newline. The `length`
    /// field is always emitted — not just when the payload contains
    /// internal newlines — so decode never needs to guess.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut header = json!({});
        if let Some(event_id) = &self.header.event_id {
            header["event_id"] = json!(event_id.as_hex());
        }
        if let Some(sent_at) = &self.header.sent_at {
            header["sent_at"] = json!(sent_at);
        }
        if let Some(dsn) = &self.header.dsn {
            header["dsn"] = json!(dsn);
        }
        if let Some(sdk) = &self.header.sdk_info {
            header["sdk"] = json!({ "name": sdk.name, "version": sdk.version });
        }
        if let Some(trace) = &self.header.trace_context {
            let mut trace_obj = json!({ "trace_id": trace.trace_id });
            for (k, v) in trace.dsc.iter() {
                trace_obj[k] = json!(v);
            }
            header["trace"] = trace_obj;
        }
        out.extend_from_slice(header.to_string().as_bytes());
        out.push(b'\n');

        for item in &self.items {
            let mut item_header = json!({ "type": item.item_type, "length": item.payload.len() });
            if let Some(filename) = &item.filename {
                item_header["filename"] = json!(filename);
            }
            if let Some(content_type) = &item.content_type {
                item_header["content_type"] = json!(content_type);
            }
            if let Some(item_count) = item.item_count {
                item_header["item_count"] = json!(item_count);
            }
            if let Some(span_count) = item.span_count {
                item_header["span_count"] = json!(span_count);
            }
            out.extend_from_slice(item_header.to_string().as_bytes());
            out.push(b'\n');
            out.extend_from_slice(&item.payload);
            out.push(b'\n');
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut pos = 0usize;
        let header_line = read_line(bytes, &mut pos).ok_or(CodecError::UnexpectedEof)?;
        let header_value: Value = serde_json::from_slice(header_line)?;
        let header = EnvelopeHeader {
            event_id: header_value
                .get("event_id")
                .and_then(Value::as_str)
                .and_then(EventId::from_hex),
            sent_at: header_value.get("sent_at").and_then(Value::as_str).map(str::to_string),
            dsn: header_value.get("dsn").and_then(Value::as_str).map(str::to_string),
            sdk_info: header_value.get("sdk").and_then(|sdk| {
                Some(SdkInfo {
                    name: sdk.get("name")?.as_str()?.to_string(),
                    version: sdk.get("version")?.as_str()?.to_string(),
                })
            }),
            trace_context: header_value.get("trace").and_then(|trace| {
                let trace_id = trace.get("trace_id")?.as_str()?.to_string();
                let mut dsc = crate::item::Dsc::new();
                if let Some(obj) = trace.as_object() {
                    for (k, v) in obj {
                        if k == "trace_id" {
                            continue;
                        }
                        if let Some(s) = v.as_str() {
                            let _ = dsc.insert(k.clone(), s.to_string());
                        }
                    }
                }
                Some(TraceContext { trace_id, dsc })
            }),
        };

        let mut items = Vec::new();
        loop {
            let Some(item_header_line) = read_line(bytes, &mut pos) else {
                break;
            };
            if item_header_line.is_empty() {
                break;
            }
            let item_header_value: Value = serde_json::from_slice(item_header_line)?;
            let item_type = item_header_value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let length = item_header_value.get("length").and_then(Value::as_u64).map(|n| n as usize);
            let filename = item_header_value.get("filename").and_then(Value::as_str).map(str::to_string);
            let content_type = item_header_value
                .get("content_type")
                .and_then(Value::as_str)
                .map(str::to_string);
            let item_count = item_header_value.get("item_count").and_then(Value::as_u64).map(|n| n as usize);

            let payload = match length {
                Some(expected) => {
                    if pos + expected > bytes.len() {
                        return Err(CodecError::TruncatedPayload {
                            expected,
                            found: bytes.len() - pos,
                        });
                    }
                    let payload = bytes[pos..pos + expected].to_vec();
                    pos += expected;
                    if bytes.get(pos) != Some(&b'\n') {
                        return Err(CodecError::MissingNewlineAfterPayload);
                    }
                    pos += 1;
                    payload
                }
                None => read_line(bytes, &mut pos).ok_or(CodecError::UnexpectedEof)?.to_vec(),
            };

            let span_count = item_header_value.get("span_count").and_then(Value::as_u64).map(|n| n as u32);

            items.push(EnvelopeItem {
                item_type,
                payload,
                filename,
                content_type,
                item_count,
                span_count,
            });
        }

        Ok(Self { header, items })
    }

    /// Derives the primary category per §4.7: the first non-attachment,
    /// non-client-report item decides; empty/attachment-only -> `all`.
    pub fn primary_category(&self) -> crate::category::Category {
        use crate::category::Category;
        for item in &self.items {
            match item.item_type.as_str() {
                "event" => return Category::Error,
                "transaction" => return Category::Transaction,
                "check_in" => return Category::Monitor,
                "log" => return Category::Log,
                _ => continue,
            }
        }
        Category::All
    }
}

fn read_line<'a>(bytes: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
    if *pos > bytes.len() {
        return None;
    }
    if *pos == bytes.len() {
        return None;
    }
    let rest = &bytes[*pos..];
    match rest.iter().position(|&b| b == b'\n') {
        Some(newline_at) => {
            let line = &rest[..newline_at];
            *pos += newline_at + 1;
            Some(line)
        }
        None => None,
    }
}
