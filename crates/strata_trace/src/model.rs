//! Wire-shaped trace structures.
//!
//! These mirror what arrives over the ingest RPC: batches of resource
//! spans, each holding instrumentation scopes, each holding spans with
//! attributes, events, and links. Both the distributor and the storage
//! schema consume this model.

use bytes::Bytes;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Trace {
    pub resource_spans: Vec<ResourceSpans>,
}

impl Trace {
    pub fn span_count(&self) -> usize {
        self.resource_spans.iter().map(ResourceSpans::span_count).sum()
    }

    /// Estimated encoded size, used for ingestion rate limiting.
    pub fn size_bytes(&self) -> usize {
        self.resource_spans.iter().map(ResourceSpans::size_bytes).sum()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceSpans {
    pub resource: Resource,
    pub scope_spans: Vec<ScopeSpans>,
}

impl ResourceSpans {
    pub fn span_count(&self) -> usize {
        self.scope_spans.iter().map(|s| s.spans.len()).sum()
    }

    pub fn size_bytes(&self) -> usize {
        let mut size = attrs_size(&self.resource.attributes);
        for scope in &self.scope_spans {
            size += scope.scope.name.len() + scope.scope.version.len();
            size += attrs_size(&scope.scope.attributes);
            for span in &scope.spans {
                size += span.size_bytes();
            }
        }
        size
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resource {
    pub attributes: Vec<KeyValue>,
    pub dropped_attributes_count: u32,
}

impl Resource {
    /// The `service.name` attribute, when present.
    pub fn service_name(&self) -> Option<&str> {
        self.attributes.iter().find_map(|kv| match &kv.value {
            AnyValue::Str(s) if kv.key == "service.name" => Some(s.as_str()),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstrumentationScope {
    pub name: String,
    pub version: String,
    pub attributes: Vec<KeyValue>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScopeSpans {
    pub scope: InstrumentationScope,
    pub spans: Vec<Span>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Span {
    pub trace_id: Bytes,
    pub span_id: Bytes,
    pub parent_span_id: Bytes,
    pub name: String,
    pub kind: SpanKind,
    pub status: SpanStatus,
    pub start_time_unix_nano: u64,
    pub end_time_unix_nano: u64,
    pub attributes: Vec<KeyValue>,
    pub events: Vec<SpanEvent>,
    pub links: Vec<SpanLink>,
}

impl Span {
    pub fn duration_nano(&self) -> u64 {
        self.end_time_unix_nano.saturating_sub(self.start_time_unix_nano)
    }

    fn size_bytes(&self) -> usize {
        let mut size = 40 + self.trace_id.len() + self.span_id.len() + self.name.len();
        size += attrs_size(&self.attributes);
        for event in &self.events {
            size += 8 + event.name.len() + attrs_size(&event.attributes);
        }
        for link in &self.links {
            size += link.trace_id.len() + link.span_id.len() + attrs_size(&link.attributes);
        }
        size
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpanEvent {
    pub time_unix_nano: u64,
    pub name: String,
    pub attributes: Vec<KeyValue>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpanLink {
    pub trace_id: Bytes,
    pub span_id: Bytes,
    pub attributes: Vec<KeyValue>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct KeyValue {
    pub key: String,
    pub value: AnyValue,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<AnyValue>) -> Self {
        KeyValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnyValue {
    Str(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    Bytes(Bytes),
}

impl From<&str> for AnyValue {
    fn from(v: &str) -> Self {
        AnyValue::Str(v.to_string())
    }
}

impl From<String> for AnyValue {
    fn from(v: String) -> Self {
        AnyValue::Str(v)
    }
}

impl From<i64> for AnyValue {
    fn from(v: i64) -> Self {
        AnyValue::Int(v)
    }
}

impl From<f64> for AnyValue {
    fn from(v: f64) -> Self {
        AnyValue::Double(v)
    }
}

impl From<bool> for AnyValue {
    fn from(v: bool) -> Self {
        AnyValue::Bool(v)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error,
}

impl SpanStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            SpanStatus::Unset => 0,
            SpanStatus::Ok => 1,
            SpanStatus::Error => 2,
        }
    }

    pub fn from_i64(v: i64) -> SpanStatus {
        match v {
            1 => SpanStatus::Ok,
            2 => SpanStatus::Error,
            _ => SpanStatus::Unset,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SpanKind {
    #[default]
    Unspecified,
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

impl SpanKind {
    pub fn as_i64(self) -> i64 {
        match self {
            SpanKind::Unspecified => 0,
            SpanKind::Internal => 1,
            SpanKind::Server => 2,
            SpanKind::Client => 3,
            SpanKind::Producer => 4,
            SpanKind::Consumer => 5,
        }
    }

    pub fn from_i64(v: i64) -> SpanKind {
        match v {
            1 => SpanKind::Internal,
            2 => SpanKind::Server,
            3 => SpanKind::Client,
            4 => SpanKind::Producer,
            5 => SpanKind::Consumer,
            _ => SpanKind::Unspecified,
        }
    }
}

fn attrs_size(attrs: &[KeyValue]) -> usize {
    attrs
        .iter()
        .map(|kv| {
            kv.key.len()
                + 8
                + match &kv.value {
                    AnyValue::Str(s) => s.len(),
                    AnyValue::Bytes(b) => b.len(),
                    _ => 8,
                }
        })
        .sum()
}
