//! Trace data model, columnar trace schema, and the span fetch layer.
//!
//! `model` holds the wire-shaped trace structures shared with the ingest
//! path. `schema` shreds traces into the columnar layout the iterator
//! engine scans, `query` defines the structured fetch request and the
//! spanset results, and `fetch` turns a request into an iterator tree and
//! drives the second-pass attribute projection.

mod fetch;
mod model;
mod query;
mod schema;

pub use fetch::{FetchError, FetchSpansResponse, SpansetIterator};
pub use model::{
    AnyValue, InstrumentationScope, KeyValue, Resource, ResourceSpans, ScopeSpans, Span,
    SpanEvent, SpanKind, SpanLink, SpanStatus, Trace,
};
pub use query::{
    Attribute, AttributeScope, Condition, FetchSpansRequest, FetchSpan, Intrinsic, Op, Spanset,
    Static,
};
pub use schema::{Block, BlockConfig, TraceRecord};
