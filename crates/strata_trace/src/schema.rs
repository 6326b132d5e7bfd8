//! Columnar layout for stored traces.
//!
//! Traces shred into fifteen columns over a four-level row tree:
//! trace (level 0) -> resource (1) -> span (2) -> span attribute (3), with
//! resource attributes as a sibling branch of spans at level 2. Attribute
//! values keep their type in a single value column per scope; keys live in
//! a parallel key column with identical repetition structure. Absent
//! branches emit null placeholders so every column covers the complete row
//! space, which is what keeps seeks aligned across columns.

use std::sync::Arc;

use bytes::Bytes;

use strata_query::{MemRowGroup, RowGroup, Value, ValueKind};

use crate::model::{AnyValue, Trace};

pub(crate) mod columns {
    pub const TRACE_ID: usize = 0;
    pub const TRACE_ROOT_SERVICE: usize = 1;
    pub const TRACE_ROOT_SPAN: usize = 2;
    pub const TRACE_START: usize = 3;
    pub const TRACE_DURATION: usize = 4;
    pub const RESOURCE_ATTR_KEY: usize = 5;
    pub const RESOURCE_ATTR_VALUE: usize = 6;
    pub const SPAN_ID: usize = 7;
    pub const SPAN_NAME: usize = 8;
    pub const SPAN_START: usize = 9;
    pub const SPAN_DURATION: usize = 10;
    pub const SPAN_STATUS: usize = 11;
    pub const SPAN_KIND: usize = 12;
    pub const SPAN_ATTR_KEY: usize = 13;
    pub const SPAN_ATTR_VALUE: usize = 14;
    pub const COLUMN_COUNT: usize = 15;

    pub fn name(column: usize) -> &'static str {
        match column {
            TRACE_ID => "trace.id",
            TRACE_ROOT_SERVICE => "trace.root_service",
            TRACE_ROOT_SPAN => "trace.root_span",
            TRACE_START => "trace.start",
            TRACE_DURATION => "trace.duration",
            RESOURCE_ATTR_KEY => "resource.attr.key",
            RESOURCE_ATTR_VALUE => "resource.attr.value",
            SPAN_ID => "span.id",
            SPAN_NAME => "span.name",
            SPAN_START => "span.start",
            SPAN_DURATION => "span.duration",
            SPAN_STATUS => "span.status",
            SPAN_KIND => "span.kind",
            SPAN_ATTR_KEY => "span.attr.key",
            SPAN_ATTR_VALUE => "span.attr.value",
            _ => "unknown",
        }
    }
}

/// Definition levels of the trace row tree.
pub(crate) const DEF_TRACE: usize = 0;
pub(crate) const DEF_RESOURCE: usize = 1;
pub(crate) const DEF_SPAN: usize = 2;
pub(crate) const DEF_SPAN_ATTR: usize = 3;
pub(crate) const DEF_RESOURCE_ATTR: usize = 2;

/// One stored trace: the wire payload plus the trace-level metadata
/// computed at write time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TraceRecord {
    pub trace_id: Bytes,
    pub root_span_name: String,
    pub root_service_name: String,
    pub start_time_unix_nano: u64,
    pub duration_nano: u64,
    pub trace: Trace,
}

#[derive(Clone, Copy, Debug)]
pub struct BlockConfig {
    /// Traces per row group.
    pub rows_per_row_group: usize,
    /// Rows per page within each column chunk.
    pub rows_per_page: usize,
}

impl Default for BlockConfig {
    fn default() -> Self {
        BlockConfig {
            rows_per_row_group: 1000,
            rows_per_page: 100,
        }
    }
}

/// An immutable columnar block of traces.
pub struct Block {
    row_groups: Vec<Arc<MemRowGroup>>,
}

impl Block {
    pub fn from_records(records: &[TraceRecord], config: &BlockConfig) -> Block {
        let row_groups = records
            .chunks(config.rows_per_row_group.max(1))
            .map(|chunk| shred_row_group(chunk, config.rows_per_page))
            .collect();
        Block { row_groups }
    }

    pub fn row_groups(&self) -> Vec<Arc<dyn RowGroup>> {
        self.row_groups
            .iter()
            .map(|rg| Arc::clone(rg) as Arc<dyn RowGroup>)
            .collect()
    }
}

/// Column under construction: values plus the path of the last one, from
/// which the next value's repetition level is derived (the depth of the
/// first path component that changed).
#[derive(Default)]
struct ColumnShred {
    values: Vec<Value>,
    prev_path: Vec<i32>,
}

impl ColumnShred {
    fn push(&mut self, path: &[i32], kind: ValueKind) {
        let repetition_level = if self.prev_path.is_empty() {
            0
        } else {
            let mut diff = 0;
            for (i, (a, b)) in self.prev_path.iter().zip(path).enumerate() {
                diff = i;
                if a != b {
                    break;
                }
            }
            diff
        };
        let definition_level = path.len() - 1;
        self.values.push(Value::new(
            kind,
            repetition_level as u8,
            definition_level as u8,
        ));
        self.prev_path = path.to_vec();
    }
}

fn value_kind(value: &AnyValue) -> ValueKind {
    match value {
        AnyValue::Str(s) => ValueKind::Bytes(Bytes::from(s.clone())),
        AnyValue::Int(v) => ValueKind::Int(*v),
        AnyValue::Double(v) => ValueKind::Double(*v),
        AnyValue::Bool(v) => ValueKind::Bool(*v),
        AnyValue::Bytes(b) => ValueKind::Bytes(b.clone()),
    }
}

fn bytes_kind(bytes: &Bytes) -> ValueKind {
    ValueKind::Bytes(bytes.clone())
}

fn string_kind(s: &str) -> ValueKind {
    ValueKind::Bytes(Bytes::from(s.to_string()))
}

fn shred_row_group(records: &[TraceRecord], rows_per_page: usize) -> Arc<MemRowGroup> {
    let mut shreds: Vec<ColumnShred> = (0..columns::COLUMN_COUNT)
        .map(|_| ColumnShred::default())
        .collect();

    for (t, record) in records.iter().enumerate() {
        let t = t as i32;
        let trace_path = [t];

        shreds[columns::TRACE_ID].push(&trace_path, bytes_kind(&record.trace_id));
        shreds[columns::TRACE_ROOT_SERVICE].push(&trace_path, string_kind(&record.root_service_name));
        shreds[columns::TRACE_ROOT_SPAN].push(&trace_path, string_kind(&record.root_span_name));
        shreds[columns::TRACE_START]
            .push(&trace_path, ValueKind::Int(record.start_time_unix_nano as i64));
        shreds[columns::TRACE_DURATION].push(&trace_path, ValueKind::Int(record.duration_nano as i64));

        if record.trace.resource_spans.is_empty() {
            for column in [
                columns::RESOURCE_ATTR_KEY,
                columns::RESOURCE_ATTR_VALUE,
                columns::SPAN_ID,
                columns::SPAN_NAME,
                columns::SPAN_START,
                columns::SPAN_DURATION,
                columns::SPAN_STATUS,
                columns::SPAN_KIND,
                columns::SPAN_ATTR_KEY,
                columns::SPAN_ATTR_VALUE,
            ] {
                shreds[column].push(&trace_path, ValueKind::Null);
            }
            continue;
        }

        for (r, batch) in record.trace.resource_spans.iter().enumerate() {
            let r = r as i32;
            let resource_path = [t, r];

            if batch.resource.attributes.is_empty() {
                shreds[columns::RESOURCE_ATTR_KEY].push(&resource_path, ValueKind::Null);
                shreds[columns::RESOURCE_ATTR_VALUE].push(&resource_path, ValueKind::Null);
            } else {
                for (a, kv) in batch.resource.attributes.iter().enumerate() {
                    let attr_path = [t, r, a as i32];
                    shreds[columns::RESOURCE_ATTR_KEY].push(&attr_path, string_kind(&kv.key));
                    shreds[columns::RESOURCE_ATTR_VALUE].push(&attr_path, value_kind(&kv.value));
                }
            }

            // Spans of all scopes flatten into one ordinal space per resource.
            let mut s = 0i32;
            let mut any_span = false;
            for scope in &batch.scope_spans {
                for span in &scope.spans {
                    any_span = true;
                    let span_path = [t, r, s];
                    shreds[columns::SPAN_ID].push(&span_path, bytes_kind(&span.span_id));
                    shreds[columns::SPAN_NAME].push(&span_path, string_kind(&span.name));
                    shreds[columns::SPAN_START]
                        .push(&span_path, ValueKind::Int(span.start_time_unix_nano as i64));
                    shreds[columns::SPAN_DURATION]
                        .push(&span_path, ValueKind::Int(span.duration_nano() as i64));
                    shreds[columns::SPAN_STATUS]
                        .push(&span_path, ValueKind::Int(span.status.as_i64()));
                    shreds[columns::SPAN_KIND].push(&span_path, ValueKind::Int(span.kind.as_i64()));

                    if span.attributes.is_empty() {
                        shreds[columns::SPAN_ATTR_KEY].push(&span_path, ValueKind::Null);
                        shreds[columns::SPAN_ATTR_VALUE].push(&span_path, ValueKind::Null);
                    } else {
                        for (a, kv) in span.attributes.iter().enumerate() {
                            let attr_path = [t, r, s, a as i32];
                            shreds[columns::SPAN_ATTR_KEY].push(&attr_path, string_kind(&kv.key));
                            shreds[columns::SPAN_ATTR_VALUE].push(&attr_path, value_kind(&kv.value));
                        }
                    }
                    s += 1;
                }
            }

            if !any_span {
                for column in [
                    columns::SPAN_ID,
                    columns::SPAN_NAME,
                    columns::SPAN_START,
                    columns::SPAN_DURATION,
                    columns::SPAN_STATUS,
                    columns::SPAN_KIND,
                    columns::SPAN_ATTR_KEY,
                    columns::SPAN_ATTR_VALUE,
                ] {
                    shreds[column].push(&resource_path, ValueKind::Null);
                }
            }
        }
    }

    MemRowGroup::new(
        shreds.into_iter().map(|shred| shred.values).collect(),
        records.len() as u64,
        rows_per_page,
    )
}
