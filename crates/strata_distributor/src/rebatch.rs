//! Partition incoming span batches into per-trace writes.
//!
//! Spans arriving in one RPC can belong to many traces, and spans of one
//! trace can be spread over many batches. Storage wants one write unit per
//! trace, so every span is routed to its trace's unit, copying the
//! enclosing resource and scope headers. Headers are never shared between
//! rebatched traces, even when their spans arrived in the same batch.

use std::collections::HashMap;

use bytes::Bytes;

use strata_trace::{AnyValue, KeyValue, ResourceSpans, ScopeSpans, Trace};

/// One per-trace write unit produced by rebatching.
#[derive(Clone, Debug, PartialEq)]
pub struct RebatchedTrace {
    pub id: Bytes,
    pub trace: Trace,
    pub span_count: usize,
    /// Earliest span start, unix seconds.
    pub start_seconds: u32,
    /// Latest span end, unix seconds.
    pub end_seconds: u32,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RebatchError {
    #[error("trace ids must be 128 bit, received {0} bits")]
    InvalidTraceId(usize),
}

/// Ring token for a trace: 32-bit FNV-1 over the tenant id then the trace
/// id. FNV-1 has known collisions at this width; partitioning is keyed by
/// trace id, so a collision only co-locates two traces on the same
/// replicas, it never merges them.
pub fn token_for(tenant: &str, trace_id: &[u8]) -> u32 {
    const OFFSET: u32 = 0x811c9dc5;
    const PRIME: u32 = 0x01000193;
    let mut hash = OFFSET;
    for &b in tenant.as_bytes().iter().chain(trace_id) {
        hash = hash.wrapping_mul(PRIME);
        hash ^= u32::from(b);
    }
    hash
}

/// Split `batches` into one rebatched trace per distinct trace id.
///
/// Along the way every attribute key, and every string attribute value, is
/// capped at `max_attr_bytes` (each truncation counted separately). Returns
/// the ring tokens parallel to the rebatched traces and the truncation
/// count. Trace id validation fails the whole request; nothing partial is
/// returned.
pub fn requests_by_trace_id(
    batches: &[ResourceSpans],
    tenant: &str,
    span_count_hint: usize,
    max_attr_bytes: usize,
) -> Result<(Vec<u32>, Vec<RebatchedTrace>, usize), RebatchError> {
    let mut tokens: Vec<u32> = Vec::new();
    let mut traces: Vec<RebatchedTrace> = Vec::with_capacity(span_count_hint.min(64));
    let mut index_by_id: HashMap<Bytes, usize> = HashMap::new();
    let mut truncated = 0usize;

    for batch in batches {
        let mut resource = batch.resource.clone();
        truncated += truncate_attrs(&mut resource.attributes, max_attr_bytes);

        // Position of this batch's copy inside each touched trace.
        let mut batch_entry: HashMap<usize, usize> = HashMap::new();

        for scope_spans in &batch.scope_spans {
            let mut scope = scope_spans.scope.clone();
            truncated += truncate_attrs(&mut scope.attributes, max_attr_bytes);

            // Position of this scope's copy inside each touched batch entry.
            let mut scope_entry: HashMap<usize, usize> = HashMap::new();

            for span in &scope_spans.spans {
                if span.trace_id.len() != 16 {
                    return Err(RebatchError::InvalidTraceId(span.trace_id.len() * 8));
                }

                let mut span = span.clone();
                truncated += truncate_attrs(&mut span.attributes, max_attr_bytes);
                for event in &mut span.events {
                    truncated += truncate_attrs(&mut event.attributes, max_attr_bytes);
                }
                for link in &mut span.links {
                    truncated += truncate_attrs(&mut link.attributes, max_attr_bytes);
                }

                let trace_index = match index_by_id.get(&span.trace_id) {
                    Some(&i) => i,
                    None => {
                        let i = traces.len();
                        index_by_id.insert(span.trace_id.clone(), i);
                        tokens.push(token_for(tenant, &span.trace_id));
                        traces.push(RebatchedTrace {
                            id: span.trace_id.clone(),
                            trace: Trace::default(),
                            span_count: 0,
                            start_seconds: u32::MAX,
                            end_seconds: 0,
                        });
                        i
                    }
                };

                let start = (span.start_time_unix_nano / 1_000_000_000) as u32;
                let end = (span.end_time_unix_nano / 1_000_000_000) as u32;
                let trace = &mut traces[trace_index];
                trace.span_count += 1;
                trace.start_seconds = trace.start_seconds.min(start);
                trace.end_seconds = trace.end_seconds.max(end);

                let batch_pos = match batch_entry.get(&trace_index) {
                    Some(&pos) => pos,
                    None => {
                        let pos = trace.trace.resource_spans.len();
                        batch_entry.insert(trace_index, pos);
                        trace.trace.resource_spans.push(ResourceSpans {
                            resource: resource.clone(),
                            scope_spans: Vec::new(),
                        });
                        pos
                    }
                };

                let entry = &mut trace.trace.resource_spans[batch_pos];
                let scope_pos = match scope_entry.get(&trace_index) {
                    Some(&pos) => pos,
                    None => {
                        let pos = entry.scope_spans.len();
                        scope_entry.insert(trace_index, pos);
                        entry.scope_spans.push(ScopeSpans {
                            scope: scope.clone(),
                            spans: Vec::new(),
                        });
                        pos
                    }
                };

                entry.scope_spans[scope_pos].spans.push(span);
            }
        }
    }

    Ok((tokens, traces, truncated))
}

/// Cap attribute keys and string values at `max` bytes. Non-string values
/// pass through untouched. Returns how many fields were cut.
fn truncate_attrs(attrs: &mut [KeyValue], max: usize) -> usize {
    let mut count = 0;
    for attr in attrs {
        if attr.key.len() > max {
            truncate_string(&mut attr.key, max);
            count += 1;
        }
        if let AnyValue::Str(value) = &mut attr.value {
            if value.len() > max {
                truncate_string(value, max);
                count += 1;
            }
        }
    }
    count
}

fn truncate_string(s: &mut String, max: usize) {
    let mut cut = max;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_trace::{InstrumentationScope, Resource, Span, SpanEvent, SpanLink};

    const TENANT: &str = "single-tenant";

    fn tid(first: u8) -> Bytes {
        let mut id = [0u8; 16];
        id[0] = first;
        for (i, b) in id.iter_mut().enumerate().skip(1) {
            *b = i as u8;
        }
        Bytes::copy_from_slice(&id)
    }

    fn span(trace_id: Bytes, name: &str, start_s: u64, end_s: u64) -> Span {
        Span {
            trace_id,
            name: name.into(),
            start_time_unix_nano: start_s * 1_000_000_000,
            end_time_unix_nano: end_s * 1_000_000_000,
            ..Default::default()
        }
    }

    fn scope(name: &str, spans: Vec<Span>) -> ScopeSpans {
        ScopeSpans {
            scope: InstrumentationScope {
                name: name.into(),
                version: "0.0.1".into(),
                ..Default::default()
            },
            spans,
        }
    }

    fn batch(dropped: u32, scopes: Vec<ScopeSpans>) -> ResourceSpans {
        ResourceSpans {
            resource: Resource {
                dropped_attributes_count: dropped,
                ..Default::default()
            },
            scope_spans: scopes,
        }
    }

    fn find_trace<'a>(traces: &'a [RebatchedTrace], id: &Bytes) -> &'a RebatchedTrace {
        traces
            .iter()
            .find(|t| &t.id == id)
            .unwrap_or_else(|| panic!("trace {id:?} not found"))
    }

    #[test]
    fn empty_batches_produce_nothing() {
        let (tokens, traces, truncated) =
            requests_by_trace_id(&[ResourceSpans::default(), ResourceSpans::default()], TENANT, 0, 1000)
                .unwrap();
        assert!(tokens.is_empty());
        assert!(traces.is_empty());
        assert_eq!(truncated, 0);
    }

    #[test]
    fn short_trace_id_is_rejected() {
        let batches = [batch(
            0,
            vec![scope(
                "test",
                vec![Span {
                    trace_id: Bytes::from_static(&[0x01]),
                    ..Default::default()
                }],
            )],
        )];
        let err = requests_by_trace_id(&batches, TENANT, 1, 1000).unwrap_err();
        assert_eq!(err, RebatchError::InvalidTraceId(8));
        assert_eq!(
            err.to_string(),
            "trace ids must be 128 bit, received 8 bits"
        );

        let batches = [batch(
            0,
            vec![scope(
                "test",
                vec![Span {
                    trace_id: Bytes::new(),
                    ..Default::default()
                }],
            )],
        )];
        let err = requests_by_trace_id(&batches, TENANT, 1, 1000).unwrap_err();
        assert_eq!(err, RebatchError::InvalidTraceId(0));
    }

    #[test]
    fn one_span_one_trace() {
        let batches = [batch(0, vec![scope("test", vec![span(tid(0x0a), "a", 10, 20)])])];
        let (tokens, traces, _) = requests_by_trace_id(&batches, TENANT, 1, 1000).unwrap();
        assert_eq!(tokens, vec![token_for(TENANT, &tid(0x0a))]);
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].id, tid(0x0a));
        assert_eq!(traces[0].span_count, 1);
        assert_eq!(traces[0].start_seconds, 10);
        assert_eq!(traces[0].end_seconds, 20);
    }

    #[test]
    fn two_traces_in_one_batch_get_separate_headers() {
        let batches = [batch(
            1,
            vec![scope(
                "test",
                vec![span(tid(0x0a), "a", 30, 40), span(tid(0x0b), "b", 50, 60)],
            )],
        )];
        let (tokens, traces, _) = requests_by_trace_id(&batches, TENANT, 2, 1000).unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(traces.len(), 2);

        for trace in &traces {
            // Each rebatched trace carries its own copy of the resource and
            // scope headers.
            assert_eq!(trace.trace.resource_spans.len(), 1);
            let entry = &trace.trace.resource_spans[0];
            assert_eq!(entry.resource.dropped_attributes_count, 1);
            assert_eq!(entry.scope_spans.len(), 1);
            assert_eq!(entry.scope_spans[0].scope.name, "test");
            assert_eq!(entry.scope_spans[0].spans.len(), 1);
        }
        let a = find_trace(&traces, &tid(0x0a));
        assert_eq!(a.trace.resource_spans[0].scope_spans[0].spans[0].name, "a");
        assert_eq!((a.start_seconds, a.end_seconds), (30, 40));
        let b = find_trace(&traces, &tid(0x0b));
        assert_eq!(b.trace.resource_spans[0].scope_spans[0].spans[0].name, "b");
        assert_eq!((b.start_seconds, b.end_seconds), (50, 60));
    }

    #[test]
    fn one_trace_spanning_scopes_stays_in_order() {
        let batches = [batch(
            3,
            vec![scope(
                "test",
                vec![span(tid(0x0b), "spanA", 30, 40), span(tid(0x0b), "spanB", 50, 60)],
            )],
        )];
        let (_, traces, _) = requests_by_trace_id(&batches, TENANT, 2, 1000).unwrap();
        assert_eq!(traces.len(), 1);
        let trace = &traces[0];
        assert_eq!(trace.span_count, 2);
        assert_eq!((trace.start_seconds, trace.end_seconds), (30, 60));
        let names: Vec<&str> = trace.trace.resource_spans[0].scope_spans[0]
            .spans
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["spanA", "spanB"]);
    }

    #[test]
    fn traces_never_combine_across_batches() {
        let batches = [
            batch(
                3,
                vec![scope(
                    "test",
                    vec![
                        span(tid(0x0b), "spanA", 30, 40),
                        span(tid(0x0b), "spanC", 20, 50),
                        span(tid(0x0a), "spanE", 70, 80),
                    ],
                )],
            ),
            batch(
                4,
                vec![scope(
                    "test2",
                    vec![span(tid(0x0b), "spanB", 10, 30), span(tid(0x0a), "spanD", 60, 80)],
                )],
            ),
        ];
        let (tokens, traces, _) = requests_by_trace_id(&batches, TENANT, 5, 1000).unwrap();
        assert_eq!(tokens.len(), traces.len());

        let b = find_trace(&traces, &tid(0x0b));
        assert_eq!(b.span_count, 3);
        assert_eq!((b.start_seconds, b.end_seconds), (10, 50));
        // One resource-spans entry per source batch, in arrival order.
        assert_eq!(b.trace.resource_spans.len(), 2);
        assert_eq!(b.trace.resource_spans[0].resource.dropped_attributes_count, 3);
        assert_eq!(b.trace.resource_spans[1].resource.dropped_attributes_count, 4);
        let batch1_names: Vec<&str> = b.trace.resource_spans[0].scope_spans[0]
            .spans
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(batch1_names, vec!["spanA", "spanC"]);
        let batch2_names: Vec<&str> = b.trace.resource_spans[1].scope_spans[0]
            .spans
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(batch2_names, vec!["spanB"]);

        let a = find_trace(&traces, &tid(0x0a));
        assert_eq!(a.span_count, 2);
        assert_eq!((a.start_seconds, a.end_seconds), (60, 80));
        assert_eq!(a.trace.resource_spans.len(), 2);
    }

    #[test]
    fn fnv_collisions_still_split_traces() {
        // These two trace ids are known to collide under 32-bit FNV-1.
        let collision1 = Bytes::from(
            hex("fd5980503add11f09f80f77608c1b2da"),
        );
        let collision2 = Bytes::from(
            hex("091ea7803ade11f0998a055186ee1243"),
        );
        assert_eq!(token_for("", &collision1), token_for("", &collision2));

        let batches = [batch(
            0,
            vec![scope(
                "test",
                vec![
                    span(collision2.clone(), "spanA", 30, 40),
                    span(collision1.clone(), "spanE", 70, 80),
                ],
            )],
        )];
        let (tokens, traces, _) = requests_by_trace_id(&batches, "", 2, 1000).unwrap();
        // Two distinct rebatched traces despite the shared ring token.
        assert_eq!(traces.len(), 2);
        assert_eq!(tokens[0], tokens[1]);
        assert_eq!(find_trace(&traces, &collision1).span_count, 1);
        assert_eq!(find_trace(&traces, &collision2).span_count, 1);
    }

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn long_attributes_truncate_at_every_level() {
        let max = 100;
        let long = "t".repeat(120);

        let mut sp = span(tid(0x0a), "span", 1, 2);
        sp.attributes = vec![
            KeyValue::new("long value", long.clone()),
            KeyValue::new(long.clone(), "long key"),
        ];
        sp.events = vec![SpanEvent {
            time_unix_nano: 0,
            name: "event".into(),
            attributes: vec![
                KeyValue::new("long value", long.clone()),
                KeyValue::new(long.clone(), "long key"),
            ],
        }];
        sp.links = vec![SpanLink {
            trace_id: tid(0x0a),
            span_id: Bytes::from_static(&[1; 8]),
            attributes: vec![
                KeyValue::new("long value", long.clone()),
                KeyValue::new(long.clone(), "long key"),
            ],
        }];

        let mut rs = batch(0, vec![ScopeSpans {
            scope: InstrumentationScope {
                name: "scope".into(),
                version: "1.0".into(),
                attributes: vec![
                    KeyValue::new("long value", long.clone()),
                    KeyValue::new(long.clone(), "long key"),
                ],
            },
            spans: vec![sp],
        }]);
        rs.resource.attributes = vec![
            KeyValue::new("long value", long.clone()),
            KeyValue::new(long.clone(), "long key"),
        ];

        let (_, traces, truncated) =
            requests_by_trace_id(&[rs], "test", 1, max).unwrap();
        // Two truncations at each of: resource, scope, span, event, link.
        assert_eq!(truncated, 10);

        let trace = &traces[0].trace;
        let want = &long[..max];
        let entry = &trace.resource_spans[0];
        for attrs in [
            &entry.resource.attributes,
            &entry.scope_spans[0].scope.attributes,
            &entry.scope_spans[0].spans[0].attributes,
            &entry.scope_spans[0].spans[0].events[0].attributes,
            &entry.scope_spans[0].spans[0].links[0].attributes,
        ] {
            for attr in attrs.iter() {
                if attr.key == "long value" {
                    assert_eq!(attr.value, AnyValue::Str(want.to_string()));
                }
                if attr.value == AnyValue::Str("long key".to_string()) {
                    assert_eq!(attr.key, want);
                }
            }
        }

        // Truncation is idempotent: rebatching the output cuts nothing.
        let flattened: Vec<ResourceSpans> = trace.resource_spans.clone();
        let (_, _, truncated_again) =
            requests_by_trace_id(&flattened, "test", 1, max).unwrap();
        assert_eq!(truncated_again, 0);
    }

    #[test]
    fn span_counts_are_preserved() {
        let batches = [
            batch(0, vec![scope("s1", vec![
                span(tid(1), "a", 1, 2),
                span(tid(2), "b", 1, 2),
                span(tid(1), "c", 1, 2),
            ])]),
            batch(0, vec![scope("s2", vec![
                span(tid(3), "d", 1, 2),
                span(tid(2), "e", 1, 2),
            ])]),
        ];
        let (_, traces, _) = requests_by_trace_id(&batches, TENANT, 5, 1000).unwrap();
        let total: usize = traces.iter().map(|t| t.span_count).sum();
        assert_eq!(total, 5);
        // Every span of a given trace sits in exactly one rebatched trace.
        assert_eq!(find_trace(&traces, &tid(1)).span_count, 2);
        assert_eq!(find_trace(&traces, &tid(2)).span_count, 2);
        assert_eq!(find_trace(&traces, &tid(3)).span_count, 1);
    }

    #[test]
    fn non_string_values_never_truncate() {
        let mut rs = batch(0, vec![scope("s", vec![span(tid(1), "a", 1, 2)])]);
        rs.scope_spans[0].spans[0].attributes = vec![KeyValue::new("n", 1_234_567_890_i64)];
        let (_, traces, truncated) = requests_by_trace_id(&[rs], TENANT, 1, 4).unwrap();
        assert_eq!(truncated, 0);
        assert_eq!(
            traces[0].trace.resource_spans[0].scope_spans[0].spans[0].attributes[0].value,
            AnyValue::Int(1_234_567_890)
        );
    }
}
