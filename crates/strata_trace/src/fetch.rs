//! Span fetch: structured query -> iterator tree -> lazy spansets.
//!
//! The tree has three tiers. Span-scope conditions combine at the span
//! level (a union when conditions are OR'ed, joint required children when
//! all must match) together with the always-read static span columns.
//! Resource-scope conditions attach at the resource level through a left
//! join with the span iterator required. The trace level left-joins the
//! resource iterator with the trace metadata columns. Collectors hung off
//! each join as group predicates assemble spans, batches, and finally
//! spansets, carried upward through the results' opaque entries.
//!
//! Projection-only conditions resolve in a second pass: each one
//! synthesizes a select-as lookup over the same row groups, seeks it to
//! every emitted span's row number, and splices what it finds into the
//! span's attribute lists.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use strata_query::{
    BoolPredicate, BytesPredicate, CmpOp, EntryKey, FloatPredicate, GroupPredicate, IntPredicate,
    IteratorResult, JoinIterator, LeftJoinIterator, NonNullPredicate, Predicate, RegexPredicate,
    ResultPool, RowGroup, RowIterator, RowNumber, ScanError, SyncIterator, SyncOptions,
    UnionIterator, Value, ValueKind,
};

use crate::model::{SpanKind, SpanStatus};
use crate::query::{
    Attribute, AttributeScope, Condition, FetchSpan, FetchSpansRequest, Intrinsic, Op, Spanset,
    Static,
};
use crate::schema::{columns, Block, DEF_RESOURCE, DEF_RESOURCE_ATTR, DEF_SPAN, DEF_SPAN_ATTR, DEF_TRACE};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid fetch request: {0}")]
    InvalidRequest(String),

    #[error("fetch cancelled")]
    Cancelled,

    #[error(transparent)]
    Scan(ScanError),

    #[error("internal fetch error: {0}")]
    Internal(String),
}

impl From<ScanError> for FetchError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Cancelled => FetchError::Cancelled,
            other => FetchError::Scan(other),
        }
    }
}

// Entry keys for the well-known columns. Attribute lookups use the raw
// attribute name; the colon prefix keeps these out of that namespace.
const KEY_SPAN_ID: &str = "Span:ID";
const KEY_SPAN_START: &str = "Span:StartUnixNanos";
const KEY_SPAN_DURATION: &str = "Span:DurationNanos";
const KEY_INTRINSIC_DURATION: &str = "Span:Duration";
const KEY_INTRINSIC_NAME: &str = "Span:Name";
const KEY_INTRINSIC_STATUS: &str = "Span:Status";
const KEY_INTRINSIC_KIND: &str = "Span:Kind";
const KEY_TRACE_ID: &str = "Trace:ID";
const KEY_TRACE_ROOT_SERVICE: &str = "Trace:RootService";
const KEY_TRACE_ROOT_SPAN: &str = "Trace:RootSpan";
const KEY_TRACE_START: &str = "Trace:StartUnixNanos";
const KEY_TRACE_DURATION: &str = "Trace:DurationNanos";

// Opaque payload keys used to carry assembled results up the tree.
const KEY_SPAN_PAYLOAD: &str = "__span";
const KEY_BATCH_PAYLOAD: &str = "__batch";
const KEY_SPANSET_PAYLOAD: &str = "__spanset";

/// Result stream of a fetch. Close (or drop) to release held resources.
pub struct FetchSpansResponse {
    pub results: SpansetIterator,
}

impl Block {
    pub fn fetch(&self, request: &FetchSpansRequest) -> Result<FetchSpansResponse, FetchError> {
        self.fetch_with_cancel(request, None)
    }

    pub fn fetch_with_cancel(
        &self,
        request: &FetchSpansRequest,
        cancel: Option<CancellationToken>,
    ) -> Result<FetchSpansResponse, FetchError> {
        let results = build_spanset_iterator(self, request, cancel)?;
        Ok(FetchSpansResponse { results })
    }
}

fn cmp_op(op: Op) -> Result<CmpOp, FetchError> {
    match op {
        Op::Eq => Ok(CmpOp::Eq),
        Op::NotEq => Ok(CmpOp::NotEq),
        Op::Gt => Ok(CmpOp::Gt),
        Op::Gte => Ok(CmpOp::Gte),
        Op::Lt => Ok(CmpOp::Lt),
        Op::Lte => Ok(CmpOp::Lte),
        other => Err(FetchError::InvalidRequest(format!(
            "operator {other:?} is not a comparison"
        ))),
    }
}

/// The column predicate for a condition, or `None` for projection-only.
fn condition_predicate(cond: &Condition) -> Result<Option<Box<dyn Predicate>>, FetchError> {
    if cond.op == Op::None {
        return Ok(None);
    }
    let operand = cond.operands.first().ok_or_else(|| {
        FetchError::InvalidRequest(format!(
            "operator {:?} on {} requires an operand",
            cond.op, cond.attribute
        ))
    })?;

    // Presence: `!= nil` keeps any defined value.
    if cond.op == Op::NotEq && operand.is_nil() {
        return Ok(Some(Box::new(NonNullPredicate)));
    }

    let pred: Box<dyn Predicate> = match operand {
        Static::Str(s) => match cond.op {
            Op::Eq => Box::new(BytesPredicate::equal(s.clone())),
            Op::NotEq => Box::new(BytesPredicate::not_equal(s.clone())),
            Op::Regex => Box::new(
                RegexPredicate::matching(s)
                    .map_err(|e| FetchError::InvalidRequest(format!("bad regex {s:?}: {e}")))?,
            ),
            Op::NotRegex => Box::new(
                RegexPredicate::not_matching(s)
                    .map_err(|e| FetchError::InvalidRequest(format!("bad regex {s:?}: {e}")))?,
            ),
            other => {
                return Err(FetchError::InvalidRequest(format!(
                    "operator {other:?} is not defined on strings"
                )))
            }
        },
        Static::Int(v) => Box::new(IntPredicate {
            op: cmp_op(cond.op)?,
            operand: *v,
        }),
        // Durations compare as integer nanoseconds to avoid float error.
        Static::Duration(d) => Box::new(IntPredicate {
            op: cmp_op(cond.op)?,
            operand: d.as_nanos() as i64,
        }),
        Static::Float(v) => Box::new(FloatPredicate {
            op: cmp_op(cond.op)?,
            operand: *v,
        }),
        Static::Bool(b) => match cond.op {
            Op::Eq => Box::new(BoolPredicate {
                operand: *b,
                negate: false,
            }),
            Op::NotEq => Box::new(BoolPredicate {
                operand: *b,
                negate: true,
            }),
            other => {
                return Err(FetchError::InvalidRequest(format!(
                    "operator {other:?} is not defined on booleans"
                )))
            }
        },
        Static::Status(s) => Box::new(IntPredicate {
            op: cmp_op(cond.op)?,
            operand: s.as_i64(),
        }),
        Static::Kind(k) => Box::new(IntPredicate {
            op: cmp_op(cond.op)?,
            operand: k.as_i64(),
        }),
        Static::Nil => {
            return Err(FetchError::InvalidRequest(
                "nil operand is only valid with !=".into(),
            ))
        }
    };
    Ok(Some(pred))
}

fn static_from_value(value: &Value) -> Static {
    match &value.kind {
        ValueKind::Null => Static::Nil,
        ValueKind::Int(v) => Static::Int(*v),
        ValueKind::Double(v) => Static::Float(*v),
        ValueKind::Bool(v) => Static::Bool(*v),
        ValueKind::Bytes(b) => Static::Str(String::from_utf8_lossy(b).into_owned()),
    }
}

fn string_from_value(value: &Value) -> String {
    value
        .as_bytes()
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .unwrap_or_default()
}

#[derive(Clone, Copy)]
enum AttrSide {
    Span,
    Resource,
}

struct IterBuilder {
    row_groups: Vec<Arc<dyn RowGroup>>,
    pool: Arc<ResultPool>,
    cancel: Option<CancellationToken>,
}

impl IterBuilder {
    fn column(
        &self,
        column: usize,
        predicate: Option<Box<dyn Predicate>>,
        select_as: Option<EntryKey>,
        max_definition_level: usize,
        intern: bool,
    ) -> Box<dyn RowIterator> {
        Box::new(SyncIterator::new(
            self.row_groups.clone(),
            column,
            SyncOptions {
                predicate,
                select_as,
                column_name: columns::name(column).to_string(),
                max_definition_level,
                intern,
                pool: Some(Arc::clone(&self.pool)),
                cancel: self.cancel.clone(),
                ..Default::default()
            },
        ))
    }

    /// An attribute lookup: the key column filtered to `name` inner-joined
    /// with the value column at the attribute level. The join aligns the
    /// two columns, so a result means this attribute entry both has the
    /// wanted key and passes the value predicate.
    fn attr(
        &self,
        side: AttrSide,
        name: &str,
        value_predicate: Option<Box<dyn Predicate>>,
    ) -> Box<dyn RowIterator> {
        let (key_column, value_column, level) = match side {
            AttrSide::Span => (columns::SPAN_ATTR_KEY, columns::SPAN_ATTR_VALUE, DEF_SPAN_ATTR),
            AttrSide::Resource => (
                columns::RESOURCE_ATTR_KEY,
                columns::RESOURCE_ATTR_VALUE,
                DEF_RESOURCE_ATTR,
            ),
        };
        let key_iter = self.column(
            key_column,
            Some(Box::new(BytesPredicate::equal(name.to_string()))),
            None,
            level,
            false,
        );
        let value_iter = self.column(
            value_column,
            Some(value_predicate.unwrap_or_else(|| Box::new(NonNullPredicate))),
            Some(name.into()),
            level,
            false,
        );
        Box::new(
            JoinIterator::new(level, vec![key_iter, value_iter], None)
                .with_pool(Arc::clone(&self.pool)),
        )
    }
}

fn build_spanset_iterator(
    block: &Block,
    request: &FetchSpansRequest,
    cancel: Option<CancellationToken>,
) -> Result<SpansetIterator, FetchError> {
    let pool = ResultPool::shared();
    let builder = IterBuilder {
        row_groups: block.row_groups(),
        pool: Arc::clone(&pool),
        cancel,
    };

    let mut span_cond_iters: Vec<Box<dyn RowIterator>> = Vec::new();
    let mut span_lookup_names: Vec<String> = Vec::new();
    let mut resource_required: Vec<Box<dyn RowIterator>> = Vec::new();
    let mut resource_optional: Vec<Box<dyn RowIterator>> = Vec::new();
    let mut resource_lookup_names: Vec<String> = Vec::new();
    let mut trace_cond_iters: Vec<Box<dyn RowIterator>> = Vec::new();

    for cond in &request.conditions {
        match cond.attribute.scope {
            AttributeScope::Intrinsic => {
                let intrinsic = cond.attribute.intrinsic.ok_or_else(|| {
                    FetchError::InvalidRequest(format!(
                        "intrinsic-scoped attribute {} without an intrinsic kind",
                        cond.attribute
                    ))
                })?;
                match intrinsic {
                    Intrinsic::Duration => span_cond_iters.push(builder.column(
                        columns::SPAN_DURATION,
                        condition_predicate(cond)?,
                        Some(KEY_INTRINSIC_DURATION.into()),
                        DEF_SPAN,
                        false,
                    )),
                    Intrinsic::Name => span_cond_iters.push(builder.column(
                        columns::SPAN_NAME,
                        condition_predicate(cond)?,
                        Some(KEY_INTRINSIC_NAME.into()),
                        DEF_SPAN,
                        true,
                    )),
                    Intrinsic::Status => span_cond_iters.push(builder.column(
                        columns::SPAN_STATUS,
                        condition_predicate(cond)?,
                        Some(KEY_INTRINSIC_STATUS.into()),
                        DEF_SPAN,
                        false,
                    )),
                    Intrinsic::Kind => span_cond_iters.push(builder.column(
                        columns::SPAN_KIND,
                        condition_predicate(cond)?,
                        Some(KEY_INTRINSIC_KIND.into()),
                        DEF_SPAN,
                        false,
                    )),
                    Intrinsic::SpanId => {
                        // Projection is covered by the static id column; only
                        // a real filter needs its own iterator.
                        if cond.op != Op::None {
                            span_cond_iters.push(builder.column(
                                columns::SPAN_ID,
                                condition_predicate(cond)?,
                                Some(KEY_SPAN_ID.into()),
                                DEF_SPAN,
                                false,
                            ));
                        }
                    }
                    Intrinsic::TraceRootService => trace_cond_iters.push(builder.column(
                        columns::TRACE_ROOT_SERVICE,
                        condition_predicate(cond)?,
                        Some(KEY_TRACE_ROOT_SERVICE.into()),
                        DEF_TRACE,
                        true,
                    )),
                    Intrinsic::TraceRootSpan => trace_cond_iters.push(builder.column(
                        columns::TRACE_ROOT_SPAN,
                        condition_predicate(cond)?,
                        Some(KEY_TRACE_ROOT_SPAN.into()),
                        DEF_TRACE,
                        true,
                    )),
                    Intrinsic::TraceDuration => trace_cond_iters.push(builder.column(
                        columns::TRACE_DURATION,
                        condition_predicate(cond)?,
                        Some(KEY_TRACE_DURATION.into()),
                        DEF_TRACE,
                        false,
                    )),
                }
            }
            AttributeScope::Span => {
                span_lookup_names.push(cond.attribute.name.clone());
                span_cond_iters.push(builder.attr(
                    AttrSide::Span,
                    &cond.attribute.name,
                    condition_predicate(cond)?,
                ));
            }
            AttributeScope::Resource => {
                resource_lookup_names.push(cond.attribute.name.clone());
                let iter = builder.attr(
                    AttrSide::Resource,
                    &cond.attribute.name,
                    condition_predicate(cond)?,
                );
                if request.all_conditions {
                    resource_required.push(iter);
                } else {
                    resource_optional.push(iter);
                }
            }
            AttributeScope::None => {
                // Unscoped: search both sides.
                span_lookup_names.push(cond.attribute.name.clone());
                resource_lookup_names.push(cond.attribute.name.clone());
                let span_iter =
                    builder.attr(AttrSide::Span, &cond.attribute.name, condition_predicate(cond)?);
                let resource_iter = builder.attr(
                    AttrSide::Resource,
                    &cond.attribute.name,
                    condition_predicate(cond)?,
                );
                if request.all_conditions {
                    // Either side may satisfy the condition; align the pair
                    // at resource granularity.
                    resource_required.push(Box::new(
                        UnionIterator::new(DEF_RESOURCE, vec![span_iter, resource_iter], None)
                            .with_pool(Arc::clone(&pool)),
                    ));
                } else {
                    span_cond_iters.push(span_iter);
                    resource_optional.push(resource_iter);
                }
            }
        }
    }

    // With OR semantics a batch only survives when something actually
    // matched; without conditions everything is returned.
    let require_at_least_one_match = !request.all_conditions
        && (!span_cond_iters.is_empty() || !resource_optional.is_empty());

    // Span level: conditions plus the static columns that populate span
    // fields. The statics double as the enumerator when no span conditions
    // exist.
    let mut span_children: Vec<Box<dyn RowIterator>> = Vec::new();
    if request.all_conditions {
        span_children.append(&mut span_cond_iters);
    } else if !span_cond_iters.is_empty() {
        span_children.push(Box::new(
            UnionIterator::new(DEF_SPAN, span_cond_iters, None).with_pool(Arc::clone(&pool)),
        ));
    }
    span_children.push(builder.column(columns::SPAN_ID, None, Some(KEY_SPAN_ID.into()), DEF_SPAN, false));
    span_children.push(builder.column(
        columns::SPAN_START,
        None,
        Some(KEY_SPAN_START.into()),
        DEF_SPAN,
        false,
    ));
    span_children.push(builder.column(
        columns::SPAN_DURATION,
        None,
        Some(KEY_SPAN_DURATION.into()),
        DEF_SPAN,
        false,
    ));
    let span_iter: Box<dyn RowIterator> = Box::new(
        JoinIterator::new(
            DEF_SPAN,
            span_children,
            Some(Box::new(SpanCollector {
                lookup_names: span_lookup_names,
            })),
        )
        .with_pool(Arc::clone(&pool)),
    );

    // Resource level. The span iterator goes last so it is only read when
    // the resource-level conditions already line up.
    resource_required.push(span_iter);
    let resource_iter: Box<dyn RowIterator> = Box::new(
        LeftJoinIterator::new(
            DEF_RESOURCE,
            resource_required,
            resource_optional,
            Some(Box::new(BatchCollector {
                require_at_least_one_match,
                lookup_names: resource_lookup_names,
            })),
        )?
        .with_pool(Arc::clone(&pool)),
    );

    // Trace level: the resource iterator and any trace-intrinsic filters
    // are required; the metadata columns ride along as optionals.
    let mut trace_required: Vec<Box<dyn RowIterator>> = vec![resource_iter];
    trace_required.append(&mut trace_cond_iters);
    let trace_optional: Vec<Box<dyn RowIterator>> = vec![
        builder.column(columns::TRACE_ID, None, Some(KEY_TRACE_ID.into()), DEF_TRACE, false),
        builder.column(
            columns::TRACE_ROOT_SERVICE,
            None,
            Some(KEY_TRACE_ROOT_SERVICE.into()),
            DEF_TRACE,
            true,
        ),
        builder.column(
            columns::TRACE_ROOT_SPAN,
            None,
            Some(KEY_TRACE_ROOT_SPAN.into()),
            DEF_TRACE,
            true,
        ),
        builder.column(columns::TRACE_START, None, Some(KEY_TRACE_START.into()), DEF_TRACE, false),
        builder.column(
            columns::TRACE_DURATION,
            None,
            Some(KEY_TRACE_DURATION.into()),
            DEF_TRACE,
            false,
        ),
    ];
    let tree: Box<dyn RowIterator> = Box::new(
        LeftJoinIterator::new(DEF_TRACE, trace_required, trace_optional, Some(Box::new(TraceCollector)))?
            .with_pool(Arc::clone(&pool)),
    );

    debug!(
        conditions = request.conditions.len(),
        second_pass = request.second_pass_conditions.len(),
        all_conditions = request.all_conditions,
        tree = %tree,
        "built fetch iterator tree"
    );

    let second_pass = SecondPass::build(&builder, &request.second_pass_conditions)?;

    Ok(SpansetIterator {
        tree,
        second_pass,
        pool,
        closed: false,
    })
}

/// Group predicate on the span-level join: turns one aligned group of
/// column values into a `FetchSpan` carried upward as an opaque entry.
struct SpanCollector {
    /// Attribute names looked up on the span side; misses backfill as nil.
    lookup_names: Vec<String>,
}

impl GroupPredicate for SpanCollector {
    fn keep_group(&mut self, result: &mut IteratorResult) -> bool {
        if result.row_number.level(DEF_SPAN) < 0 {
            // A placeholder row for a spanless branch, not a span.
            return false;
        }

        let mut span = FetchSpan {
            row: result.row_number.truncate(DEF_SPAN),
            ..Default::default()
        };

        for (key, value) in result.entries.drain(..) {
            match key.as_ref() {
                KEY_SPAN_ID => {
                    if let Some(b) = value.as_bytes() {
                        span.id = b.clone();
                    }
                }
                KEY_SPAN_START => {
                    if let Some(v) = value.as_int() {
                        span.start_time_unix_nano = v as u64;
                    }
                }
                KEY_SPAN_DURATION => {
                    if let Some(v) = value.as_int() {
                        span.duration_nano = v as u64;
                    }
                }
                KEY_INTRINSIC_DURATION => {
                    if let Some(v) = value.as_int() {
                        span.duration_nano = v as u64;
                        span.span_attrs.push((
                            Attribute::intrinsic(Intrinsic::Duration),
                            Static::Duration(Duration::from_nanos(v as u64)),
                        ));
                    }
                }
                KEY_INTRINSIC_NAME => span.span_attrs.push((
                    Attribute::intrinsic(Intrinsic::Name),
                    Static::Str(string_from_value(&value)),
                )),
                KEY_INTRINSIC_STATUS => span.span_attrs.push((
                    Attribute::intrinsic(Intrinsic::Status),
                    Static::Status(SpanStatus::from_i64(value.as_int().unwrap_or(0))),
                )),
                KEY_INTRINSIC_KIND => span.span_attrs.push((
                    Attribute::intrinsic(Intrinsic::Kind),
                    Static::Kind(SpanKind::from_i64(value.as_int().unwrap_or(0))),
                )),
                name => {
                    if !value.is_null() {
                        span.span_attrs
                            .push((Attribute::span(name.to_string()), static_from_value(&value)));
                    }
                }
            }
        }

        span.matched = !span.span_attrs.is_empty();

        // Nil-as-attribute: every span-side lookup that found nothing on
        // this span is still echoed, with a nil value, so the caller sees
        // every condition explained.
        for name in &self.lookup_names {
            let found = span
                .span_attrs
                .iter()
                .any(|(attr, value)| attr.name == *name && !value.is_nil());
            if !found {
                span.span_attrs
                    .push((Attribute::span(name.clone()), Static::Nil));
            }
        }

        result.append_other(KEY_SPAN_PAYLOAD.into(), Box::new(span));
        true
    }
}

impl fmt::Display for SpanCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanCollector(lookups={})", self.lookup_names.len())
    }
}

/// Group predicate on the resource-level join: attaches resource
/// attributes to the batch's spans and applies the at-least-one-match rule.
struct BatchCollector {
    require_at_least_one_match: bool,
    /// Attribute names looked up on the resource side.
    lookup_names: Vec<String>,
}

impl GroupPredicate for BatchCollector {
    fn keep_group(&mut self, result: &mut IteratorResult) -> bool {
        let mut resource_attrs: Vec<(Attribute, Static)> = Vec::new();
        for (key, value) in result.entries.drain(..) {
            if !value.is_null() {
                resource_attrs.push((
                    Attribute::resource(key.to_string()),
                    static_from_value(&value),
                ));
            }
        }

        let mut spans: Vec<FetchSpan> = result
            .take_other(KEY_SPAN_PAYLOAD)
            .into_iter()
            .filter_map(|payload| payload.downcast::<FetchSpan>().ok().map(|b| *b))
            .collect();
        if spans.is_empty() {
            return false;
        }

        if self.require_at_least_one_match
            && resource_attrs.is_empty()
            && !spans.iter().any(|s| s.matched)
        {
            return false;
        }

        for span in &mut spans {
            let mut attrs = resource_attrs.clone();
            // Resource-side nil backfill, unless the span side already
            // explained this attribute with a real value.
            for name in &self.lookup_names {
                let in_resource = resource_attrs.iter().any(|(attr, _)| attr.name == *name);
                if in_resource {
                    continue;
                }
                let on_span = span
                    .span_attrs
                    .iter()
                    .any(|(attr, value)| attr.name == *name && !value.is_nil());
                if !on_span {
                    attrs.push((Attribute::resource(name.clone()), Static::Nil));
                }
            }
            span.resource_attrs.extend(attrs);
        }

        result.append_other(KEY_BATCH_PAYLOAD.into(), Box::new(spans));
        true
    }
}

impl fmt::Display for BatchCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BatchCollector(require_match={}, lookups={})",
            self.require_at_least_one_match,
            self.lookup_names.len()
        )
    }
}

/// Group predicate on the trace-level join: merges batches into one
/// spanset and fills the trace metadata fields.
struct TraceCollector;

impl GroupPredicate for TraceCollector {
    fn keep_group(&mut self, result: &mut IteratorResult) -> bool {
        let mut spanset = Spanset::default();
        for (key, value) in result.entries.drain(..) {
            match key.as_ref() {
                KEY_TRACE_ID => {
                    if let Some(b) = value.as_bytes() {
                        spanset.trace_id = b.clone();
                    }
                }
                KEY_TRACE_ROOT_SERVICE => spanset.root_service_name = string_from_value(&value),
                KEY_TRACE_ROOT_SPAN => spanset.root_span_name = string_from_value(&value),
                KEY_TRACE_START => {
                    if let Some(v) = value.as_int() {
                        spanset.start_time_unix_nano = v as u64;
                    }
                }
                KEY_TRACE_DURATION => {
                    if let Some(v) = value.as_int() {
                        spanset.duration_nano = v as u64;
                    }
                }
                _ => {}
            }
        }

        for payload in result.take_other(KEY_BATCH_PAYLOAD) {
            if let Ok(batch) = payload.downcast::<Vec<FetchSpan>>() {
                spanset.spans.extend(*batch);
            }
        }
        if spanset.spans.is_empty() {
            return false;
        }

        result.append_other(KEY_SPANSET_PAYLOAD.into(), Box::new(spanset));
        true
    }
}

impl fmt::Display for TraceCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TraceCollector")
    }
}

/// How a second-pass lookup's values land on the span.
enum Emit {
    SpanIntrinsic(Intrinsic),
    SpanAttr(String),
    ResourceAttr(String),
}

/// One second-pass lookup: a select-as iterator over the same row groups,
/// advanced by seeking to each span's row number. The last visited group is
/// cached so every span of a shared resource sees the same values.
struct Lookup {
    emit: Emit,
    level: usize,
    iter: Box<dyn RowIterator>,
    peek: Option<IteratorResult>,
    cached_row: Option<RowNumber>,
    cached: Vec<Static>,
}

fn convert_for_emit(emit: &Emit, value: &Value) -> Static {
    match emit {
        Emit::SpanIntrinsic(Intrinsic::Duration) => {
            Static::Duration(Duration::from_nanos(value.as_int().unwrap_or(0) as u64))
        }
        Emit::SpanIntrinsic(Intrinsic::Name) => Static::Str(string_from_value(value)),
        Emit::SpanIntrinsic(Intrinsic::Status) => {
            Static::Status(SpanStatus::from_i64(value.as_int().unwrap_or(0)))
        }
        Emit::SpanIntrinsic(Intrinsic::Kind) => {
            Static::Kind(SpanKind::from_i64(value.as_int().unwrap_or(0)))
        }
        _ => static_from_value(value),
    }
}

struct SecondPass {
    lookups: Vec<Lookup>,
    trace_intrinsics: Vec<Intrinsic>,
    pool: Arc<ResultPool>,
}

impl SecondPass {
    fn build(builder: &IterBuilder, conditions: &[Condition]) -> Result<SecondPass, FetchError> {
        let mut lookups = Vec::new();
        let mut trace_intrinsics = Vec::new();

        for cond in conditions {
            match cond.attribute.scope {
                AttributeScope::Intrinsic => {
                    let intrinsic = cond.attribute.intrinsic.ok_or_else(|| {
                        FetchError::InvalidRequest(format!(
                            "intrinsic-scoped attribute {} without an intrinsic kind",
                            cond.attribute
                        ))
                    })?;
                    let (column, key) = match intrinsic {
                        Intrinsic::Duration => (columns::SPAN_DURATION, KEY_INTRINSIC_DURATION),
                        Intrinsic::Name => (columns::SPAN_NAME, KEY_INTRINSIC_NAME),
                        Intrinsic::Status => (columns::SPAN_STATUS, KEY_INTRINSIC_STATUS),
                        Intrinsic::Kind => (columns::SPAN_KIND, KEY_INTRINSIC_KIND),
                        // The id is already projected by the static columns.
                        Intrinsic::SpanId => continue,
                        Intrinsic::TraceRootService
                        | Intrinsic::TraceRootSpan
                        | Intrinsic::TraceDuration => {
                            trace_intrinsics.push(intrinsic);
                            continue;
                        }
                    };
                    lookups.push(Lookup {
                        emit: Emit::SpanIntrinsic(intrinsic),
                        level: DEF_SPAN,
                        iter: builder.column(column, None, Some(key.into()), DEF_SPAN, false),
                        peek: None,
                        cached_row: None,
                        cached: Vec::new(),
                    });
                }
                AttributeScope::Span => lookups.push(Lookup {
                    emit: Emit::SpanAttr(cond.attribute.name.clone()),
                    level: DEF_SPAN,
                    iter: builder.attr(AttrSide::Span, &cond.attribute.name, None),
                    peek: None,
                    cached_row: None,
                    cached: Vec::new(),
                }),
                AttributeScope::Resource => lookups.push(Lookup {
                    emit: Emit::ResourceAttr(cond.attribute.name.clone()),
                    level: DEF_RESOURCE,
                    iter: builder.attr(AttrSide::Resource, &cond.attribute.name, None),
                    peek: None,
                    cached_row: None,
                    cached: Vec::new(),
                }),
                AttributeScope::None => {
                    lookups.push(Lookup {
                        emit: Emit::SpanAttr(cond.attribute.name.clone()),
                        level: DEF_SPAN,
                        iter: builder.attr(AttrSide::Span, &cond.attribute.name, None),
                        peek: None,
                        cached_row: None,
                        cached: Vec::new(),
                    });
                    lookups.push(Lookup {
                        emit: Emit::ResourceAttr(cond.attribute.name.clone()),
                        level: DEF_RESOURCE,
                        iter: builder.attr(AttrSide::Resource, &cond.attribute.name, None),
                        peek: None,
                        cached_row: None,
                        cached: Vec::new(),
                    });
                }
            }
        }

        Ok(SecondPass {
            lookups,
            trace_intrinsics,
            pool: Arc::clone(&builder.pool),
        })
    }

    /// Splice second-pass projections into every span of the spanset.
    /// Spans arrive in row order across successive spansets, so each lookup
    /// iterator only ever moves forward.
    fn apply(&mut self, spanset: &mut Spanset) -> Result<(), FetchError> {
        for lookup in &mut self.lookups {
            for span in &mut spanset.spans {
                let target = span.row.truncate(lookup.level);

                if lookup.cached_row != Some(target) {
                    lookup.cached.clear();
                    let needs_seek = match &lookup.peek {
                        None => true,
                        Some(p) => {
                            p.row_number.compare_at(lookup.level, &target) == Ordering::Less
                        }
                    };
                    if needs_seek {
                        if let Some(old) = lookup.peek.take() {
                            self.pool.put(old);
                        }
                        lookup.peek = lookup.iter.seek_to(target, lookup.level)?;
                    }
                    loop {
                        let matches = match &lookup.peek {
                            Some(p) => p.row_number.equal_at(lookup.level, &target),
                            None => false,
                        };
                        if !matches {
                            break;
                        }
                        let mut taken = lookup.peek.take().expect("peek present");
                        for (_, value) in taken.entries.drain(..) {
                            if value.is_null() {
                                continue;
                            }
                            let converted = convert_for_emit(&lookup.emit, &value);
                            lookup.cached.push(converted);
                        }
                        self.pool.put(taken);
                        lookup.peek = lookup.iter.next()?;
                    }
                    lookup.cached_row = Some(target);
                }

                for value in &lookup.cached {
                    match &lookup.emit {
                        Emit::SpanIntrinsic(intrinsic) => span
                            .span_attrs
                            .push((Attribute::intrinsic(*intrinsic), value.clone())),
                        Emit::SpanAttr(name) => span
                            .span_attrs
                            .push((Attribute::span(name.clone()), value.clone())),
                        Emit::ResourceAttr(name) => span
                            .resource_attrs
                            .push((Attribute::resource(name.clone()), value.clone())),
                    }
                }
            }
        }

        // Trace intrinsics come straight from the spanset fields.
        for intrinsic in &self.trace_intrinsics {
            let value = match intrinsic {
                Intrinsic::TraceRootService => Static::Str(spanset.root_service_name.clone()),
                Intrinsic::TraceRootSpan => Static::Str(spanset.root_span_name.clone()),
                Intrinsic::TraceDuration => {
                    Static::Duration(Duration::from_nanos(spanset.duration_nano))
                }
                _ => continue,
            };
            for span in &mut spanset.spans {
                span.trace_attrs
                    .push((Attribute::intrinsic(*intrinsic), value.clone()));
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        for lookup in &mut self.lookups {
            if let Some(peek) = lookup.peek.take() {
                self.pool.put(peek);
            }
            lookup.iter.close();
        }
    }
}

/// Lazy spanset stream. Pull with `next()` until `None`; close (or drop)
/// to release iterator resources and pooled results.
pub struct SpansetIterator {
    tree: Box<dyn RowIterator>,
    second_pass: SecondPass,
    pool: Arc<ResultPool>,
    closed: bool,
}

impl SpansetIterator {
    pub fn next(&mut self) -> Result<Option<Spanset>, FetchError> {
        let Some(mut result) = self.tree.next().map_err(FetchError::from)? else {
            return Ok(None);
        };

        let mut payloads = result.take_other(KEY_SPANSET_PAYLOAD);
        self.pool.put(result);
        let payload = payloads.pop().ok_or_else(|| {
            FetchError::Internal("trace group produced no spanset payload".into())
        })?;
        let mut spanset = *payload
            .downcast::<Spanset>()
            .map_err(|_| FetchError::Internal("spanset payload has the wrong type".into()))?;

        self.second_pass.apply(&mut spanset)?;
        Ok(Some(spanset))
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.tree.close();
            self.second_pass.close();
        }
    }
}

impl Drop for SpansetIterator {
    fn drop(&mut self) {
        self.close();
    }
}
