//! Structured span queries and their results.
//!
//! A `FetchSpansRequest` is the already-parsed form of a trace query: an
//! ordered list of conditions plus projection-only second-pass conditions.
//! Results come back as `Spanset`s, one per matching trace, with the
//! matched spans and the attributes that explain why they matched.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use strata_query::RowNumber;

use crate::model::{SpanKind, SpanStatus};

/// Where an attribute lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeScope {
    /// Unscoped: the query did not say, so both span and resource are searched.
    None,
    Span,
    Resource,
    Intrinsic,
}

/// Span and trace properties exposed as if they were attributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    Duration,
    SpanId,
    Name,
    Status,
    Kind,
    TraceRootService,
    TraceRootSpan,
    TraceDuration,
}

impl Intrinsic {
    pub fn as_str(self) -> &'static str {
        match self {
            Intrinsic::Duration => "duration",
            Intrinsic::SpanId => "span:id",
            Intrinsic::Name => "name",
            Intrinsic::Status => "status",
            Intrinsic::Kind => "kind",
            Intrinsic::TraceRootService => "trace:rootService",
            Intrinsic::TraceRootSpan => "trace:rootName",
            Intrinsic::TraceDuration => "trace:duration",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Attribute {
    pub scope: AttributeScope,
    pub name: String,
    pub intrinsic: Option<Intrinsic>,
}

impl Attribute {
    /// Unscoped attribute reference (`.name`).
    pub fn plain(name: impl Into<String>) -> Self {
        Attribute {
            scope: AttributeScope::None,
            name: name.into(),
            intrinsic: None,
        }
    }

    /// Span-scoped attribute reference (`span.name`).
    pub fn span(name: impl Into<String>) -> Self {
        Attribute {
            scope: AttributeScope::Span,
            name: name.into(),
            intrinsic: None,
        }
    }

    /// Resource-scoped attribute reference (`resource.name`).
    pub fn resource(name: impl Into<String>) -> Self {
        Attribute {
            scope: AttributeScope::Resource,
            name: name.into(),
            intrinsic: None,
        }
    }

    pub fn intrinsic(intrinsic: Intrinsic) -> Self {
        Attribute {
            scope: AttributeScope::Intrinsic,
            name: intrinsic.as_str().to_string(),
            intrinsic: Some(intrinsic),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            AttributeScope::Span => write!(f, "span.{}", self.name),
            AttributeScope::Resource => write!(f, "resource.{}", self.name),
            _ => write!(f, "{}", self.name),
        }
    }
}

/// A typed constant in a query or result.
#[derive(Clone, Debug, PartialEq)]
pub enum Static {
    Nil,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Duration(Duration),
    Status(SpanStatus),
    Kind(SpanKind),
}

impl Static {
    pub fn is_nil(&self) -> bool {
        matches!(self, Static::Nil)
    }
}

/// Condition operator. `None` is the sentinel for "project only, no
/// filter"; presence (`!= nil`) is `NotEq` against `Static::Nil`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    None,
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    Regex,
    NotRegex,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub attribute: Attribute,
    pub op: Op,
    pub operands: Vec<Static>,
}

impl Condition {
    pub fn new(attribute: Attribute, op: Op, operands: Vec<Static>) -> Self {
        Condition {
            attribute,
            op,
            operands,
        }
    }

    /// Projection-only condition: fetch the attribute without filtering.
    pub fn project(attribute: Attribute) -> Self {
        Condition {
            attribute,
            op: Op::None,
            operands: Vec::new(),
        }
    }
}

/// The structured query the fetch layer executes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchSpansRequest {
    pub conditions: Vec<Condition>,
    /// When set, every condition must match on the same span (inner join);
    /// otherwise conditions are OR'ed (union).
    pub all_conditions: bool,
    /// Projection-only conditions resolved in a second pass after a
    /// spanset is assembled.
    pub second_pass_conditions: Vec<Condition>,
}

impl FetchSpansRequest {
    pub fn new(conditions: Vec<Condition>) -> Self {
        FetchSpansRequest {
            conditions,
            ..Default::default()
        }
    }

    /// Append the standard metadata projections callers expect on every
    /// span: the span duration plus the three trace-level intrinsics.
    pub fn with_standard_meta(mut self) -> Self {
        self.second_pass_conditions.extend([
            Condition::project(Attribute::intrinsic(Intrinsic::Duration)),
            Condition::project(Attribute::intrinsic(Intrinsic::TraceRootService)),
            Condition::project(Attribute::intrinsic(Intrinsic::TraceRootSpan)),
            Condition::project(Attribute::intrinsic(Intrinsic::TraceDuration)),
        ]);
        self
    }
}

/// One matched span with the attributes that explain the match.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchSpan {
    pub id: Bytes,
    pub start_time_unix_nano: u64,
    pub duration_nano: u64,
    pub span_attrs: Vec<(Attribute, Static)>,
    pub resource_attrs: Vec<(Attribute, Static)>,
    pub trace_attrs: Vec<(Attribute, Static)>,
    pub(crate) row: RowNumber,
    pub(crate) matched: bool,
}

/// One matching trace: trace-level metadata plus its matched spans.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Spanset {
    pub trace_id: Bytes,
    pub root_span_name: String,
    pub root_service_name: String,
    pub start_time_unix_nano: u64,
    pub duration_nano: u64,
    pub spans: Vec<FetchSpan>,
}
