//! The distributor push path.
//!
//! One request flows: cancellation check, rate limit, rebatch by trace id,
//! concurrent fan-out to the replicas the ring picks for each trace token,
//! then replication-aware accounting. Per-trace rejections from replicas
//! are counted, optionally logged, and never fail the request as long as
//! the request itself was valid and some replica was reachable.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::join_all;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use strata_trace::{AnyValue, ResourceSpans, SpanStatus, Trace};

use crate::limits::{IngestionRateLimiter, Overrides};
use crate::rebatch::{requests_by_trace_id, RebatchError, RebatchedTrace};

/// Per-trace outcome reported by a replica.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PushErrorReason {
    #[default]
    NoError,
    TraceTooLarge,
    MaxLiveTraces,
    Internal,
}

impl PushErrorReason {
    pub fn as_str(self) -> &'static str {
        match self {
            PushErrorReason::NoError => "NO_ERROR",
            PushErrorReason::TraceTooLarge => "TRACE_TOO_LARGE",
            PushErrorReason::MaxLiveTraces => "MAX_LIVE_TRACES",
            PushErrorReason::Internal => "INTERNAL_ERROR",
        }
    }
}

/// Replica response: one reason per trace, in the order they were sent.
/// An empty vector means everything was accepted.
#[derive(Clone, Debug, Default)]
pub struct PushResponse {
    pub errors_by_trace: Vec<PushErrorReason>,
}

/// What one replica receives: the rebatched traces assigned to it.
#[derive(Clone, Debug)]
pub struct ReplicaPushRequest {
    pub tenant: String,
    pub ids: Vec<Bytes>,
    pub traces: Vec<Trace>,
}

/// Transport to one replica. Failures are opaque; the distributor treats
/// them as a non-success for every trace in the request.
#[async_trait]
pub trait ReplicaClient: Send + Sync {
    async fn push(&self, request: ReplicaPushRequest) -> anyhow::Result<PushResponse>;
}

/// Replica selection. Membership and token ownership live elsewhere; the
/// distributor only needs the replica set for a trace token.
pub trait ReplicaRing: Send + Sync {
    fn replication_factor(&self) -> usize;

    /// Indexes into the distributor's client list for this token.
    fn replicas_for(&self, token: u32) -> Vec<usize>;
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogSpansConfig {
    pub enabled: bool,
    pub filter_by_status_error: bool,
    pub include_all_attributes: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DistributorConfig {
    /// Attribute keys and string values are capped at this many bytes.
    pub max_attribute_bytes: usize,
    /// Minimum elapsed time for every request, success or failure. Smooths
    /// tail latency for clients that retry aggressively on fast failures.
    pub artificial_delay: Option<Duration>,
    pub log_received_spans: LogSpansConfig,
    pub log_discarded_spans: LogSpansConfig,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        DistributorConfig {
            max_attribute_bytes: 2048,
            artificial_delay: None,
            log_received_spans: LogSpansConfig::default(),
            log_discarded_spans: LogSpansConfig::default(),
        }
    }
}

#[derive(Default)]
struct DistributorMetrics {
    spans_received: AtomicU64,
    attributes_truncated_total: AtomicU64,
    discarded_trace_too_large: AtomicU64,
    discarded_max_live_traces: AtomicU64,
    discarded_rate_limited: AtomicU64,
    discarded_invalid: AtomicU64,
    discarded_cancelled: AtomicU64,
    discarded_internal: AtomicU64,
}

/// Point-in-time copy of the distributor counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DistributorMetricsSnapshot {
    pub spans_received: u64,
    pub attributes_truncated_total: u64,
    pub discarded_trace_too_large: u64,
    pub discarded_max_live_traces: u64,
    pub discarded_rate_limited: u64,
    pub discarded_invalid: u64,
    pub discarded_cancelled: u64,
    pub discarded_internal: u64,
}

impl DistributorMetrics {
    fn snapshot(&self) -> DistributorMetricsSnapshot {
        DistributorMetricsSnapshot {
            spans_received: self.spans_received.load(Ordering::Relaxed),
            attributes_truncated_total: self.attributes_truncated_total.load(Ordering::Relaxed),
            discarded_trace_too_large: self.discarded_trace_too_large.load(Ordering::Relaxed),
            discarded_max_live_traces: self.discarded_max_live_traces.load(Ordering::Relaxed),
            discarded_rate_limited: self.discarded_rate_limited.load(Ordering::Relaxed),
            discarded_invalid: self.discarded_invalid.load(Ordering::Relaxed),
            discarded_cancelled: self.discarded_cancelled.load(Ordering::Relaxed),
            discarded_internal: self.discarded_internal.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// Validation failure: the whole request is rejected, nothing written.
    #[error(transparent)]
    InvalidInput(#[from] RebatchError),

    /// Over the tenant's ingestion limits. Retryable.
    #[error("{0}")]
    RateLimited(String),

    #[error("push cancelled")]
    Cancelled,

    /// Every replica send failed. Retryable.
    #[error("all replica pushes failed: {0}")]
    ReplicasUnavailable(String),
}

impl PushError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PushError::RateLimited(_) | PushError::ReplicasUnavailable(_))
    }
}

/// Spans discarded by reason, summed over the traces that missed quorum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiscardCounts {
    pub max_live_traces: usize,
    pub trace_too_large: usize,
    pub internal: usize,
}

impl DiscardCounts {
    pub fn total(&self) -> usize {
        self.max_live_traces + self.trace_too_large + self.internal
    }
}

/// Fold one replica response into the per-trace success/error tallies.
/// `indexes` maps positions in the response onto trace indexes; an empty
/// error vector counts as success for every trace sent.
pub fn process_push_response(
    errors: &[PushErrorReason],
    num_success: &mut [usize],
    last_error: &mut [PushErrorReason],
    indexes: &[usize],
) {
    if errors.is_empty() {
        for &i in indexes {
            num_success[i] += 1;
        }
        return;
    }
    for (k, &i) in indexes.iter().enumerate() {
        match errors.get(k).copied().unwrap_or(PushErrorReason::NoError) {
            PushErrorReason::NoError => num_success[i] += 1,
            err => last_error[i] = err,
        }
    }
}

/// A trace is accepted once a write quorum of replicas took it; anything
/// below quorum is discarded under its most recent error reason.
pub fn count_discarded_spans(
    num_success: &[usize],
    last_error: &[PushErrorReason],
    traces: &[RebatchedTrace],
    replication_factor: usize,
) -> DiscardCounts {
    let quorum = replication_factor / 2 + 1;
    let mut counts = DiscardCounts::default();
    for (i, trace) in traces.iter().enumerate() {
        if num_success[i] >= quorum {
            continue;
        }
        match last_error[i] {
            PushErrorReason::MaxLiveTraces => counts.max_live_traces += trace.span_count,
            PushErrorReason::TraceTooLarge => counts.trace_too_large += trace.span_count,
            PushErrorReason::NoError | PushErrorReason::Internal => {
                counts.internal += trace.span_count
            }
        }
    }
    counts
}

pub struct Distributor {
    config: DistributorConfig,
    limiter: IngestionRateLimiter,
    ring: Arc<dyn ReplicaRing>,
    clients: Vec<Arc<dyn ReplicaClient>>,
    metrics: DistributorMetrics,
}

impl Distributor {
    pub fn new(
        config: DistributorConfig,
        overrides: Overrides,
        ring: Arc<dyn ReplicaRing>,
        clients: Vec<Arc<dyn ReplicaClient>>,
    ) -> Self {
        Distributor {
            config,
            limiter: IngestionRateLimiter::new(overrides),
            ring,
            clients,
            metrics: DistributorMetrics::default(),
        }
    }

    pub fn metrics(&self) -> DistributorMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn limiter(&self) -> &IngestionRateLimiter {
        &self.limiter
    }

    /// Ingest one request worth of batches for `tenant`.
    pub async fn push(
        &self,
        tenant: &str,
        batches: &[ResourceSpans],
        cancel: &CancellationToken,
    ) -> Result<(), PushError> {
        let started = Instant::now();
        let result = self.push_inner(tenant, batches, cancel).await;
        self.apply_artificial_delay(started).await;
        result
    }

    async fn push_inner(
        &self,
        tenant: &str,
        batches: &[ResourceSpans],
        cancel: &CancellationToken,
    ) -> Result<(), PushError> {
        let span_count: usize = batches.iter().map(ResourceSpans::span_count).sum();
        if span_count == 0 {
            return Ok(());
        }
        self.metrics
            .spans_received
            .fetch_add(span_count as u64, Ordering::Relaxed);

        if cancel.is_cancelled() {
            self.metrics
                .discarded_cancelled
                .fetch_add(span_count as u64, Ordering::Relaxed);
            self.log_batches(&self.config.log_discarded_spans, "discarded", tenant, batches, None);
            return Err(PushError::Cancelled);
        }

        let size: usize = batches.iter().map(ResourceSpans::size_bytes).sum();
        if let Err(err) = self.check_for_rate_limits(size, tenant) {
            self.metrics
                .discarded_rate_limited
                .fetch_add(span_count as u64, Ordering::Relaxed);
            self.log_batches(&self.config.log_discarded_spans, "discarded", tenant, batches, None);
            return Err(err);
        }

        let (tokens, rebatched, truncated) =
            requests_by_trace_id(batches, tenant, span_count, self.config.max_attribute_bytes)
                .map_err(|err| {
                    self.metrics
                        .discarded_invalid
                        .fetch_add(span_count as u64, Ordering::Relaxed);
                    PushError::from(err)
                })?;
        self.metrics
            .attributes_truncated_total
            .fetch_add(truncated as u64, Ordering::Relaxed);

        self.log_batches(&self.config.log_received_spans, "received", tenant, batches, None);

        self.send_to_replicas(tenant, &tokens, &rebatched).await
    }

    /// All-or-nothing admission control on the estimated request size.
    pub fn check_for_rate_limits(&self, size: usize, tenant: &str) -> Result<(), PushError> {
        let now = Instant::now();
        if self.limiter.allow(tenant, now, size) {
            return Ok(());
        }

        let local = self.limiter.local_rate(tenant) as usize;
        let global = self.limiter.global_rate(tenant);
        let burst = self.limiter.burst_bytes(tenant);
        let message = if size > local {
            format!(
                "RATE_LIMITED: batch size ({size} bytes) exceeds ingestion limit \
                 (local: {local} bytes/s, global: {global} bytes/s, burst: {burst} bytes) \
                 while adding {size} bytes for tenant {tenant}. \
                 consider reducing batch size or increasing rate limit."
            )
        } else {
            format!(
                "RATE_LIMITED: ingestion rate limit \
                 (local: {local} bytes/s, global: {global} bytes/s, burst: {burst} bytes) \
                 exceeded while adding {size} bytes for tenant {tenant}. \
                 consider increasing the limit or reducing ingestion rate."
            )
        };
        Err(PushError::RateLimited(message))
    }

    async fn send_to_replicas(
        &self,
        tenant: &str,
        tokens: &[u32],
        rebatched: &[RebatchedTrace],
    ) -> Result<(), PushError> {
        if rebatched.is_empty() {
            return Ok(());
        }

        // Group trace indexes by the replica that should receive them.
        let mut by_replica: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, token) in tokens.iter().enumerate() {
            for replica in self.ring.replicas_for(*token) {
                by_replica.entry(replica).or_default().push(i);
            }
        }

        let sends = by_replica.into_iter().map(|(replica, indexes)| {
            let client = Arc::clone(&self.clients[replica]);
            let request = ReplicaPushRequest {
                tenant: tenant.to_string(),
                ids: indexes.iter().map(|&i| rebatched[i].id.clone()).collect(),
                traces: indexes.iter().map(|&i| rebatched[i].trace.clone()).collect(),
            };
            async move { (replica, indexes, client.push(request).await) }
        });
        let results = join_all(sends).await;

        let mut num_success = vec![0usize; rebatched.len()];
        let mut last_error = vec![PushErrorReason::NoError; rebatched.len()];
        let mut failed_sends = 0usize;
        let total_sends = results.len();

        for (replica, indexes, result) in results {
            match result {
                Ok(response) => process_push_response(
                    &response.errors_by_trace,
                    &mut num_success,
                    &mut last_error,
                    &indexes,
                ),
                Err(err) => {
                    warn!(replica, error = %err, "replica push failed");
                    failed_sends += 1;
                    for &i in &indexes {
                        last_error[i] = PushErrorReason::Internal;
                    }
                }
            }
        }

        if failed_sends == total_sends {
            let spans: usize = rebatched.iter().map(|t| t.span_count).sum();
            self.metrics
                .discarded_internal
                .fetch_add(spans as u64, Ordering::Relaxed);
            return Err(PushError::ReplicasUnavailable(format!(
                "{failed_sends} of {total_sends} sends failed"
            )));
        }

        let counts = count_discarded_spans(
            &num_success,
            &last_error,
            rebatched,
            self.ring.replication_factor(),
        );
        self.metrics
            .discarded_max_live_traces
            .fetch_add(counts.max_live_traces as u64, Ordering::Relaxed);
        self.metrics
            .discarded_trace_too_large
            .fetch_add(counts.trace_too_large as u64, Ordering::Relaxed);
        self.metrics
            .discarded_internal
            .fetch_add(counts.internal as u64, Ordering::Relaxed);

        if counts.total() > 0 && self.config.log_discarded_spans.enabled {
            let quorum = self.ring.replication_factor() / 2 + 1;
            for (i, trace) in rebatched.iter().enumerate() {
                if num_success[i] >= quorum {
                    continue;
                }
                self.log_batches(
                    &self.config.log_discarded_spans,
                    "discarded",
                    tenant,
                    &trace.trace.resource_spans,
                    Some(last_error[i]),
                );
            }
        }

        Ok(())
    }

    async fn apply_artificial_delay(&self, started: Instant) {
        if let Some(delay) = self.config.artificial_delay {
            let elapsed = started.elapsed();
            if elapsed < delay {
                tokio::time::sleep(delay - elapsed).await;
            }
        }
    }

    fn log_batches(
        &self,
        config: &LogSpansConfig,
        message: &str,
        tenant: &str,
        batches: &[ResourceSpans],
        reason: Option<PushErrorReason>,
    ) {
        if !config.enabled {
            return;
        }
        let reason = reason.map(PushErrorReason::as_str).unwrap_or_default();
        for batch in batches {
            let service = batch.resource.service_name().unwrap_or_default();
            for scope in &batch.scope_spans {
                for span in &scope.spans {
                    if config.filter_by_status_error && span.status != SpanStatus::Error {
                        continue;
                    }
                    if config.include_all_attributes {
                        let mut attributes = String::new();
                        for kv in batch.resource.attributes.iter().chain(&span.attributes) {
                            let _ = write!(attributes, "{}={} ", kv.key, render_value(&kv.value));
                        }
                        info!(
                            tenant,
                            traceid = %hex(&span.trace_id),
                            spanid = %hex(&span.span_id),
                            span_name = %span.name,
                            span_status = span.status.as_i64(),
                            span_kind = span.kind.as_i64(),
                            span_service_name = service,
                            attributes = attributes.trim_end(),
                            push_error_reason = reason,
                            "{message}"
                        );
                    } else {
                        info!(
                            tenant,
                            traceid = %hex(&span.trace_id),
                            spanid = %hex(&span.span_id),
                            push_error_reason = reason,
                            "{message}"
                        );
                    }
                }
            }
        }
    }
}

fn render_value(value: &AnyValue) -> String {
    match value {
        AnyValue::Str(s) => s.clone(),
        AnyValue::Int(v) => v.to_string(),
        AnyValue::Double(v) => v.to_string(),
        AnyValue::Bool(v) => v.to_string(),
        AnyValue::Bytes(b) => hex(b),
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}
