//! The write-path front door for trace ingest.
//!
//! `rebatch` partitions incoming resource-span batches into per-trace
//! writes and bounds attribute sizes. `limits` holds the per-tenant
//! overrides and the ingestion token bucket. `distributor` ties them
//! together: validate, rate-limit, rebatch, fan out to replicas, and
//! account for per-trace rejections.

mod distributor;
mod limits;
mod rebatch;

pub use distributor::{
    count_discarded_spans, process_push_response, DiscardCounts, Distributor, DistributorConfig,
    DistributorMetricsSnapshot, LogSpansConfig, PushError, PushErrorReason, PushResponse,
    ReplicaClient, ReplicaPushRequest, ReplicaRing,
};
pub use limits::{IngestionOverrides, IngestionRateLimiter, Overrides, RateStrategy, TenantLimits};
pub use rebatch::{requests_by_trace_id, token_for, RebatchError, RebatchedTrace};
