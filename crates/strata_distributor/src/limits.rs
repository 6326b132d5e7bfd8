//! Per-tenant ingestion limits and the rate-limiting token bucket.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde::Deserialize;

/// How a tenant's rate limit is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateStrategy {
    /// The configured rate applies to this distributor alone.
    #[default]
    Local,
    /// The configured rate is shared across all live distributors; each
    /// one enforces `rate / distributor_count`.
    Global,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct IngestionOverrides {
    pub rate_strategy: RateStrategy,
    pub rate_limit_bytes: usize,
    pub burst_size_bytes: usize,
}

impl Default for IngestionOverrides {
    fn default() -> Self {
        IngestionOverrides {
            rate_strategy: RateStrategy::Local,
            rate_limit_bytes: 15_000_000,
            burst_size_bytes: 20_000_000,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct TenantLimits {
    pub ingestion: IngestionOverrides,
}

/// Tenant limit lookup: defaults plus per-tenant overrides.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Overrides {
    pub defaults: TenantLimits,
    pub per_tenant: HashMap<String, TenantLimits>,
}

impl Overrides {
    pub fn limits_for(&self, tenant: &str) -> &TenantLimits {
        self.per_tenant.get(tenant).unwrap_or(&self.defaults)
    }
}

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-tenant token bucket over ingested bytes.
///
/// Buckets start full (one burst is always admitted) and refill at the
/// tenant's rate, divided by the live distributor count under the global
/// strategy.
pub struct IngestionRateLimiter {
    overrides: Overrides,
    distributor_count: AtomicUsize,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl IngestionRateLimiter {
    pub fn new(overrides: Overrides) -> Self {
        IngestionRateLimiter {
            overrides,
            distributor_count: AtomicUsize::new(1),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Inform the limiter how many distributors share the global rate.
    pub fn set_distributor_count(&self, count: usize) {
        self.distributor_count.store(count.max(1), Ordering::Relaxed);
    }

    /// The rate this instance enforces for `tenant`, in bytes per second.
    pub fn local_rate(&self, tenant: &str) -> f64 {
        let ingestion = &self.overrides.limits_for(tenant).ingestion;
        match ingestion.rate_strategy {
            RateStrategy::Local => ingestion.rate_limit_bytes as f64,
            RateStrategy::Global => {
                ingestion.rate_limit_bytes as f64
                    / self.distributor_count.load(Ordering::Relaxed) as f64
            }
        }
    }

    /// The cluster-wide rate, or zero under the local strategy.
    pub fn global_rate(&self, tenant: &str) -> usize {
        let ingestion = &self.overrides.limits_for(tenant).ingestion;
        match ingestion.rate_strategy {
            RateStrategy::Local => 0,
            RateStrategy::Global => ingestion.rate_limit_bytes,
        }
    }

    pub fn burst_bytes(&self, tenant: &str) -> usize {
        self.overrides.limits_for(tenant).ingestion.burst_size_bytes
    }

    /// Try to take `size` bytes out of the tenant's bucket at `now`.
    pub fn allow(&self, tenant: &str, now: Instant, size: usize) -> bool {
        let rate = self.local_rate(tenant);
        let burst = self.burst_bytes(tenant) as f64;

        let mut buckets = self.buckets.lock().expect("rate limiter poisoned");
        let bucket = buckets.entry(tenant.to_string()).or_insert(TokenBucket {
            tokens: burst,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * rate).min(burst);
        bucket.last_refill = now;

        if bucket.tokens >= size as f64 {
            bucket.tokens -= size as f64;
            true
        } else {
            false
        }
    }
}
