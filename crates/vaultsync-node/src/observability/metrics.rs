//! Prometheus metrics.
//!
//! Covers HTTP traffic, mutation outcomes, sync volume, integrity and
//! authentication failures, and vault size.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use vaultsync_core::VaultError;
use vaultsync_storage::StorageStats;

/// HTTP request labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabels {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Matched route
    pub path: String,
    /// Response status code
    pub status: u16,
}

/// Mutation outcome labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct MutationLabels {
    /// upload, update, or delete
    pub operation: String,
    /// `ok` or the error kind
    pub outcome: String,
}

/// Authentication failure labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct AuthLabels {
    /// Failure reason.
    pub reason: String,
}

/// Global metrics state.
pub static METRICS: Lazy<MetricsState> = Lazy::new(MetricsState::new);

/// Metrics state container.
#[derive(Clone)]
pub struct MetricsState {
    /// Prometheus registry.
    pub registry: Arc<RwLock<Registry>>,
    /// HTTP request counter.
    pub http_requests_total: Family<HttpLabels, Counter>,
    /// HTTP request duration histogram (seconds).
    pub http_request_duration_seconds: Family<HttpLabels, Histogram>,
    /// Requests currently in flight.
    pub http_requests_in_flight: Gauge,
    /// Batch outcomes by operation.
    pub mutations_total: Family<MutationLabels, Counter>,
    /// Records touched by successful batches.
    pub mutated_records_total: Family<MutationLabels, Counter>,
    /// Record state descriptors returned by sync requests.
    pub sync_descriptors_total: Counter,
    /// Envelopes rejected by the integrity gate.
    pub integrity_failures_total: Counter,
    /// Rejected authentications by reason.
    pub auth_failures_total: Family<AuthLabels, Counter>,
    /// Registered users.
    pub users: Gauge,
    /// Live records across all vaults.
    pub live_records: Gauge,
    /// Tombstones across all vaults.
    pub tombstones: Gauge,
}

impl Default for MetricsState {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsState {
    /// Create a new metrics state with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let http_requests_total = Family::<HttpLabels, Counter>::default();
        registry.register(
            "vaultsync_http_requests",
            "Total HTTP requests",
            http_requests_total.clone(),
        );

        let http_request_duration_seconds =
            Family::<HttpLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 16))
            });
        registry.register(
            "vaultsync_http_request_duration_seconds",
            "HTTP request duration in seconds",
            http_request_duration_seconds.clone(),
        );

        let http_requests_in_flight = Gauge::default();
        registry.register(
            "vaultsync_http_requests_in_flight",
            "HTTP requests currently being served",
            http_requests_in_flight.clone(),
        );

        let mutations_total = Family::<MutationLabels, Counter>::default();
        registry.register(
            "vaultsync_mutations",
            "Mutation batches by operation and outcome",
            mutations_total.clone(),
        );

        let mutated_records_total = Family::<MutationLabels, Counter>::default();
        registry.register(
            "vaultsync_mutated_records",
            "Records written by successful batches",
            mutated_records_total.clone(),
        );

        let sync_descriptors_total = Counter::default();
        registry.register(
            "vaultsync_sync_descriptors",
            "Record state descriptors sent to clients",
            sync_descriptors_total.clone(),
        );

        let integrity_failures_total = Counter::default();
        registry.register(
            "vaultsync_integrity_failures",
            "Envelopes whose hash did not match",
            integrity_failures_total.clone(),
        );

        let auth_failures_total = Family::<AuthLabels, Counter>::default();
        registry.register(
            "vaultsync_auth_failures",
            "Rejected authentications by reason",
            auth_failures_total.clone(),
        );

        let users = Gauge::default();
        registry.register("vaultsync_users", "Registered users", users.clone());

        let live_records = Gauge::default();
        registry.register(
            "vaultsync_live_records",
            "Live records across all vaults",
            live_records.clone(),
        );

        let tombstones = Gauge::default();
        registry.register(
            "vaultsync_tombstones",
            "Tombstoned records across all vaults",
            tombstones.clone(),
        );

        Self {
            registry: Arc::new(RwLock::new(registry)),
            http_requests_total,
            http_request_duration_seconds,
            http_requests_in_flight,
            mutations_total,
            mutated_records_total,
            sync_descriptors_total,
            integrity_failures_total,
            auth_failures_total,
            users,
            live_records,
            tombstones,
        }
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let labels = HttpLabels {
            method: method.to_string(),
            path: path.to_string(),
            status,
        };

        self.http_requests_total.get_or_create(&labels).inc();
        self.http_request_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record the outcome of a mutation batch.
    pub fn record_mutation<T>(&self, operation: &str, result: &Result<Vec<T>, VaultError>) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        let labels = MutationLabels {
            operation: operation.to_string(),
            outcome: outcome.to_string(),
        };
        self.mutations_total.get_or_create(&labels).inc();

        if let Ok(items) = result {
            self.mutated_records_total
                .get_or_create(&labels)
                .inc_by(items.len() as u64);
        }
    }

    /// Record an authentication failure.
    pub fn record_auth_failure(&self, reason: &str) {
        self.auth_failures_total
            .get_or_create(&AuthLabels {
                reason: reason.to_string(),
            })
            .inc();
    }

    /// Update vault size gauges.
    pub fn set_storage_stats(&self, stats: StorageStats) {
        self.users.set(stats.users as i64);
        self.live_records.set(stats.live_records as i64);
        self.tombstones.set(stats.tombstones as i64);
    }

    /// Encode metrics for Prometheus scraping.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        let registry = self.registry.read();
        prometheus_client::encoding::text::encode(&mut buffer, &registry)?;
        Ok(buffer)
    }
}
