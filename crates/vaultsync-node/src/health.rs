//! # Health Checks
//!
//! - **Liveness** (`GET /health`): the process is up; reports version and
//!   uptime.
//! - **Readiness** (`GET /health/ready`): the node accepts traffic and its
//!   store answers a ping.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api::AppState;

/// Health status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is healthy.
    Up,
    /// Component is unhealthy.
    Down,
}

/// Individual component health.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    /// Component status.
    pub status: HealthStatus,
    /// Probe latency in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ComponentHealth {
    /// Create a healthy component with latency.
    pub fn up_with_latency(latency: Duration) -> Self {
        Self {
            status: HealthStatus::Up,
            latency_ms: Some(latency.as_millis() as u64),
            reason: None,
        }
    }

    /// Create an unhealthy component with reason.
    pub fn down_with_reason(reason: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Down,
            latency_ms: None,
            reason: Some(reason.into()),
        }
    }
}

/// Liveness check response.
#[derive(Debug, Clone, Serialize)]
pub struct LivenessResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Crate version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Readiness check response.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Record store health.
    pub storage: ComponentHealth,
}

/// Process-level health state.
#[derive(Debug, Clone)]
pub struct HealthState {
    start_time: Instant,
    ready: Arc<AtomicBool>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state. Not ready until [`set_ready`](Self::set_ready).
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get uptime in seconds.
    pub fn uptime(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Set readiness state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if service is ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Create health check routes.
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
}

async fn liveness_handler(State(state): State<AppState>) -> Response {
    let response = LivenessResponse {
        status: HealthStatus::Up,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.health.uptime(),
    };

    (StatusCode::OK, Json(response)).into_response()
}

async fn readiness_handler(State(state): State<AppState>) -> Response {
    let storage = if state.health.is_ready() {
        check_storage(&state).await
    } else {
        ComponentHealth::down_with_reason("not accepting traffic")
    };

    let (status, code) = match storage.status {
        HealthStatus::Up => (HealthStatus::Up, StatusCode::OK),
        HealthStatus::Down => (HealthStatus::Down, StatusCode::SERVICE_UNAVAILABLE),
    };

    (code, Json(ReadinessResponse { status, storage })).into_response()
}

async fn check_storage(state: &AppState) -> ComponentHealth {
    let store = Arc::clone(&state.store);
    let start = Instant::now();

    match tokio::task::spawn_blocking(move || store.ping()).await {
        Ok(Ok(())) => ComponentHealth::up_with_latency(start.elapsed()),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "storage check failed");
            ComponentHealth::down_with_reason(e.to_string())
        }
        Err(e) => ComponentHealth::down_with_reason(e.to_string()),
    }
}
