//! HTTP API for the vaultsync node.
//!
//! Shared state, the error-to-status mapping, and the router with its
//! transport layers.

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::{
    catch_panic::CatchPanicLayer, compression::CompressionLayer,
    decompression::RequestDecompressionLayer, limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer, trace::TraceLayer,
};
use vaultsync_auth::TokenService;
use vaultsync_core::{
    AccountService, AuthFailure, AuthorizationGuard, HasherPool, IntegrityGate, MutationEngine,
    RequestContext, SyncEngine, UserScope, VaultError,
};
use vaultsync_storage::{CredentialStore, VaultStore};

use crate::auth::require_identity;
use crate::config::NodeConfig;
use crate::health::{health_routes, HealthState};
use crate::observability::{metrics_middleware, request_id_middleware, METRICS};
use crate::{data_api, sync_api, user_api};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Upload, update, and delete batches.
    pub mutations: MutationEngine,
    /// Descriptors and record listings.
    pub sync: SyncEngine,
    /// Registration, login, salts, and token verification.
    pub accounts: AccountService,
    /// Envelope MAC verification.
    pub integrity: IntegrityGate,
    /// Cross-user request check.
    pub guard: AuthorizationGuard,
    /// The record store, for health checks and gauges.
    pub store: Arc<dyn VaultStore>,
    /// Liveness and readiness.
    pub health: HealthState,
    /// Per-request deadline.
    pub request_timeout: Duration,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl AppState {
    /// Wires engines and services from a validated configuration.
    pub fn new(
        config: &NodeConfig,
        store: Arc<dyn VaultStore>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, VaultError> {
        let max_items = config.limits.max_batch_items;
        let pool = HasherPool::new(config.integrity.key.as_bytes(), config.integrity.pool_size)?;
        let tokens = TokenService::new(
            config.auth.signing_key.as_bytes(),
            config.auth.issuer.clone(),
            config.auth.token_ttl_secs,
        );

        Ok(Self {
            mutations: MutationEngine::new(Arc::clone(&store), max_items),
            sync: SyncEngine::new(Arc::clone(&store), max_items),
            accounts: AccountService::new(credentials, tokens),
            integrity: IntegrityGate::new(pool),
            guard: AuthorizationGuard,
            store,
            health: HealthState::new(),
            request_timeout: Duration::from_secs(config.server.request_timeout_secs),
            max_body_bytes: config.server.max_body_bytes,
        })
    }
}

/// Builds the context for one engine call.
///
/// The returned guard cancels the context when dropped, so a request future
/// abandoned by a timeout or a closed connection stops its transaction
/// before commit.
pub(crate) fn request_context(scope: UserScope) -> (RequestContext, DropGuard) {
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    (RequestContext::new(scope, cancel), guard)
}

/// API error: a core error kind on its way to the client.
#[derive(Debug)]
pub struct ApiError(pub VaultError);

impl From<VaultError> for ApiError {
    fn from(err: VaultError) -> Self {
        ApiError(err)
    }
}

fn auth_reason(failure: AuthFailure) -> &'static str {
    match failure {
        AuthFailure::MissingHeader => "missing_header",
        AuthFailure::MalformedHeader => "malformed_header",
        AuthFailure::EmptyToken => "empty_token",
        AuthFailure::Expired => "expired",
        AuthFailure::InvalidToken => "invalid_token",
        AuthFailure::InvalidCredentials => "invalid_credentials",
    }
}

impl ApiError {
    /// HTTP status for the error kind.
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            VaultError::Validation(_) | VaultError::Integrity => StatusCode::BAD_REQUEST,
            VaultError::Authentication(_) => StatusCode::UNAUTHORIZED,
            VaultError::Authorization => StatusCode::FORBIDDEN,
            VaultError::NotFound(_) => StatusCode::NOT_FOUND,
            VaultError::UniquenessConflict(_) | VaultError::VersionConflict { .. } => {
                StatusCode::CONFLICT
            }
            VaultError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            VaultError::Cancelled => StatusCode::REQUEST_TIMEOUT,
            VaultError::Storage {
                retryable: true, ..
            } => StatusCode::SERVICE_UNAVAILABLE,
            VaultError::Storage { .. } | VaultError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Client-facing message. Server-side details stay in the logs.
    pub fn message(&self) -> String {
        match &self.0 {
            VaultError::Authentication(failure) => failure.message().to_string(),
            VaultError::BadGateway(_) => "upstream service unavailable".to_string(),
            VaultError::Storage {
                retryable: true, ..
            } => "storage busy, retry later".to_string(),
            VaultError::Storage { .. } | VaultError::Internal(_) => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self.0 {
            VaultError::Authentication(failure) => {
                METRICS.record_auth_failure(auth_reason(*failure));
            }
            VaultError::Integrity => {
                METRICS.integrity_failures_total.inc();
            }
            _ => {}
        }

        if status.is_server_error() {
            tracing::error!(kind = self.0.kind(), error = %self.0, "request failed");
        } else {
            tracing::debug!(kind = self.0.kind(), error = %self.0, "request rejected");
        }

        (status, self.message()).into_response()
    }
}

/// Prometheus scrape endpoint.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let store = Arc::clone(&state.store);
    match tokio::task::spawn_blocking(move || store.stats()).await {
        Ok(Ok(stats)) => METRICS.set_storage_stats(stats),
        Ok(Err(e)) => tracing::warn!(error = %e, "failed to read storage stats"),
        Err(e) => tracing::warn!(error = %e, "storage stats task failed"),
    }

    match METRICS.encode() {
        Ok(body) => (
            [(
                header::CONTENT_TYPE,
                "application/openmetrics-text; version=1.0.0; charset=utf-8",
            )],
            Body::from(body),
        )
            .into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response(),
    }
}

/// Creates the API router.
pub fn create_router(state: AppState) -> Router {
    let authenticated = Router::new()
        .merge(data_api::data_routes())
        .merge(sync_api::sync_routes())
        .merge(user_api::salt_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_identity,
        ));

    let public = Router::new()
        .merge(user_api::account_routes())
        .merge(health_routes())
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(authenticated)
        .merge(public)
        .route_layer(middleware::from_fn(metrics_middleware))
        // Limits the decompressed body.
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.max_body_bytes))
        .layer(RequestDecompressionLayer::new())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.request_timeout,
        ))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}
