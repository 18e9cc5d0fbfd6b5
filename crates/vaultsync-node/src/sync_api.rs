//! Sync endpoints.
//!
//! ## Endpoints
//!
//! - `GET /sync/` - Descriptors of every record in the caller's vault
//! - `POST /sync/specific` - Descriptors of the named records
//!
//! Tombstones are included in both. Unknown ids are left out of the
//! targeted response.

use axum::{
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use vaultsync_core::{IdsRequest, Identity, UserScoped};
use vaultsync_types::RecordState;

use crate::api::{request_context, ApiError, AppState};
use crate::extract::JsonBody;
use crate::observability::METRICS;

/// A list of record state descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatesResponse {
    /// The descriptors.
    pub states: Vec<RecordState>,
    /// `states.len()`.
    pub length: usize,
}

impl From<Vec<RecordState>> for StatesResponse {
    fn from(states: Vec<RecordState>) -> Self {
        Self {
            length: states.len(),
            states,
        }
    }
}

/// Creates the sync routes.
pub fn sync_routes() -> Router<AppState> {
    Router::new()
        .route("/sync/", get(full_sync))
        .route("/sync/specific", post(targeted_sync))
}

async fn full_sync(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<StatesResponse>, ApiError> {
    let (ctx, _cancel) = request_context(state.guard.scope_for(&identity));
    let states = state.sync.full_states(&ctx).await?;

    METRICS.sync_descriptors_total.inc_by(states.len() as u64);
    Ok(Json(states.into()))
}

async fn targeted_sync(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    JsonBody(req): JsonBody<IdsRequest>,
) -> Result<Json<StatesResponse>, ApiError> {
    let scope = state.guard.authorize(&identity, req.user_id())?;
    req.check_length()?;

    let (ctx, _cancel) = request_context(scope);
    let states = state.sync.states_for(&ctx, req.client_side_ids).await?;

    METRICS.sync_descriptors_total.inc_by(states.len() as u64);
    Ok(Json(states.into()))
}
