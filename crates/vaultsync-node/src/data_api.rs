//! Record endpoints.
//!
//! ## Endpoints
//!
//! - `POST /data/` - Upload new records (signed envelope)
//! - `POST /data/download` - Fetch named live records
//! - `GET /data/all` - Fetch every live record
//! - `PUT /data/update` - Version-checked updates (signed envelope)
//! - `DELETE /data/delete` - Version-checked tombstoning
//!
//! Every batch is all-or-nothing. Mutations answer with the resulting
//! record state descriptors.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use serde::Serialize;
use vaultsync_core::{DeleteRequest, IdsRequest, Identity, UpdateRequest, UploadRequest, UserScoped};
use vaultsync_types::Record;

use crate::api::{request_context, ApiError, AppState};
use crate::extract::{JsonBody, Verified};
use crate::observability::METRICS;
use crate::sync_api::StatesResponse;

/// A list of records.
#[derive(Debug, Clone, Serialize)]
pub struct RecordsResponse {
    /// The records.
    pub records: Vec<Record>,
    /// `records.len()`.
    pub length: usize,
}

impl From<Vec<Record>> for RecordsResponse {
    fn from(records: Vec<Record>) -> Self {
        Self {
            length: records.len(),
            records,
        }
    }
}

/// Creates the record routes.
pub fn data_routes() -> Router<AppState> {
    Router::new()
        .route("/data/", post(upload))
        .route("/data/download", post(download))
        .route("/data/all", get(all_records))
        .route("/data/update", put(update))
        .route("/data/delete", delete(delete_records))
}

async fn upload(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Verified(req): Verified<UploadRequest>,
) -> Result<(StatusCode, Json<StatesResponse>), ApiError> {
    let scope = state.guard.authorize(&identity, req.user_id())?;
    req.check_length()?;

    let (ctx, _cancel) = request_context(scope);
    let result = state.mutations.upload(&ctx, req.payload_list).await;
    METRICS.record_mutation("upload", &result);

    Ok((StatusCode::CREATED, Json(result?.into())))
}

async fn update(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Verified(req): Verified<UpdateRequest>,
) -> Result<Json<StatesResponse>, ApiError> {
    let scope = state.guard.authorize(&identity, req.user_id())?;
    req.check_length()?;

    let (ctx, _cancel) = request_context(scope);
    let result = state.mutations.update(&ctx, req.private_data_updates).await;
    METRICS.record_mutation("update", &result);

    Ok(Json(result?.into()))
}

async fn delete_records(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    JsonBody(req): JsonBody<DeleteRequest>,
) -> Result<Json<StatesResponse>, ApiError> {
    let scope = state.guard.authorize(&identity, req.user_id())?;
    req.check_length()?;

    let (ctx, _cancel) = request_context(scope);
    let result = state.mutations.delete(&ctx, req.delete_entries).await;
    METRICS.record_mutation("delete", &result);

    Ok(Json(result?.into()))
}

async fn download(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    JsonBody(req): JsonBody<IdsRequest>,
) -> Result<Json<RecordsResponse>, ApiError> {
    let scope = state.guard.authorize(&identity, req.user_id())?;
    req.check_length()?;

    let (ctx, _cancel) = request_context(scope);
    let records = state.sync.download(&ctx, req.client_side_ids).await?;
    Ok(Json(records.into()))
}

async fn all_records(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<RecordsResponse>, ApiError> {
    let (ctx, _cancel) = request_context(state.guard.scope_for(&identity));
    let records = state.sync.all_records(&ctx).await?;
    Ok(Json(records.into()))
}
