//! Request body extractors.
//!
//! Bodies are buffered whole, so a decompressed body is parsed once and the
//! parsed list is what the envelope MAC is checked against.

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use vaultsync_core::{SignedEnvelope, VaultError};

use crate::api::{ApiError, AppState};

/// A JSON body. Parse failures are validation errors.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        // Oversized bodies keep their own 413.
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;

        serde_json::from_slice(&bytes).map(JsonBody).map_err(|e| {
            ApiError(VaultError::validation(format!("invalid request body: {}", e))).into_response()
        })
    }
}

/// A signed envelope whose MAC has been verified.
#[derive(Debug, Clone)]
pub struct Verified<E>(pub E);

impl<E> FromRequest<AppState> for Verified<E>
where
    E: DeserializeOwned + SignedEnvelope + Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let JsonBody(envelope) = JsonBody::<E>::from_request(req, state).await?;
        state
            .integrity
            .verify(&envelope)
            .await
            .map_err(|e| ApiError(e).into_response())?;
        Ok(Verified(envelope))
    }
}
