//! Bearer token middleware.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};
use vaultsync_auth::extract_bearer;
use vaultsync_core::{AuthFailure, Identity, VaultError};

use crate::api::{ApiError, AppState};

/// Verifies the bearer token and attaches the caller's [`Identity`].
///
/// Any scheme word is accepted; the token is the second field of the
/// `Authorization` header.
pub async fn require_identity(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let header = match request.headers().get(AUTHORIZATION) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| VaultError::Authentication(AuthFailure::MalformedHeader))?,
        ),
        None => None,
    };

    let token = extract_bearer(header).map_err(VaultError::from)?;
    let user_id = state
        .accounts
        .tokens()
        .verify(token)
        .map_err(VaultError::from)?;

    request.extensions_mut().insert(Identity::new(user_id));
    Ok(next.run(request).await)
}
