//! Account endpoints.
//!
//! ## Endpoints
//!
//! - `POST /user/register` - Create an account
//! - `POST /user/login` - Exchange login and master password for a token
//! - `GET /user/encryption-salt` - The caller's key derivation salt

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;
use vaultsync_core::{Identity, VaultError};
use vaultsync_types::{Timestamp, UserId};

use crate::api::{ApiError, AppState};
use crate::extract::JsonBody;

/// Login and master password.
#[derive(Clone, Deserialize, Validate)]
pub struct Credentials {
    /// Account name.
    #[validate(length(min = 1, max = 256))]
    pub login: String,
    /// Master password.
    #[validate(length(min = 1, max = 1024))]
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    fn checked(self) -> Result<Self, ApiError> {
        self.validate()
            .map_err(|e| VaultError::validation(e.to_string()))?;
        Ok(self)
    }
}

/// Response to a registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    /// The new user's id.
    pub user_id: UserId,
    /// Salt for client-side key derivation.
    pub encryption_salt: String,
}

/// Response to a login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Bearer token.
    pub token: String,
    /// Always `Bearer`.
    pub token_type: String,
    /// Expiry in Unix milliseconds.
    pub expires_at: Timestamp,
}

/// Response carrying the caller's encryption salt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaltResponse {
    /// Salt for client-side key derivation.
    pub encryption_salt: String,
}

/// Routes that need no token.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/user/register", post(register))
        .route("/user/login", post(login))
}

/// Routes that need a token.
pub fn salt_routes() -> Router<AppState> {
    Router::new().route("/user/encryption-salt", get(encryption_salt))
}

async fn register(
    State(state): State<AppState>,
    JsonBody(creds): JsonBody<Credentials>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let creds = creds.checked()?;
    let registration = state.accounts.register(creds.login, creds.password).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: registration.user_id,
            encryption_salt: registration.encryption_salt,
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    JsonBody(creds): JsonBody<Credentials>,
) -> Result<Json<LoginResponse>, ApiError> {
    let creds = creds.checked()?;
    let issued = state.accounts.login(creds.login, creds.password).await?;

    Ok(Json(LoginResponse {
        token: issued.token,
        token_type: "Bearer".to_string(),
        expires_at: issued.expires_at,
    }))
}

async fn encryption_salt(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<SaltResponse>, ApiError> {
    let encryption_salt = state.accounts.encryption_salt(&identity).await?;
    Ok(Json(SaltResponse { encryption_salt }))
}
