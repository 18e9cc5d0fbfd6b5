//! Bearer tokens.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use vaultsync_types::{Timestamp, UserId};

use crate::error::{Result, TokenError};

/// Claims carried by a vaultsync bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer; must match the configured issuer.
    pub iss: String,
    /// User id as a decimal string.
    pub sub: String,
    /// Issued-at, Unix seconds.
    pub iat: i64,
    /// Expires-at, Unix seconds.
    pub exp: i64,
}

/// A freshly issued token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Compact JWS serialization.
    pub token: String,
    /// When the token stops verifying.
    pub expires_at: Timestamp,
}

/// Issues and verifies HS256 bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    issuer: String,
    ttl_secs: u64,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("issuer", &self.issuer)
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Creates a service signing with `signing_key`.
    pub fn new(signing_key: &[u8], issuer: impl Into<String>, ttl_secs: u64) -> Self {
        let issuer = issuer.into();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = 0;

        Self {
            issuer,
            ttl_secs,
            encoding_key: EncodingKey::from_secret(signing_key),
            decoding_key: DecodingKey::from_secret(signing_key),
            validation,
        }
    }

    /// Issues a token for `user_id`, valid from now.
    pub fn issue(&self, user_id: UserId) -> Result<IssuedToken> {
        self.issue_at(user_id, Timestamp::now())
    }

    /// Issues a token for `user_id` as if it were `issued_at`.
    pub fn issue_at(&self, user_id: UserId, issued_at: Timestamp) -> Result<IssuedToken> {
        let iat = issued_at.as_secs();
        let exp = iat.saturating_add(i64::try_from(self.ttl_secs).unwrap_or(i64::MAX));

        let claims = Claims {
            iss: self.issuer.clone(),
            sub: user_id.to_string(),
            iat,
            exp,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Crypto(e.to_string()))?;

        Ok(IssuedToken {
            token,
            expires_at: Timestamp::from_millis(exp.saturating_mul(1000)),
        })
    }

    /// Verifies signature, issuer, and expiry, returning the subject.
    pub fn verify(&self, token: &str) -> Result<UserId> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            }
        })?;

        data.claims
            .sub
            .parse::<UserId>()
            .map_err(|e| TokenError::Invalid(format!("subject: {}", e)))
    }
}

/// Extracts the token from an `Authorization` header value.
///
/// The header must have exactly two whitespace-separated fields,
/// `<scheme> <token>`. The scheme itself is not checked.
pub fn extract_bearer(header: Option<&str>) -> Result<&str> {
    let header = header.ok_or(TokenError::MissingHeader)?;

    let (_scheme, rest) = header
        .trim()
        .split_once(char::is_whitespace)
        .ok_or_else(|| {
            if header.trim().is_empty() {
                TokenError::MalformedHeader
            } else if header.ends_with(char::is_whitespace) {
                // "Bearer " with nothing after the scheme.
                TokenError::EmptyToken
            } else {
                TokenError::MalformedHeader
            }
        })?;

    let mut fields = rest.split_whitespace();
    let token = fields.next().ok_or(TokenError::EmptyToken)?;
    if fields.next().is_some() {
        return Err(TokenError::MalformedHeader);
    }

    Ok(token)
}
