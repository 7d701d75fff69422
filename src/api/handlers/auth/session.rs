//! Stateless JWT session tokens.
//!
//! Tokens are HS256 over the configured secret. Expired tokens map to 401 so
//! clients know to re-authenticate; any other decode failure maps to 403.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;

use super::state::AuthConfig;
use super::storage::UserRecord;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: Uuid,
    pub email: String,
    pub is_verified: bool,
    pub my_referral_code: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issue a session token for a user.
pub(super) fn issue_token(config: &AuthConfig, user: &UserRecord) -> Result<String, ApiError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        user_id: user.id,
        email: user.email.clone(),
        is_verified: user.is_verified,
        my_referral_code: user.my_referral_code.clone(),
        iat: now,
        exp: now + config.token_ttl_seconds(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret().expose_secret().as_bytes()),
    )
    .map_err(|err| ApiError::Internal(anyhow::anyhow!("failed to sign session token: {err}")))
}

/// Verify a token and return its claims.
pub(crate) fn verify_token(config: &AuthConfig, token: &str) -> Result<Claims, ApiError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret().expose_secret().as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|err| match err.kind() {
        ErrorKind::ExpiredSignature => ApiError::Authentication("Token expired".to_string()),
        _ => ApiError::Authorization("Invalid token".to_string()),
    })
}

pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Require a valid bearer token or fail with the matching status.
pub(crate) fn require_auth(headers: &HeaderMap, config: &AuthConfig) -> Result<Claims, ApiError> {
    let token = extract_bearer_token(headers)
        .ok_or_else(|| ApiError::Authentication("Access token required".to_string()))?;
    verify_token(config, &token)
}
