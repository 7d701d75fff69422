//! Bearer-protected profile lookup.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;

use crate::api::error::ApiError;

use super::session::require_auth;
use super::state::AuthState;
use super::storage::find_user_by_id;
use super::types::MeResponse;

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user profile", body = MeResponse),
        (status = 401, description = "Missing or expired token"),
        (status = 403, description = "Invalid token"),
        (status = 404, description = "User no longer exists")
    ),
    security(("bearer_token" = [])),
    tag = "auth"
)]
pub async fn me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = require_auth(&headers, auth_state.config())?;

    let user = find_user_by_id(&pool, claims.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok((
        StatusCode::OK,
        Json(MeResponse {
            success: true,
            user: user.into(),
        }),
    ))
}
