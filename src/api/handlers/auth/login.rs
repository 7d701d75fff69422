//! Login: redeem a login code and issue a session.

use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::error::{ApiError, FieldError};

use super::code::CodeKind;
use super::rate_limit::RateLimitDecision;
use super::session::issue_token;
use super::state::AuthState;
use super::storage::{
    delete_codes_for_email, find_user_by_email, find_valid_code, touch_last_login,
};
use super::types::{AuthResponse, LoginRequest};
use super::utils::{extract_client_ip, normalize_email, valid_code, valid_email};

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 400, description = "Invalid code or unknown user"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::validation("Email and code are required"));
    };

    let email = normalize_email(&request.email);
    let code = request.code.trim();

    let mut details = Vec::new();
    if !valid_email(&email) {
        details.push(FieldError::new("email", "Invalid email format"));
    }
    if !valid_code(code) {
        details.push(FieldError::new("code", "Code must be 6 digits"));
    }
    if !details.is_empty() {
        return Err(ApiError::validation_fields("Validation failed", details));
    }

    let client_ip = extract_client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    if let RateLimitDecision::Limited { retry_after } =
        auth_state.rate_limiter().check_auth(client_ip.as_deref())
    {
        return Err(ApiError::RateLimit { retry_after });
    }

    if find_valid_code(&pool, &email, code, CodeKind::Login)
        .await?
        .is_none()
    {
        auth_state
            .rate_limiter()
            .record_auth_failure(client_ip.as_deref());
        return Err(ApiError::InvalidVerificationCode);
    }

    let Some(user) = find_user_by_email(&pool, &email).await? else {
        auth_state
            .rate_limiter()
            .record_auth_failure(client_ip.as_deref());
        return Err(ApiError::UserNotFound);
    };

    let user = touch_last_login(&pool, user.id).await?.unwrap_or(user);

    let deleted = delete_codes_for_email(&pool, &email).await?;
    debug!(deleted, "consumed verification codes after login");

    let token = issue_token(auth_state.config(), &user)?;

    info!(user_id = %user.id, "user logged in");

    Ok((
        StatusCode::OK,
        Json(AuthResponse {
            success: true,
            user: user.into(),
            token,
        }),
    ))
}
