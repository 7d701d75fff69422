//! Verification code issuance.

use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::api::email::EmailMessage;
use crate::api::error::{ApiError, FieldError};

use super::code::{calculate_expiration, generate_verification_code, CodeKind};
use super::rate_limit::RateLimitDecision;
use super::session::{extract_bearer_token, verify_token};
use super::state::AuthState;
use super::storage::{find_user_by_email, insert_verification_code};
use super::types::{SendCodeRequest, SendCodeResponse};
use super::utils::{extract_client_ip, normalize_email, valid_email};

/// Issue a 6-digit verification code for register or login.
///
/// Delivery happens before the code is persisted. A failed send leaves no
/// stored code, so the client can retry immediately.
#[utoipa::path(
    post,
    path = "/api/auth/send-code",
    request_body = SendCodeRequest,
    responses(
        (status = 200, description = "Code sent", body = SendCodeResponse),
        (status = 400, description = "Invalid email or type"),
        (status = 429, description = "Rate limited"),
        (status = 503, description = "Email delivery unavailable")
    ),
    tag = "auth"
)]
pub async fn send_code(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    payload: Option<Json<SendCodeRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::validation("Email and type are required"));
    };

    let email = normalize_email(&request.email);
    let kind = CodeKind::parse(request.kind.trim());

    let mut details = Vec::new();
    if !valid_email(&email) {
        details.push(FieldError::new("email", "Invalid email format"));
    }
    if kind.is_none() {
        details.push(FieldError::new("type", "Type must be register or login"));
    }
    if !details.is_empty() {
        return Err(ApiError::validation_fields("Validation failed", details));
    }
    let Some(kind) = kind else {
        return Err(ApiError::validation("Type must be register or login"));
    };

    // A valid bearer token raises the per-IP cap; anything else is anonymous.
    let authenticated = extract_bearer_token(&headers)
        .and_then(|token| verify_token(auth_state.config(), &token).ok())
        .is_some();

    let client_ip = extract_client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    if let RateLimitDecision::Limited { retry_after } =
        auth_state
            .rate_limiter()
            .check_send_code(client_ip.as_deref(), &email, authenticated)
    {
        return Err(ApiError::RateLimit { retry_after });
    }

    // Login codes only go to known accounts; register codes go to anyone.
    if kind == CodeKind::Login && find_user_by_email(&pool, &email).await?.is_none() {
        return Err(ApiError::UserNotFound);
    }

    let code = generate_verification_code();
    let ttl_minutes = auth_state.config().code_ttl_minutes();
    let expires_at = calculate_expiration(ttl_minutes);

    let message = EmailMessage::verification_code(&email, &code, kind.as_str(), ttl_minutes);
    auth_state.mailer().send(&message).await?;

    insert_verification_code(&pool, &email, &code, kind, expires_at).await?;

    info!(kind = kind.as_str(), "verification code sent");

    Ok((
        StatusCode::OK,
        Json(SendCodeResponse {
            success: true,
            message: "Verification code sent".to_string(),
            expires_at,
        }),
    ))
}
