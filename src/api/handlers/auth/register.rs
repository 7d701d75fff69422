//! Registration: redeem a register code, create the user, issue a session.

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
    delete_codes_for_email, find_user_by_email, find_valid_code, insert_user, InsertUserOutcome,
};
use super::types::{AuthResponse, RegisterRequest};
use super::utils::{extract_client_ip, normalize_email, valid_code, valid_email};

/// Register with a verification code previously sent to the email.
///
/// A wrong code and an expired code are indistinguishable to the caller.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = AuthResponse),
        (status = 400, description = "Invalid code or user already exists"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    payload: Option<Json<RegisterRequest>>,
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

    let referral_code = request
        .referral_code
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());

    if find_valid_code(&pool, &email, code, CodeKind::Register)
        .await?
        .is_none()
    {
        auth_state
            .rate_limiter()
            .record_auth_failure(client_ip.as_deref());
        return Err(ApiError::InvalidVerificationCode);
    }

    if find_user_by_email(&pool, &email).await?.is_some() {
        auth_state
            .rate_limiter()
            .record_auth_failure(client_ip.as_deref());
        return Err(ApiError::UserAlreadyExists);
    }

    let user = match insert_user(&pool, &email, referral_code).await? {
        InsertUserOutcome::Created(user) => user,
        // Lost a signup race between the existence check and the insert.
        InsertUserOutcome::EmailTaken => {
            auth_state
                .rate_limiter()
                .record_auth_failure(client_ip.as_deref());
            return Err(ApiError::UserAlreadyExists);
        }
    };

    let deleted = delete_codes_for_email(&pool, &email).await?;
    debug!(deleted, "consumed verification codes after registration");

    let token = issue_token(auth_state.config(), &user)?;

    info!(user_id = %user.id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            success: true,
            user: user.into(),
            token,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::NoopRateLimiter;
    use super::super::state::{AuthConfig, AuthState};
    use super::*;
    use crate::api::email::LogEmailSender;
    use axum::response::IntoResponse;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;

    fn state() -> Arc<AuthState> {
        Arc::new(AuthState::with_rate_limiter(
            AuthConfig::new(
                SecretString::from("test-secret"),
                "http://localhost:3000".to_string(),
            ),
            Arc::new(LogEmailSender),
            Arc::new(NoopRateLimiter),
        ))
    }

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/postgres")
            .unwrap()
    }

    #[tokio::test]
    async fn missing_payload_is_bad_request() {
        let response = register(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(state()),
            None,
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn short_code_is_bad_request() {
        let response = register(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(state()),
            None,
            Some(Json(RegisterRequest {
                email: "a@example.com".to_string(),
                code: "123".to_string(),
                referral_code: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn non_numeric_code_is_bad_request() {
        let response = register(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(state()),
            None,
            Some(Json(RegisterRequest {
                email: "a@example.com".to_string(),
                code: "12345a".to_string(),
                referral_code: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
