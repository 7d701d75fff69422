//! Uniform API error taxonomy and response translation.
//!
//! Every handler returns `Result<_, ApiError>`; this module is the single
//! place where errors become HTTP responses, so status codes and the
//! `{success: false, error: ...}` body shape stay consistent across routes.
//! Internals (database/transport messages) are only included when the
//! error-details flag is set at startup, which happens automatically outside
//! production.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::api::email::EmailError;

static ERROR_DETAILS: OnceLock<bool> = OnceLock::new();

/// Decide once at startup whether responses may carry internals.
pub fn set_error_details(enabled: bool) {
    let _ = ERROR_DETAILS.set(enabled);
}

fn error_details() -> bool {
    ERROR_DETAILS.get().copied().unwrap_or(false)
}

/// Per-field validation failure reported back to the client.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    #[must_use]
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation {
        message: String,
        details: Vec<FieldError>,
    },

    #[error("Invalid or expired verification code")]
    InvalidVerificationCode,

    #[error("User already exists")]
    UserAlreadyExists,

    #[error("User not found")]
    UserNotFound,

    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Too many requests, please try again later")]
    RateLimit { retry_after: u64 },

    #[error("Failed to send verification email")]
    Email(#[from] EmailError),

    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Shorthand for a single-message validation failure.
    #[must_use]
    pub fn validation(message: &str) -> Self {
        Self::Validation {
            message: message.to_string(),
            details: Vec::new(),
        }
    }

    #[must_use]
    pub fn validation_fields(message: &str, details: Vec<FieldError>) -> Self {
        Self::Validation {
            message: message.to_string(),
            details,
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. }
            | Self::InvalidVerificationCode
            | Self::UserAlreadyExists
            | Self::UserNotFound => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Authorization(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Email(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn internal_detail(&self) -> Option<String> {
        match self {
            Self::Email(err) => Some(err.to_string()),
            Self::Database(err) => Some(err.to_string()),
            Self::Internal(err) => Some(format!("{err:#}")),
            _ => None,
        }
    }
}

#[derive(Serialize, ToSchema)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<FieldError>>,
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // 5xx means something broke on our side; 4xx is expected client noise.
        if status.is_server_error() {
            error!(status = %status, "request failed: {self:#}");
        } else {
            warn!(status = %status, "request rejected: {self}");
        }

        let details = match &self {
            Self::Validation { details, .. } if !details.is_empty() => Some(details.clone()),
            _ => None,
        };
        let retry_after = match &self {
            Self::RateLimit { retry_after } => Some(*retry_after),
            _ => None,
        };
        let detail = if error_details() {
            self.internal_detail()
        } else {
            None
        };

        let body = ErrorBody {
            success: false,
            error: self.to_string(),
            details,
            retry_after,
            detail,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(error: ApiError) -> serde_json::Value {
        let response = error.into_response();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn status_codes_per_variant() {
        assert_eq!(
            ApiError::validation("bad").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::InvalidVerificationCode.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::UserAlreadyExists.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::UserNotFound.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Authentication("x".to_string()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Authorization("x".to_string()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("x".to_string()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::RateLimit { retry_after: 60 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::Email(EmailError::Delivery("smtp down".to_string())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ApiError::Database(sqlx::Error::RowNotFound).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn validation_body_carries_details() {
        let error = ApiError::validation_fields(
            "Validation failed",
            vec![FieldError::new("email", "Invalid email format")],
        );
        let value = body_json(error).await;
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "Validation failed");
        assert_eq!(value["details"][0]["field"], "email");
    }

    #[tokio::test]
    async fn rate_limit_body_carries_retry_after() {
        let value = body_json(ApiError::RateLimit { retry_after: 42 }).await;
        assert_eq!(value["retryAfter"], 42);
        assert_eq!(value["success"], false);
    }

    #[tokio::test]
    async fn internal_errors_hide_detail_by_default() {
        let value = body_json(ApiError::Internal(anyhow::anyhow!("boom"))).await;
        assert_eq!(value["error"], "Internal server error");
        assert!(value.get("detail").is_none());
    }
}
