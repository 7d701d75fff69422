//! Small helpers for auth validation and request metadata.

use rand::Rng;
use regex::Regex;
use std::net::SocketAddr;
use std::sync::LazyLock;

const REFERRAL_CODE_LEN: usize = 8;
const REFERRAL_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("EMAIL_REGEX: invalid regex pattern")
});

/// Normalize an email for lookup/uniqueness checks.
pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(super) fn valid_email(email_normalized: &str) -> bool {
    EMAIL_REGEX.is_match(email_normalized)
}

/// Codes are exactly 6 ASCII digits.
pub(super) fn valid_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

/// Generate an 8-char uppercase alphanumeric referral code.
///
/// Uniqueness is enforced by the database; callers retry on collision.
pub(super) fn generate_referral_code() -> String {
    let mut rng = rand::thread_rng();
    (0..REFERRAL_CODE_LEN)
        .map(|_| {
            let index = rng.gen_range(0..REFERRAL_CODE_CHARSET.len());
            REFERRAL_CODE_CHARSET[index] as char
        })
        .collect()
}

/// Constraint name of a unique violation, if the error is one.
pub(super) fn unique_violation_constraint(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) if db_err.code().is_some_and(|code| code.as_ref() == "23505") => {
            db_err.constraint().map(str::to_string)
        }
        _ => None,
    }
}

/// Extract a client IP for rate limiting. Proxy headers win when present,
/// the socket peer address covers direct clients.
pub(crate) fn extract_client_ip(
    headers: &axum::http::HeaderMap,
    peer: Option<SocketAddr>,
) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);
    if real_ip.is_some() {
        return real_ip;
    }
    peer.map(|addr| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn valid_code_requires_six_digits() {
        assert!(valid_code("000000"));
        assert!(valid_code("123456"));
        assert!(!valid_code("12345"));
        assert!(!valid_code("1234567"));
        assert!(!valid_code("12345a"));
        assert!(!valid_code(""));
    }

    #[test]
    fn referral_code_shape() {
        for _ in 0..100 {
            let code = generate_referral_code();
            assert_eq!(code.len(), 8);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
        constraint: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn constraint(&self) -> Option<&str> {
            self.constraint
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn unique_violation_constraint_reports_name() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
            constraint: Some("users_email_key"),
        }));
        assert_eq!(
            unique_violation_constraint(&err).as_deref(),
            Some("users_email_key")
        );

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("42703"),
            constraint: Some("users_email_key"),
        }));
        assert_eq!(unique_violation_constraint(&err), None);

        let err = sqlx::Error::RowNotFound;
        assert_eq!(unique_violation_constraint(&err), None);
    }

    fn peer(ip: [u8; 4]) -> Option<SocketAddr> {
        Some(SocketAddr::from((ip, 40000)))
    }

    #[test]
    fn extract_client_ip_prefers_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(
            extract_client_ip(&headers, peer([8, 8, 8, 8])),
            Some("1.2.3.4".to_string())
        );
    }

    #[test]
    fn extract_client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(
            extract_client_ip(&headers, peer([8, 8, 8, 8])),
            Some("9.9.9.9".to_string())
        );
    }

    #[test]
    fn extract_client_ip_uses_peer_without_headers() {
        let headers = HeaderMap::new();
        assert_eq!(
            extract_client_ip(&headers, peer([203, 0, 113, 9])),
            Some("203.0.113.9".to_string())
        );
    }

    #[test]
    fn extract_client_ip_none_when_nothing_known() {
        let headers = HeaderMap::new();
        assert_eq!(extract_client_ip(&headers, None), None);
    }
}
