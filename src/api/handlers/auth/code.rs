//! Verification code generation and expiry.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// Which flow a verification code belongs to. Codes issued for one flow
/// never validate for the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodeKind {
    Register,
    Login,
}

impl CodeKind {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "register" => Some(Self::Register),
            "login" => Some(Self::Login),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Login => "login",
        }
    }
}

/// Generate a 6-digit code, uniform over 000000-999999 with leading zeros
/// preserved.
#[must_use]
pub fn generate_verification_code() -> String {
    let value = rand::thread_rng().gen_range(0..1_000_000u32);
    format!("{value:06}")
}

/// Expiry timestamp `minutes` from now.
#[must_use]
pub fn calculate_expiration(minutes: i64) -> DateTime<Utc> {
    Utc::now() + Duration::minutes(minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_six_digits() {
        for _ in 0..1000 {
            let code = generate_verification_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn code_preserves_leading_zeros() {
        // Sampling until a code below 100000 shows up keeps the format honest.
        let found = (0..10_000)
            .map(|_| generate_verification_code())
            .any(|code| code.starts_with('0'));
        assert!(found);
    }

    #[test]
    fn expiration_is_in_the_future() {
        let expires_at = calculate_expiration(10);
        let delta = expires_at - Utc::now();
        assert!(delta > Duration::minutes(9));
        assert!(delta <= Duration::minutes(10));
    }

    #[test]
    fn code_kind_parses_known_values() {
        assert_eq!(CodeKind::parse("register"), Some(CodeKind::Register));
        assert_eq!(CodeKind::parse("login"), Some(CodeKind::Login));
        assert_eq!(CodeKind::parse("reset"), None);
        assert_eq!(CodeKind::parse(""), None);
    }

    #[test]
    fn code_kind_round_trips() {
        assert_eq!(CodeKind::parse(CodeKind::Register.as_str()), Some(CodeKind::Register));
        assert_eq!(CodeKind::parse(CodeKind::Login.as_str()), Some(CodeKind::Login));
    }
}
