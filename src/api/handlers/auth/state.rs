//! Auth configuration and shared state.

use secrecy::SecretString;
use std::sync::Arc;

use crate::api::email::EmailSender;

use super::rate_limit::{MemoryRateLimiter, RateLimiter};

const DEFAULT_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_CODE_TTL_MINUTES: i64 = 10;

#[derive(Clone)]
pub struct AuthConfig {
    jwt_secret: SecretString,
    frontend_origin: String,
    token_ttl_seconds: i64,
    code_ttl_minutes: i64,
    environment: String,
    error_details: bool,
    rate_limit_allowlist: Vec<String>,
}

impl AuthConfig {
    #[must_use]
    pub fn new(jwt_secret: SecretString, frontend_origin: String) -> Self {
        Self {
            jwt_secret,
            frontend_origin,
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            code_ttl_minutes: DEFAULT_CODE_TTL_MINUTES,
            environment: "development".to_string(),
            error_details: false,
            rate_limit_allowlist: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_code_ttl_minutes(mut self, minutes: i64) -> Self {
        self.code_ttl_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_environment(mut self, environment: String) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub fn with_error_details(mut self, enabled: bool) -> Self {
        self.error_details = enabled;
        self
    }

    #[must_use]
    pub fn with_rate_limit_allowlist(mut self, allowlist: Vec<String>) -> Self {
        self.rate_limit_allowlist = allowlist;
        self
    }

    /// Clamp nonsensical values instead of failing startup.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        if self.token_ttl_seconds < 60 {
            self.token_ttl_seconds = 60;
        }
        if self.code_ttl_minutes < 1 {
            self.code_ttl_minutes = 1;
        }
        self
    }

    pub(crate) fn jwt_secret(&self) -> &SecretString {
        &self.jwt_secret
    }

    #[must_use]
    pub fn frontend_origin(&self) -> &str {
        &self.frontend_origin
    }

    #[must_use]
    pub fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }

    pub(super) fn code_ttl_minutes(&self) -> i64 {
        self.code_ttl_minutes
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    #[must_use]
    pub fn error_details(&self) -> bool {
        self.error_details
    }

    #[must_use]
    pub fn rate_limit_allowlist(&self) -> &[String] {
        &self.rate_limit_allowlist
    }
}

pub struct AuthState {
    config: AuthConfig,
    rate_limiter: Arc<dyn RateLimiter>,
    mailer: Arc<dyn EmailSender>,
}

impl AuthState {
    /// Production wiring: an in-memory limiter that skips private-range
    /// clients outside production.
    #[must_use]
    pub fn new(config: AuthConfig, mailer: Arc<dyn EmailSender>) -> Self {
        let limiter = MemoryRateLimiter::new(
            config.rate_limit_allowlist().to_vec(),
            !config.is_production(),
        );
        Self {
            config,
            rate_limiter: Arc::new(limiter),
            mailer,
        }
    }

    #[must_use]
    pub fn with_rate_limiter(
        config: AuthConfig,
        mailer: Arc<dyn EmailSender>,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            config,
            rate_limiter,
            mailer,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    pub(super) fn mailer(&self) -> &dyn EmailSender {
        self.mailer.as_ref()
    }
}
