use secrecy::SecretString;

/// Mail transport settings. `host` unset means codes are logged, not sent.
#[derive(Clone, Default)]
pub struct SmtpArgs {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub from: String,
}

#[derive(Clone)]
pub struct GlobalArgs {
    pub jwt_secret: SecretString,
    pub token_ttl_seconds: i64,
    pub frontend_origin: String,
    pub environment: String,
    pub error_details: bool,
    pub rate_limit_allowlist: Vec<String>,
    pub smtp: SmtpArgs,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(jwt_secret: SecretString) -> Self {
        Self {
            jwt_secret,
            token_ttl_seconds: 604_800,
            frontend_origin: "http://localhost:3000".to_string(),
            environment: "development".to_string(),
            error_details: false,
            rate_limit_allowlist: Vec::new(),
            smtp: SmtpArgs {
                port: 587,
                from: "noreply@localhost".to_string(),
                ..SmtpArgs::default()
            },
        }
    }

    /// Error responses carry internals everywhere except production, unless
    /// the operator opted in explicitly.
    #[must_use]
    pub fn include_error_details(&self) -> bool {
        self.error_details || self.environment != "production"
    }
}

impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalArgs")
            .field("jwt_secret", &"***")
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .field("frontend_origin", &self.frontend_origin)
            .field("environment", &self.environment)
            .field("error_details", &self.error_details)
            .field("rate_limit_allowlist", &self.rate_limit_allowlist)
            .field("smtp_host", &self.smtp.host)
            .field("smtp_port", &self.smtp.port)
            .field("smtp_username", &self.smtp.username)
            .field("smtp_password", &"***")
            .field("smtp_from", &self.smtp.from)
            .finish()
    }
}
