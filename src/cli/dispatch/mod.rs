//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to an action plus the global configuration the
//! server needs, keeping secrets wrapped from the moment they leave clap.

use crate::cli::globals::{GlobalArgs, SmtpArgs};
use crate::cli::actions::Action;
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<(Action, GlobalArgs)> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let jwt_secret = matches
        .get_one::<String>("jwt-secret")
        .cloned()
        .context("missing required argument: --jwt-secret")?;

    let mut globals = GlobalArgs::new(SecretString::from(jwt_secret));

    if let Some(ttl) = matches.get_one::<i64>("token-ttl").copied() {
        globals.token_ttl_seconds = ttl;
    }

    if let Some(origin) = matches.get_one::<String>("frontend-origin") {
        globals.frontend_origin.clone_from(origin);
    }

    if let Some(environment) = matches.get_one::<String>("environment") {
        globals.environment.clone_from(environment);
    }

    globals.error_details = matches.get_flag("error-details");

    if let Some(allowlist) = matches.get_many::<String>("rate-limit-allowlist") {
        globals.rate_limit_allowlist = allowlist.cloned().collect();
    }

    globals.smtp = SmtpArgs {
        host: matches.get_one::<String>("smtp-host").cloned(),
        port: matches.get_one::<u16>("smtp-port").copied().unwrap_or(587),
        username: matches.get_one::<String>("smtp-username").cloned(),
        password: matches
            .get_one::<String>("smtp-password")
            .cloned()
            .map(SecretString::from),
        from: matches
            .get_one::<String>("smtp-from")
            .cloned()
            .unwrap_or_else(|| "noreply@localhost".to_string()),
    };

    Ok((Action::Server { port, dsn }, globals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    #[test]
    fn test_handler_defaults() {
        temp_env::with_vars(
            [
                ("SESAME_SMTP_HOST", None::<&str>),
                ("SESAME_ERROR_DETAILS", None::<&str>),
                ("SESAME_RATE_LIMIT_ALLOWLIST", None::<&str>),
            ],
            || {
                let matches = commands::new().get_matches_from(vec![
                    "sesame",
                    "--dsn",
                    "postgres://user@localhost:5432/sesame",
                    "--jwt-secret",
                    "super-secret",
                ]);

                let (action, globals) = handler(&matches).unwrap();

                let Action::Server { port, dsn } = action;
                assert_eq!(port, 8080);
                assert_eq!(dsn, "postgres://user@localhost:5432/sesame");
                assert_eq!(globals.jwt_secret.expose_secret(), "super-secret");
                assert_eq!(globals.token_ttl_seconds, 604_800);
                assert_eq!(globals.frontend_origin, "http://localhost:3000");
                assert_eq!(globals.environment, "development");
                assert!(!globals.error_details);
                assert!(globals.rate_limit_allowlist.is_empty());
                assert!(globals.smtp.host.is_none());
                assert_eq!(globals.smtp.from, "noreply@localhost");
            },
        );
    }

    #[test]
    fn test_handler_full_env() {
        temp_env::with_vars(
            [
                ("SESAME_PORT", Some("9000")),
                ("SESAME_DSN", Some("postgres://user@db:5432/sesame")),
                ("SESAME_JWT_SECRET", Some("super-secret")),
                ("SESAME_TOKEN_TTL", Some("3600")),
                ("SESAME_FRONTEND_ORIGIN", Some("https://www.example.com")),
                ("SESAME_SMTP_HOST", Some("smtp.example.com")),
                ("SESAME_SMTP_PORT", Some("465")),
                ("SESAME_SMTP_USERNAME", Some("mailer")),
                ("SESAME_SMTP_PASSWORD", Some("smtp-secret")),
                ("SESAME_SMTP_FROM", Some("codes@example.com")),
                ("SESAME_RATE_LIMIT_ALLOWLIST", Some("10.1.1.1,10.1.1.2")),
                ("SESAME_ERROR_DETAILS", Some("true")),
                ("SESAME_ENV", Some("production")),
            ],
            || {
                let matches = commands::new().get_matches_from(vec!["sesame"]);

                let (action, globals) = handler(&matches).unwrap();

                let Action::Server { port, dsn } = action;
                assert_eq!(port, 9000);
                assert_eq!(dsn, "postgres://user@db:5432/sesame");
                assert_eq!(globals.token_ttl_seconds, 3600);
                assert_eq!(globals.frontend_origin, "https://www.example.com");
                assert_eq!(globals.environment, "production");
                assert!(globals.error_details);
                assert_eq!(
                    globals.rate_limit_allowlist,
                    vec!["10.1.1.1".to_string(), "10.1.1.2".to_string()]
                );
                assert_eq!(globals.smtp.host.as_deref(), Some("smtp.example.com"));
                assert_eq!(globals.smtp.port, 465);
                assert_eq!(globals.smtp.username.as_deref(), Some("mailer"));
                assert_eq!(
                    globals
                        .smtp
                        .password
                        .as_ref()
                        .map(|p| p.expose_secret().to_string()),
                    Some("smtp-secret".to_string())
                );
                assert_eq!(globals.smtp.from, "codes@example.com");
            },
        );
    }
}
