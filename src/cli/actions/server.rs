use crate::api::{
    self,
    email::{EmailSender, LogEmailSender, SmtpConfig, SmtpEmailSender},
    handlers::auth::{AuthConfig, AuthState},
};
use crate::cli::{actions::Action, globals::GlobalArgs};
use anyhow::Result;
use std::sync::Arc;
use tracing::warn;

/// Handle the server action
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    match action {
        Action::Server { port, dsn } => {
            let mailer: Arc<dyn EmailSender> = match &globals.smtp.host {
                Some(host) => Arc::new(SmtpEmailSender::new(SmtpConfig {
                    host: host.clone(),
                    port: globals.smtp.port,
                    username: globals.smtp.username.clone(),
                    password: globals.smtp.password.clone(),
                    from: globals.smtp.from.clone(),
                })?),
                None if globals.environment == "production" => {
                    return Err(anyhow::anyhow!("SMTP host is required in production"));
                }
                None => {
                    warn!("SMTP host not configured, verification codes will be logged");
                    Arc::new(LogEmailSender)
                }
            };

            let config = AuthConfig::new(
                globals.jwt_secret.clone(),
                globals.frontend_origin.clone(),
            )
            .with_token_ttl_seconds(globals.token_ttl_seconds)
            .with_environment(globals.environment.clone())
            .with_error_details(globals.include_error_details())
            .with_rate_limit_allowlist(globals.rate_limit_allowlist.clone())
            .normalize();

            api::new(port, dsn, Arc::new(AuthState::new(config, mailer))).await?;
        }
    }

    Ok(())
}
