//! Email delivery abstraction and SMTP transport.
//!
//! The send-code flow is send-then-store: the handler delivers the message
//! first and only persists the verification code once the transport reports
//! success, so a failed send never leaves a code the client can't receive.
//!
//! `SmtpEmailSender` builds its pooled lettre transport lazily on first use
//! and caches a successful `test_connection` for a short period to avoid a
//! full handshake per send. `LogEmailSender` is the local dev fallback when
//! no SMTP host is configured.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::{ExposeSecret, SecretString};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

const CONNECTION_CHECK_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("email transport not configured: {0}")]
    Configuration(String),
    #[error("email transport unavailable: {0}")]
    Transport(String),
    #[error("email delivery failed: {0}")]
    Delivery(String),
}

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    /// Render the verification-code email for a given flow.
    #[must_use]
    pub fn verification_code(to_email: &str, code: &str, kind: &str, ttl_minutes: i64) -> Self {
        let subject = match kind {
            "register" => "Your registration code".to_string(),
            _ => "Your login code".to_string(),
        };
        let body = format!(
            "Your verification code is: {code}\n\n\
             This code expires in {ttl_minutes} minutes. \
             If you did not request it, you can ignore this email."
        );
        Self {
            to_email: to_email.to_string(),
            subject,
            body,
        }
    }
}

/// Email delivery abstraction used by the auth handlers.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error so the caller can refuse to
    /// persist state that depends on the delivery.
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        info!(
            to_email = %message.to_email,
            subject = %message.subject,
            body = %message.body,
            "email send stub"
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub from: String,
}

pub struct SmtpEmailSender {
    config: SmtpConfig,
    from: Mailbox,
    transport: OnceCell<AsyncSmtpTransport<Tokio1Executor>>,
    verified_at: Mutex<Option<Instant>>,
}

impl SmtpEmailSender {
    /// # Errors
    /// Returns an error if the from address is not a valid mailbox.
    pub fn new(config: SmtpConfig) -> Result<Self, EmailError> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|err| EmailError::Configuration(format!("invalid from address: {err}")))?;
        Ok(Self {
            config,
            from,
            transport: OnceCell::new(),
            verified_at: Mutex::new(None),
        })
    }

    fn build_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, EmailError> {
        // Port 465 is implicit TLS, anything else negotiates STARTTLS.
        let builder = if self.config.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
        }
        .map_err(|err| EmailError::Transport(format!("failed to build SMTP relay: {err}")))?;

        let mut builder = builder
            .port(self.config.port)
            .pool_config(PoolConfig::new());

        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                password.expose_secret().to_string(),
            ));
        }

        Ok(builder.build())
    }

    async fn transport(&self) -> Result<&AsyncSmtpTransport<Tokio1Executor>, EmailError> {
        self.transport
            .get_or_try_init(|| async { self.build_transport() })
            .await
    }

    /// Probe the relay, reusing a recent successful probe.
    async fn ensure_connected(
        &self,
        transport: &AsyncSmtpTransport<Tokio1Executor>,
    ) -> Result<(), EmailError> {
        let mut verified_at = self.verified_at.lock().await;
        if let Some(at) = *verified_at {
            if at.elapsed() < CONNECTION_CHECK_TTL {
                return Ok(());
            }
        }

        let ok = transport
            .test_connection()
            .await
            .map_err(|err| EmailError::Transport(format!("SMTP connection failed: {err}")))?;
        if !ok {
            return Err(EmailError::Transport(
                "SMTP connection test failed".to_string(),
            ));
        }

        debug!(host = %self.config.host, "SMTP connection verified");
        *verified_at = Some(Instant::now());
        Ok(())
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let to = message
            .to_email
            .parse::<Mailbox>()
            .map_err(|err| EmailError::Delivery(format!("invalid recipient address: {err}")))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&message.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|err| EmailError::Delivery(format!("failed to build message: {err}")))?;

        let transport = self.transport().await?;
        self.ensure_connected(transport).await?;

        transport
            .send(email)
            .await
            .map_err(|err| EmailError::Delivery(err.to_string()))?;

        debug!(to_email = %message.to_email, "email delivered");
        Ok(())
    }
}
