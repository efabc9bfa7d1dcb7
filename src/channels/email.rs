//! Email collaborator — SMTP via lettre.
//!
//! The pipeline only depends on the `EmailSender` trait; the SMTP transport
//! is one implementation of it. Sends are blocking in lettre, so they run
//! on the blocking pool.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::error::ChannelError;

/// Outbound email capability: `send(to, subject, body) -> message_id`.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<String, ChannelError>;
}

// ── Configuration ───────────────────────────────────────────────────

/// SMTP configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl SmtpConfig {
    /// Build config from environment variables.
    /// Returns `None` if `SMTP_HOST` is not set (channel disabled).
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SMTP_HOST").ok()?;

        let port: u16 = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
        let password =
            SecretString::from(std::env::var("SMTP_PASSWORD").unwrap_or_default());
        let from_address = std::env::var("SMTP_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        Some(Self {
            host,
            port,
            username,
            password,
            from_address,
        })
    }
}

// ── SMTP sender ─────────────────────────────────────────────────────

/// SMTP implementation of `EmailSender`.
pub struct SmtpEmailSender {
    config: SmtpConfig,
}

impl SmtpEmailSender {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn send_blocking(config: &SmtpConfig, to: &str, subject: &str, body: &str) -> Result<(), ChannelError> {
        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::relay(&config.host)
            .map_err(|e| ChannelError::SendFailed {
                name: "email".into(),
                reason: format!("SMTP relay error: {e}"),
            })?
            .port(config.port)
            .credentials(creds)
            .build();

        let email = Message::builder()
            .from(config.from_address.parse().map_err(|e| {
                ChannelError::InvalidRecipient {
                    name: "email".into(),
                    reason: format!("Invalid from address: {e}"),
                }
            })?)
            .to(to.parse().map_err(|e| ChannelError::InvalidRecipient {
                name: "email".into(),
                reason: format!("Invalid to address: {e}"),
            })?)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| ChannelError::SendFailed {
                name: "email".into(),
                reason: format!("Failed to build email: {e}"),
            })?;

        transport.send(&email).map_err(|e| ChannelError::SendFailed {
            name: "email".into(),
            reason: format!("SMTP send failed: {e}"),
        })?;

        Ok(())
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<String, ChannelError> {
        let config = self.config.clone();
        let to = to.to_string();
        let subject = subject.to_string();
        let body = body.to_string();

        tokio::task::spawn_blocking(move || {
            Self::send_blocking(&config, &to, &subject, &body)
        })
        .await
        .map_err(|e| ChannelError::SendFailed {
            name: "email".into(),
            reason: format!("send task panicked: {e}"),
        })??;

        // SMTP carries no provider message id; hand back a transport id so
        // callers can log the send. Correlation ids are a separate concern.
        let message_id = Uuid::new_v4().to_string();
        tracing::info!(message_id = %message_id, "Email sent");
        Ok(message_id)
    }
}

/// Placeholder sender used when SMTP is not configured. Every send fails,
/// which feeds the pipeline's skip-don't-poison drop policy.
pub struct DisabledEmailSender;

#[async_trait]
impl EmailSender for DisabledEmailSender {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<String, ChannelError> {
        Err(ChannelError::NotConfigured {
            name: "email".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_sender_always_fails() {
        let sender = DisabledEmailSender;
        let err = sender.send("a@b.com", "s", "b").await.unwrap_err();
        assert!(matches!(err, ChannelError::NotConfigured { .. }));
    }
}
