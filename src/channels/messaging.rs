//! Messaging collaborator — HTTP provider client plus webhook parsing.
//!
//! Outbound sends go through the `MessagingSender` trait so the dispatcher
//! can be tested with a mock. Inbound traffic arrives as provider webhook
//! payloads; `parse_incoming` extracts the sender and text.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::error::ChannelError;

/// Outbound messaging capability: `send(to, body) -> delivered`.
#[async_trait]
pub trait MessagingSender: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<bool, ChannelError>;
}

// ── Configuration ───────────────────────────────────────────────────

/// Messaging provider configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct MessagingConfig {
    pub base_url: String,
    pub api_key: SecretString,
}

impl MessagingConfig {
    /// Build config from environment variables.
    /// Returns `None` if `MESSAGING_API_KEY` is not set (channel disabled).
    pub fn from_env() -> Option<Self> {
        let api_key = SecretString::from(std::env::var("MESSAGING_API_KEY").ok()?);
        let base_url = std::env::var("MESSAGING_BASE_URL")
            .unwrap_or_else(|_| "https://www.wasenderapi.com/api".to_string());
        Some(Self { base_url, api_key })
    }
}

// ── HTTP sender ─────────────────────────────────────────────────────

/// HTTP implementation of `MessagingSender`.
pub struct HttpMessagingSender {
    client: reqwest::Client,
    config: MessagingConfig,
}

impl HttpMessagingSender {
    pub fn new(config: MessagingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl MessagingSender for HttpMessagingSender {
    async fn send(&self, to: &str, body: &str) -> Result<bool, ChannelError> {
        let url = format!("{}/send-message", self.config.base_url);
        let payload = serde_json::json!({
            "to": to,
            "text": body,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        if response.status().is_success() {
            Ok(true)
        } else {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            Err(ChannelError::SendFailed {
                name: "messaging".into(),
                reason: format!("provider returned {status}: {detail}"),
            })
        }
    }
}

/// Placeholder sender used when the provider is not configured.
pub struct DisabledMessagingSender;

#[async_trait]
impl MessagingSender for DisabledMessagingSender {
    async fn send(&self, _to: &str, _body: &str) -> Result<bool, ChannelError> {
        Err(ChannelError::NotConfigured {
            name: "messaging".into(),
        })
    }
}

// ── Inbound webhook parsing ─────────────────────────────────────────

/// Extract `(sender_jid, text)` from a provider webhook payload.
///
/// Only `chats.update` events carry counterparty messages; messages flagged
/// `fromMe` are our own outbound echoes and are ignored.
pub fn parse_incoming(data: &Value) -> Option<(String, String)> {
    if data.get("event")?.as_str()? != "chats.update" {
        return None;
    }
    let entry = data
        .get("data")?
        .get("chats")?
        .get("messages")?
        .as_array()?
        .first()?
        .get("message")?;

    let from_me = entry
        .get("key")
        .and_then(|k| k.get("fromMe"))
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let sender = entry.get("key")?.get("remoteJid")?.as_str()?.to_string();
    let text = entry
        .get("message")?
        .get("conversation")?
        .as_str()?
        .to_string();

    if from_me || sender.is_empty() || text.is_empty() {
        return None;
    }
    Some((sender, text))
}

/// Convert a provider JID (`573178965432@s.whatsapp.net`) to an E.164 phone.
pub fn jid_to_phone(jid: &str) -> String {
    let number = jid.split('@').next().unwrap_or(jid);
    format!("+{number}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webhook(from_me: bool, jid: &str, text: &str) -> Value {
        serde_json::json!({
            "event": "chats.update",
            "data": {
                "chats": {
                    "messages": [{
                        "message": {
                            "key": { "fromMe": from_me, "remoteJid": jid },
                            "message": { "conversation": text }
                        }
                    }]
                }
            }
        })
    }

    #[test]
    fn parses_counterparty_message() {
        let payload = webhook(false, "573178965432@s.whatsapp.net", "listo, ya revise");
        let (sender, text) = parse_incoming(&payload).unwrap();
        assert_eq!(sender, "573178965432@s.whatsapp.net");
        assert_eq!(text, "listo, ya revise");
    }

    #[test]
    fn ignores_own_messages() {
        let payload = webhook(true, "573178965432@s.whatsapp.net", "eco");
        assert!(parse_incoming(&payload).is_none());
    }

    #[test]
    fn ignores_other_events() {
        let payload = serde_json::json!({ "event": "presence.update" });
        assert!(parse_incoming(&payload).is_none());
    }

    #[test]
    fn jid_converts_to_phone() {
        assert_eq!(jid_to_phone("573178965432@s.whatsapp.net"), "+573178965432");
    }
}
