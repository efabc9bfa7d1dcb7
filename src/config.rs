//! Application configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::channels::{MessagingConfig, SmtpConfig};
use crate::dispatch;
use crate::error::ConfigError;

/// Top-level configuration, built from environment variables.
///
/// Channels are optional: a missing SMTP or messaging configuration leaves
/// that channel disabled, which surfaces as failed sends feeding the
/// pipeline's drop policy rather than a startup failure.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listen port.
    pub http_port: u16,
    /// Path of the local database file.
    pub db_path: PathBuf,
    /// SMTP channel, `None` when unconfigured.
    pub smtp: Option<SmtpConfig>,
    /// Messaging channel, `None` when unconfigured.
    pub messaging: Option<MessagingConfig>,
    /// Dispatcher retry ceiling.
    pub dispatch_max_retries: u32,
    /// Dispatcher pacing delay between sends.
    pub dispatch_pacing: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_port: u16 = parse_or("REMEDIA_PORT", 8080)?;

        let db_path = std::env::var("REMEDIA_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/remedia.db"));

        let dispatch_max_retries = parse_or(
            "REMEDIA_DISPATCH_MAX_RETRIES",
            dispatch::MAX_RETRIES,
        )?;
        let dispatch_pacing = parse_or(
            "REMEDIA_DISPATCH_PACING_MS",
            dispatch::CALL_DELAY.as_millis() as u64,
        )
        .map(Duration::from_millis)?;

        Ok(Self {
            http_port,
            db_path,
            smtp: SmtpConfig::from_env(),
            messaging: MessagingConfig::from_env(),
            dispatch_max_retries,
            dispatch_pacing,
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("could not parse: {raw}"),
        }),
        Err(_) => Ok(default),
    }
}
