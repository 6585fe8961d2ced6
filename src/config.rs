//! Configuration module for the mailbox service.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::{MailboxError, Result};

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origins. Empty means any origin without credentials.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Rate limit for the login endpoint (requests per minute per IP).
    #[serde(default = "default_login_rate_limit")]
    pub login_rate_limit: u32,
    /// Rate limit for other API endpoints (requests per minute per IP).
    #[serde(default = "default_api_rate_limit")]
    pub api_rate_limit: u32,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_login_rate_limit() -> u32 {
    5
}

fn default_api_rate_limit() -> u32 {
    120
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
            login_rate_limit: default_login_rate_limit(),
            api_rate_limit: default_api_rate_limit(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Maximum pooled connections.
    #[serde(default = "default_db_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/mailbox.db".to_string()
}

fn default_db_max_connections() -> u32 {
    8
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_db_max_connections(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file. Console only when unset.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Token signing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for signing tokens. Required.
    #[serde(default)]
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    #[serde(default = "default_token_expiry")]
    pub token_expiry_secs: u64,
}

fn default_token_expiry() -> u64 {
    86_400 // 24 hours
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_expiry_secs: default_token_expiry(),
        }
    }
}

/// Message lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesConfig {
    /// Lifetime of a message with a read limit, in hours.
    #[serde(default = "default_message_ttl")]
    pub ttl_hours: u64,
    /// How often the expiry sweep runs, in seconds. 0 disables it.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_message_ttl() -> u64 {
    24
}

fn default_sweep_interval() -> u64 {
    300
}

impl MessagesConfig {
    /// Message time-to-live as a chrono duration.
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.ttl_hours as i64)
    }
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_message_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Notification outbox configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    /// Webhook receiving new-message events. In-process bus only when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Per-publish timeout in seconds.
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_secs: u64,
    /// How often the dispatcher drains the outbox, in seconds.
    #[serde(default = "default_dispatch_interval")]
    pub dispatch_interval_secs: u64,
    /// Attempts before an entry is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Maximum entries handled per dispatch pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Capacity of the in-process broadcast channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_publish_timeout() -> u64 {
    5
}

fn default_dispatch_interval() -> u64 {
    2
}

fn default_max_attempts() -> u32 {
    5
}

fn default_batch_size() -> u32 {
    100
}

fn default_channel_capacity() -> usize {
    1024
}

impl NotificationsConfig {
    /// Publish timeout as a std duration.
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            publish_timeout_secs: default_publish_timeout(),
            dispatch_interval_secs: default_dispatch_interval(),
            max_attempts: default_max_attempts(),
            batch_size: default_batch_size(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Token configuration.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Message lifecycle configuration.
    #[serde(default)]
    pub messages: MessagesConfig,
    /// Notification configuration.
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(MailboxError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| MailboxError::Config(format!("parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `MAILBOX_JWT_SECRET`: token signing secret
    /// - `MAILBOX_DATABASE_PATH`: SQLite file path
    /// - `MAILBOX_WEBHOOK_URL`: notification webhook
    pub fn apply_env_overrides(&mut self) {
        if let Some(secret) = non_empty_env("MAILBOX_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(path) = non_empty_env("MAILBOX_DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(url) = non_empty_env("MAILBOX_WEBHOOK_URL") {
            self.notifications.webhook_url = Some(url);
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            return Err(MailboxError::Config(
                "jwt_secret is not set. \
                 Set it in config.toml or via the MAILBOX_JWT_SECRET environment variable."
                    .to_string(),
            ));
        }
        if self.auth.token_expiry_secs == 0 {
            return Err(MailboxError::Config(
                "token_expiry_secs must be positive".to_string(),
            ));
        }
        if self.messages.ttl_hours == 0 {
            return Err(MailboxError::Config("ttl_hours must be positive".to_string()));
        }
        if self.notifications.publish_timeout_secs == 0 {
            return Err(MailboxError::Config(
                "publish_timeout_secs must be positive".to_string(),
            ));
        }
        if self.notifications.max_attempts == 0 {
            return Err(MailboxError::Config(
                "max_attempts must be positive".to_string(),
            ));
        }
        if let Some(ref webhook) = self.notifications.webhook_url {
            let parsed = url::Url::parse(webhook)
                .map_err(|e| MailboxError::Config(format!("invalid webhook_url: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(MailboxError::Config(format!(
                    "webhook_url must be http(s), got {}",
                    parsed.scheme()
                )));
            }
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
