//! Configuration types, built once from environment variables at startup.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default implicit-TLS IMAP port.
pub const DEFAULT_IMAP_PORT: u16 = 993;

/// Default folder selected after login.
pub const DEFAULT_FOLDER: &str = "INBOX";

/// Default database location.
pub const DEFAULT_DB_PATH: &str = "invoices.db";

/// Mailbox credentials and target folder.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    pub folder: String,
}

/// Summary webhook settings.
#[derive(Debug, Clone, Default)]
pub struct NotifierConfig {
    /// Webhook endpoint. `None` turns the notification step into a logged no-op.
    pub webhook_url: Option<String>,
}

/// Everything a run needs, resolved once and passed by reference.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mailbox: MailboxConfig,
    pub db_path: PathBuf,
    pub notifier: NotifierConfig,
}

impl AppConfig {
    /// Build config from process environment variables.
    ///
    /// `EMAIL_HOST`, `EMAIL_USER` and `EMAIL_PASS` are required.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require =
            |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

        let host = require("EMAIL_HOST")?;
        let user = require("EMAIL_USER")?;
        let password = SecretString::from(require("EMAIL_PASS")?);

        let port = match get("EMAIL_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidValue {
                    key: "EMAIL_PORT".into(),
                    message: format!("{raw:?}: {e}"),
                })?,
            None => DEFAULT_IMAP_PORT,
        };

        let folder = get("EMAIL_FOLDER").unwrap_or_else(|| DEFAULT_FOLDER.to_string());
        let db_path = get("DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
        let webhook_url = get("WECHAT_WEBHOOK_URL");

        Ok(Self {
            mailbox: MailboxConfig {
                host,
                port,
                user,
                password,
                folder,
            },
            db_path,
            notifier: NotifierConfig { webhook_url },
        })
    }
}
