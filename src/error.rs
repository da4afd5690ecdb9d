//! Error types for invoice intake.

/// Top-level error type for a run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox session errors.
///
/// `Connect` and `Login` are fatal to a run. `Fetch` is scoped to one message
/// and never aborts the rest of the backlog.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Failed to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("IMAP login failed for {user}: {reason}")]
    Login { user: String, reason: String },

    #[error("Failed to select folder {folder}: {reason}")]
    Select { folder: String, reason: String },

    #[error("IMAP command {command} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("Failed to fetch message {id}: {reason}")]
    Fetch { id: String, reason: String },

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("IMAP connection closed by server")]
    Closed,

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mailbox task failed: {0}")]
    Task(String),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Raised when a document could not be run through the extraction engine.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Extractor failed on {source_label}: {reason}")]
    Failed {
        source_label: String,
        reason: String,
    },

    #[error("Extractor panicked on {source_label}")]
    Panicked { source_label: String },
}

/// Linked-document download errors. Always recovered per URL.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Summary notification errors. Logged, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Webhook request failed: {0}")]
    Request(String),

    #[error("Webhook returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Webhook rejected message (errcode {errcode}): {errmsg}")]
    Rejected { errcode: i64, errmsg: String },
}
