//! Mailbox session abstraction.
//!
//! A session is opened once per run, enumerates unseen messages as a
//! snapshot, fetches them one at a time, flags them `\Seen` and logs out.

pub mod imap;
pub mod message;

use std::fmt;

use async_trait::async_trait;

use crate::error::MailboxError;

pub use imap::{ImapConnector, ImapMailbox};
pub use message::{FetchedMessage, decode_subject};

/// Protocol-assigned message identifier.
///
/// Opaque and only meaningful inside the session that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An authenticated session bound to one selected folder.
#[async_trait]
pub trait Mailbox: Send {
    /// Ids of messages currently lacking the `\Seen` flag, in server order.
    async fn list_unseen(&mut self) -> Result<Vec<MessageId>, MailboxError>;

    /// Fetch the full raw message without implicitly setting `\Seen`.
    async fn fetch(&mut self, id: &MessageId) -> Result<FetchedMessage, MailboxError>;

    /// Add the `\Seen` flag.
    async fn mark_seen(&mut self, id: &MessageId) -> Result<(), MailboxError>;

    /// Log out and release the connection.
    async fn close(&mut self) -> Result<(), MailboxError>;
}

/// Opens mailbox sessions.
#[async_trait]
pub trait MailboxConnector: Send + Sync {
    /// Connect, authenticate and select the configured folder.
    async fn open(&self) -> Result<Box<dyn Mailbox>, MailboxError>;
}
