//! Fetched message bytes and subject decoding.

use mail_parser::{HeaderName, MessageParser};

use super::MessageId;

/// Placeholder used when a message carries no subject at all.
pub const NO_SUBJECT: &str = "(no subject)";

/// One message as returned by a single fetch.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub id: MessageId,
    pub raw: Vec<u8>,
}

impl FetchedMessage {
    pub fn new(id: MessageId, raw: Vec<u8>) -> Self {
        Self { id, raw }
    }

    /// Parse the raw RFC 5322 bytes into a MIME tree borrowing from `self`.
    pub fn parse(&self) -> Option<mail_parser::Message<'_>> {
        MessageParser::default().parse(self.raw.as_slice())
    }
}

/// Decode the subject's MIME encoded words.
///
/// Falls back to the raw header text when decoding yields nothing, and to
/// [`NO_SUBJECT`] when the header is absent. Never fails.
pub fn decode_subject(parsed: &mail_parser::Message<'_>) -> String {
    if let Some(subject) = parsed.subject() {
        let subject = subject.trim();
        if !subject.is_empty() {
            return subject.to_string();
        }
    }
    match parsed.header_raw(HeaderName::Subject) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().to_string(),
        _ => NO_SUBJECT.to_string(),
    }
}
