//! Candidate discovery: walks a message's MIME tree for invoice documents.
//!
//! Two delivery patterns are recognized:
//! 1. `application/pdf` parts with a non-empty payload (attachments)
//! 2. PDF URLs inside `text/html` bodies, downloaded on demand (links)
//!
//! Link detection is a permissive regex over the decoded HTML, not an HTML
//! parser. A false positive costs one download and an empty extraction; a
//! missed link loses an invoice.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::sync::LazyLock;

use mail_parser::{MessagePart, MimeHeaders, PartType};
use regex::Regex;
use tracing::{debug, warn};

use crate::pipeline::fetch::DocumentFetcher;
use crate::pipeline::types::{Candidate, Provenance};

/// `http(s)://…something.pdf` with an optional `?query`, stopping at
/// whitespace and quotes.
static PDF_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s'"]+\.pdf(?:\?[^\s'"]*)?"#).expect("PDF link pattern compiles")
});

/// Every PDF link in `html`, in document order. Repeated links are kept.
pub fn find_pdf_links(html: &str) -> Vec<String> {
    PDF_LINK
        .find_iter(html)
        .map(|m| m.as_str().to_string())
        .collect()
}

// ── MIME walk ───────────────────────────────────────────────────────

/// Depth-first walk over every part of a message, including the parts of
/// embedded `message/rfc822` messages.
pub struct MimeWalk<'m> {
    stack: Vec<(&'m mail_parser::Message<'m>, usize)>,
}

impl<'m> MimeWalk<'m> {
    pub fn new(message: &'m mail_parser::Message<'m>) -> Self {
        Self {
            stack: vec![(message, 0)],
        }
    }
}

impl<'m> Iterator for MimeWalk<'m> {
    type Item = &'m MessagePart<'m>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (message, index) = self.stack.last_mut()?;
            let message: &'m mail_parser::Message<'m> = *message;
            let position = *index;
            *index += 1;

            let Some(part) = message.parts.get(position) else {
                self.stack.pop();
                continue;
            };
            if let PartType::Message(inner) = &part.body {
                self.stack.push((inner, 0));
            }
            return Some(part);
        }
    }
}

/// What a single part contributes.
enum PartKind<'m> {
    Pdf {
        bytes: &'m [u8],
        filename: Option<&'m str>,
    },
    Html(Cow<'m, str>),
    Other,
}

fn classify<'m>(part: &'m MessagePart<'m>) -> PartKind<'m> {
    let Some(ct) = part.content_type() else {
        return PartKind::Other;
    };
    let ctype = ct.ctype();
    let subtype = ct.subtype().unwrap_or_default();

    if ctype.eq_ignore_ascii_case("application") && subtype.eq_ignore_ascii_case("pdf") {
        return PartKind::Pdf {
            bytes: part.contents(),
            filename: part.attachment_name(),
        };
    }

    if ctype.eq_ignore_ascii_case("text") && subtype.eq_ignore_ascii_case("html") {
        // Text bodies are already charset-decoded by the parser (UTF-8 when
        // no charset is declared).
        return match &part.body {
            PartType::Html(text) | PartType::Text(text) => {
                PartKind::Html(Cow::Borrowed(text.as_ref()))
            }
            PartType::Binary(bytes) | PartType::InlineBinary(bytes) => {
                PartKind::Html(String::from_utf8_lossy(bytes))
            }
            _ => PartKind::Other,
        };
    }

    PartKind::Other
}

// ── Locator ─────────────────────────────────────────────────────────

/// Pull-based cursor producing a message's candidates one at a time.
///
/// Links are only downloaded when the caller asks for the next candidate.
/// The sequence is finite and cannot be restarted; build a new locator to
/// walk the message again.
pub struct CandidateLocator<'m, 'f> {
    parts: MimeWalk<'m>,
    pending_links: VecDeque<String>,
    fetcher: &'f dyn DocumentFetcher,
}

impl<'m, 'f> CandidateLocator<'m, 'f> {
    pub fn new(message: &'m mail_parser::Message<'m>, fetcher: &'f dyn DocumentFetcher) -> Self {
        Self {
            parts: MimeWalk::new(message),
            pending_links: VecDeque::new(),
            fetcher,
        }
    }

    /// The next candidate, or `None` once the message is exhausted.
    ///
    /// A failed download is logged and skipped.
    pub async fn next_candidate(&mut self) -> Option<Candidate> {
        loop {
            if let Some(url) = self.pending_links.pop_front() {
                match self.fetcher.fetch(&url).await {
                    Ok(bytes) => {
                        debug!(url = %url, size = bytes.len(), "Downloaded linked document");
                        return Some(Candidate {
                            bytes,
                            provenance: Provenance::Link { url },
                        });
                    }
                    Err(e) => {
                        warn!(url = %url, error = %e, "Failed to download linked document");
                        continue;
                    }
                }
            }

            let part = self.parts.next()?;
            match classify(part) {
                PartKind::Pdf { bytes, filename } if !bytes.is_empty() => {
                    debug!(filename = ?filename, size = bytes.len(), "Found PDF attachment");
                    return Some(Candidate {
                        bytes: bytes.to_vec(),
                        provenance: Provenance::Attachment {
                            filename: filename.map(str::to_string),
                        },
                    });
                }
                PartKind::Html(html) => {
                    let links = find_pdf_links(&html);
                    if !links.is_empty() {
                        debug!(count = links.len(), "Found PDF links in HTML body");
                    }
                    self.pending_links.extend(links);
                }
                PartKind::Pdf { .. } | PartKind::Other => {}
            }
        }
    }

    /// Drain the remaining candidates.
    pub async fn collect_all(mut self) -> Vec<Candidate> {
        let mut out = Vec::new();
        while let Some(candidate) = self.next_candidate().await {
            out.push(candidate);
        }
        out
    }
}
