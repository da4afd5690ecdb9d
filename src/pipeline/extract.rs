//! Extraction engine contract.
//!
//! An engine turns document bytes into [`InvoiceFields`]. Unrecognized or
//! malformed documents yield empty fields rather than errors, but callers
//! still go through [`extract_guarded`] so a misbehaving engine only ever
//! fails the message it was working on.

use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::error::ExtractionError;
use crate::pipeline::types::{Candidate, InvoiceFields};

/// Turns raw document bytes into invoice fields.
pub trait Extractor: Send + Sync {
    /// Return empty fields when the document is not an invoice.
    fn extract(&self, document: &[u8]) -> Result<InvoiceFields, ExtractionError>;
}

impl<F> Extractor for F
where
    F: Fn(&[u8]) -> Result<InvoiceFields, ExtractionError> + Send + Sync,
{
    fn extract(&self, document: &[u8]) -> Result<InvoiceFields, ExtractionError> {
        self(document)
    }
}

/// Engine that recognizes nothing.
///
/// Stands in until a real PDF parser is wired up: every run still walks,
/// downloads and classifies, but all messages end up in the failed list.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderExtractor;

impl Extractor for PlaceholderExtractor {
    fn extract(&self, _document: &[u8]) -> Result<InvoiceFields, ExtractionError> {
        Ok(InvoiceFields::default())
    }
}

/// Run `extractor` on one candidate, converting a panic into an error.
pub fn extract_guarded(
    extractor: &dyn Extractor,
    candidate: &Candidate,
) -> Result<InvoiceFields, ExtractionError> {
    catch_unwind(AssertUnwindSafe(|| extractor.extract(&candidate.bytes))).unwrap_or_else(|_| {
        Err(ExtractionError::Panicked {
            source_label: candidate.provenance.to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::Provenance;

    fn candidate(bytes: &[u8]) -> Candidate {
        Candidate {
            bytes: bytes.to_vec(),
            provenance: Provenance::Attachment {
                filename: Some("inv.pdf".into()),
            },
        }
    }

    #[test]
    fn placeholder_recognizes_nothing() {
        let fields = PlaceholderExtractor.extract(b"%PDF-1.7 garbage").unwrap();
        assert!(fields.is_empty());
    }

    #[test]
    fn closures_are_extractors() {
        let engine = |doc: &[u8]| -> Result<InvoiceFields, ExtractionError> {
            Ok(InvoiceFields::default().with_amount(doc.len().to_string()))
        };
        let fields = extract_guarded(&engine, &candidate(b"1234")).unwrap();
        assert_eq!(fields.amount.as_deref(), Some("4"));
    }

    #[test]
    fn errors_pass_through() {
        let engine = |_: &[u8]| -> Result<InvoiceFields, ExtractionError> {
            Err(ExtractionError::Failed {
                source_label: "test".into(),
                reason: "bad xref".into(),
            })
        };
        assert!(matches!(
            extract_guarded(&engine, &candidate(b"x")),
            Err(ExtractionError::Failed { .. })
        ));
    }

    #[test]
    fn panics_become_errors() {
        let engine = |_: &[u8]| -> Result<InvoiceFields, ExtractionError> {
            panic!("parser bug");
        };
        match extract_guarded(&engine, &candidate(b"x")) {
            Err(ExtractionError::Panicked { source_label }) => {
                assert_eq!(source_label, "attachment inv.pdf");
            }
            other => panic!("expected panic error, got {other:?}"),
        }
    }
}
