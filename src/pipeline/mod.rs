//! Invoice intake pipeline.
//!
//! Every unseen message flows through:
//! 1. `CandidateLocator`: PDF attachments, then PDF links found in HTML
//! 2. `Extractor`: document bytes to invoice fields
//! 3. `InvoiceStore`: one row per recognized document
//! 4. `RunSummary`: processed/failed subjects, notified once per run

pub mod extract;
pub mod fetch;
pub mod locator;
pub mod run;
pub mod summary;
pub mod types;

pub use extract::{Extractor, PlaceholderExtractor};
pub use fetch::{DocumentFetcher, HttpFetcher};
pub use locator::CandidateLocator;
pub use run::{InvoicePipeline, MessageOutcome, RunDeps};
pub use summary::RunSummary;
pub use types::{Candidate, InvoiceFields, InvoiceRecord, Provenance};
