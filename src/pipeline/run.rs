//! One invoice intake run over the current backlog of unseen messages.
//!
//! Per message: fetch → decode subject → locate candidates → extract →
//! store → classify → mark `\Seen`. A failure inside one message only
//! fails that message; a failure to open the mailbox ends the run before
//! anything is processed or notified.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::channels::Notifier;
use crate::error::{Error, MailboxError};
use crate::mailbox::{Mailbox, MailboxConnector, MessageId, decode_subject};
use crate::pipeline::extract::{Extractor, extract_guarded};
use crate::pipeline::fetch::DocumentFetcher;
use crate::pipeline::locator::CandidateLocator;
use crate::pipeline::summary::RunSummary;
use crate::pipeline::types::InvoiceRecord;
use crate::store::InvoiceStore;

/// Collaborators for a run.
pub struct RunDeps {
    pub connector: Arc<dyn MailboxConnector>,
    pub store: Arc<dyn InvoiceStore>,
    pub fetcher: Arc<dyn DocumentFetcher>,
    pub extractor: Arc<dyn Extractor>,
    pub notifier: Arc<dyn Notifier>,
}

/// How one message ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// At least one record was stored.
    Processed { stored: usize },
    /// Nothing was stored, either because nothing was recognized or
    /// because fetching, parsing, extraction or storage failed.
    Failed { reason: String },
}

/// Drives a run from session open to summary notification.
pub struct InvoicePipeline {
    deps: RunDeps,
}

impl InvoicePipeline {
    pub fn new(deps: RunDeps) -> Self {
        Self { deps }
    }

    /// Process every unseen message once and notify the summary.
    ///
    /// Returns an error only when storage cannot be initialized or the
    /// mailbox cannot be opened or searched; no notification is sent then.
    pub async fn run(&self) -> Result<RunSummary, Error> {
        info!("Starting invoice run");
        self.deps.store.init().await?;

        let mut session = match self.deps.connector.open().await {
            Ok(session) => {
                debug!("Mailbox session opened");
                session
            }
            Err(e) => {
                error!(error = %e, "Could not connect to mailbox");
                return Err(e.into());
            }
        };

        let result = self.process_backlog(session.as_mut()).await;

        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to log out of mailbox");
        } else {
            debug!("Mailbox session closed");
        }

        let summary = match result {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, "Could not list unseen messages");
                return Err(e.into());
            }
        };

        info!(
            processed = summary.processed.len(),
            failed = summary.failed.len(),
            "Run complete"
        );
        self.send_summary(&summary).await;
        Ok(summary)
    }

    async fn process_backlog(&self, session: &mut dyn Mailbox) -> Result<RunSummary, MailboxError> {
        let ids = session.list_unseen().await?;
        info!(count = ids.len(), "Unseen messages found");

        let mut summary = RunSummary::new();
        for id in &ids {
            let (subject, outcome) = self.process_message(session, id).await;
            match outcome {
                MessageOutcome::Processed { stored } => {
                    info!(id = %id, subject = %subject, stored, "Invoice email processed");
                    summary.record_processed(subject);
                }
                MessageOutcome::Failed { reason } => {
                    info!(id = %id, subject = %subject, reason = %reason, "Email not processed");
                    summary.record_failed(subject);
                }
            }

            // Best-effort; the classification above stands either way.
            if let Err(e) = session.mark_seen(id).await {
                warn!(id = %id, error = %e, "Failed to mark message as seen");
            }
        }
        Ok(summary)
    }

    /// Fetch, extract and store one message. Never fails; errors become
    /// [`MessageOutcome::Failed`].
    async fn process_message(
        &self,
        session: &mut dyn Mailbox,
        id: &MessageId,
    ) -> (String, MessageOutcome) {
        let fetched = match session.fetch(id).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(id = %id, error = %e, "Failed to fetch message");
                return (
                    placeholder_subject(id),
                    MessageOutcome::Failed {
                        reason: e.to_string(),
                    },
                );
            }
        };

        let Some(parsed) = fetched.parse() else {
            warn!(id = %id, "Message could not be parsed");
            return (
                placeholder_subject(id),
                MessageOutcome::Failed {
                    reason: "unparsable message".into(),
                },
            );
        };
        let subject = decode_subject(&parsed);

        let outcome = match self.extract_and_store(&subject, &parsed).await {
            Ok(0) => MessageOutcome::Failed {
                reason: "no invoice data found".into(),
            },
            Ok(stored) => MessageOutcome::Processed { stored },
            Err(e) => {
                error!(subject = %subject, error = %e, "Failed to process email");
                MessageOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        (subject, outcome)
    }

    /// Returns how many records were stored.
    async fn extract_and_store(
        &self,
        subject: &str,
        parsed: &mail_parser::Message<'_>,
    ) -> Result<usize, Error> {
        let mut locator = CandidateLocator::new(parsed, self.deps.fetcher.as_ref());
        let mut records = Vec::new();

        while let Some(candidate) = locator.next_candidate().await {
            let fields = extract_guarded(self.deps.extractor.as_ref(), &candidate)?;
            let provenance = candidate.provenance;
            match InvoiceRecord::from_extraction(fields, provenance.clone()) {
                Some(record) => records.push(record),
                None => debug!(source = %provenance, "No invoice data in document"),
            }
        }

        for record in &records {
            self.deps.store.insert_invoice(subject, record).await?;
        }
        Ok(records.len())
    }

    async fn send_summary(&self, summary: &RunSummary) {
        if summary.is_empty() {
            debug!("Nothing handled; skipping notification");
            return;
        }
        if let Err(e) = self.deps.notifier.notify(&summary.render()).await {
            warn!(error = %e, "Failed to send summary notification");
        }
    }
}

/// Summary entry for a message whose subject could not be read.
fn placeholder_subject(id: &MessageId) -> String {
    format!("(message {id})")
}
