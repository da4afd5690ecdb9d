//! `InvoiceStore` trait: the append-only sink for extracted invoices.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::pipeline::types::InvoiceRecord;

/// A persisted invoice row.
#[derive(Debug, Clone)]
pub struct StoredInvoice {
    pub id: i64,
    pub subject: String,
    /// The record as stored: extracted fields plus provenance.
    pub data: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
}

/// Backend-agnostic invoice persistence.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Create the schema if absent. Safe to call any number of times.
    async fn init(&self) -> Result<(), DatabaseError>;

    /// Append one record under the message subject. Returns the row id.
    async fn insert_invoice(
        &self,
        subject: &str,
        record: &InvoiceRecord,
    ) -> Result<i64, DatabaseError>;

    /// All stored invoices, oldest first.
    async fn list_invoices(&self) -> Result<Vec<StoredInvoice>, DatabaseError>;
}
