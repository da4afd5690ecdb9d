//! libSQL backend for [`InvoiceStore`].
//!
//! Supports local file and in-memory databases. One connection is opened
//! per store and reused for every statement.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::pipeline::types::InvoiceRecord;
use crate::store::migrations;
use crate::store::traits::{InvoiceStore, StoredInvoice};

/// libSQL invoice store.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file. Call [`InvoiceStore::init`]
    /// before use.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        info!(path = %path.display(), "Database opened");
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Parse an RFC 3339 timestamp as written by `insert_invoice`.
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Column order: 0:id, 1:email_subject, 2:data, 3:created_at
fn row_to_invoice(row: &libsql::Row) -> Result<StoredInvoice, DatabaseError> {
    let id: i64 = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("row parse id: {e}")))?;
    let subject: Option<String> = row.get(1).ok();
    let data_str: Option<String> = row.get(2).ok();
    let created_str: Option<String> = row.get(3).ok();

    let data = match data_str {
        Some(text) => serde_json::from_str(&text)
            .map_err(|e| DatabaseError::Serialization(format!("invoice {id} data: {e}")))?,
        None => serde_json::Value::Null,
    };

    Ok(StoredInvoice {
        id,
        subject: subject.unwrap_or_default(),
        data,
        created_at: created_str.as_deref().and_then(parse_datetime),
    })
}

#[async_trait]
impl InvoiceStore for LibSqlStore {
    async fn init(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn insert_invoice(
        &self,
        subject: &str,
        record: &InvoiceRecord,
    ) -> Result<i64, DatabaseError> {
        let data = record
            .to_json()
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        let conn = self.conn();
        conn.execute(
            "INSERT INTO invoices (email_subject, data, created_at) VALUES (?1, ?2, ?3)",
            params![subject, data, now],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_invoice: {e}")))?;

        let id = conn.last_insert_rowid();
        debug!(id, subject, "Invoice inserted into DB");
        Ok(id)
    }

    async fn list_invoices(&self) -> Result<Vec<StoredInvoice>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, email_subject, data, created_at FROM invoices ORDER BY id ASC",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_invoices: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_invoices: {e}")))?
        {
            out.push(row_to_invoice(&row)?);
        }
        Ok(out)
    }
}
