//! Shared types for the extraction pipeline.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Candidates ──────────────────────────────────────────────────────

/// Where a candidate document's bytes came from.
///
/// Serializes flat into a record as `"source": "attachment" | "link"` plus
/// `filename` or `url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum Provenance {
    /// A MIME part of the message. The declared filename may be absent.
    Attachment { filename: Option<String> },
    /// A document downloaded from a URL found in an HTML body.
    Link { url: String },
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Attachment { filename: Some(name) } => write!(f, "attachment {name}"),
            Provenance::Attachment { filename: None } => f.write_str("unnamed attachment"),
            Provenance::Link { url } => write!(f, "link {url}"),
        }
    }
}

/// One document to run through the extraction engine.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub bytes: Vec<u8>,
    pub provenance: Provenance,
}

// ── Extracted data ──────────────────────────────────────────────────

/// Fields recognized by an extraction engine.
///
/// The common invoice fields are typed; anything else an engine reports
/// lands in `extra` and is persisted alongside them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl InvoiceFields {
    /// True when nothing at all was recognized.
    pub fn is_empty(&self) -> bool {
        self.invoice_number.is_none()
            && self.date.is_none()
            && self.amount.is_none()
            && self.extra.is_empty()
    }

    pub fn with_amount(mut self, amount: impl Into<String>) -> Self {
        self.amount = Some(amount.into());
        self
    }

    pub fn with_invoice_number(mut self, number: impl Into<String>) -> Self {
        self.invoice_number = Some(number.into());
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// A persisted invoice: extracted fields with their provenance merged in.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceRecord {
    pub fields: InvoiceFields,
    pub provenance: Provenance,
}

impl InvoiceRecord {
    /// Build a record, or `None` when the extraction found nothing.
    pub fn from_extraction(fields: InvoiceFields, provenance: Provenance) -> Option<Self> {
        if fields.is_empty() {
            return None;
        }
        Some(Self { fields, provenance })
    }

    /// Flat JSON object for the record.
    ///
    /// Later layers overwrite earlier ones on key collisions: `extra`, then
    /// the typed fields, then the provenance keys.
    pub fn to_map(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let mut map: Map<String, Value> = self
            .fields
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let typed = [
            ("invoice_number", &self.fields.invoice_number),
            ("date", &self.fields.date),
            ("amount", &self.fields.amount),
        ];
        for (key, value) in typed {
            if let Some(value) = value {
                map.insert(key.to_string(), Value::String(value.clone()));
            }
        }

        if let Value::Object(provenance) = serde_json::to_value(&self.provenance)? {
            map.extend(provenance);
        }
        Ok(map)
    }

    /// JSON text stored in the `data` column.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_map()?)
    }
}
