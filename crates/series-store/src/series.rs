use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DocumentId, SeriesId};

/// One recorded assignment: a document and the value it was given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(rename = "docId")]
    pub document_id: DocumentId,
    pub value: i64,
    #[serde(rename = "assignedAt")]
    pub assigned_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(document_id: DocumentId, value: i64) -> Self {
        Self {
            document_id,
            value,
            assigned_at: Utc::now(),
        }
    }
}

/// A named counter scope with its assignment ledger.
///
/// `last_value` only ever grows by one per increment. Each document id
/// appears in `ledger` at most once and no two entries share a value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    #[serde(rename = "_id")]
    pub id: SeriesId,
    pub name: String,
    #[serde(rename = "docType")]
    pub doc_type: String,
    #[serde(rename = "lastValue")]
    pub last_value: i64,
    #[serde(rename = "usedValues")]
    pub ledger: Vec<LedgerEntry>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl Series {
    /// Returns the ledger entry recorded for a document, if any.
    pub fn ledger_entry(&self, document_id: &DocumentId) -> Option<&LedgerEntry> {
        self.ledger.iter().find(|e| &e.document_id == document_id)
    }

    /// Number of documents numbered from this series.
    pub fn assigned_count(&self) -> usize {
        self.ledger.len()
    }
}

/// Seed data for a series created out of band, before numbering traffic.
#[derive(Debug, Clone)]
pub struct NewSeries {
    pub name: String,
    pub doc_type: String,
    pub baseline: i64,
}

impl NewSeries {
    /// A series whose first assigned number will be 1.
    pub fn new(name: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc_type: doc_type.into(),
            baseline: 0,
        }
    }

    /// Sets the seeded `last_value`; the next assignment gets `baseline + 1`.
    pub fn starting_at(mut self, baseline: i64) -> Self {
        self.baseline = baseline;
        self
    }

    pub(crate) fn into_series(self) -> Series {
        Series {
            id: SeriesId::new(),
            name: self.name,
            doc_type: self.doc_type,
            last_value: self.baseline,
            ledger: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// Result of appending to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The entry was written with the offered value.
    Recorded(i64),
    /// The document was already recorded; carries the stored value.
    AlreadyPresent(i64),
}

impl AppendOutcome {
    /// The value now bound to the document, whichever way the append went.
    pub fn value(&self) -> i64 {
        match self {
            AppendOutcome::Recorded(v) | AppendOutcome::AlreadyPresent(v) => *v,
        }
    }
}
