//! Wire formats for the inbound, outbound, and dead-letter topics.

use common::{DocumentId, FiscalNumber};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// A document has been prepared and awaits a fiscal number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPreparedEvent {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Type")]
    pub doc_type: String,
    #[serde(rename = "Amount")]
    pub amount: u32,
    #[serde(rename = "Currency")]
    pub currency: String,
}

impl DocumentPreparedEvent {
    /// Decodes and validates a raw payload.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let event: Self = serde_json::from_slice(payload)?;
        if event.id.trim().is_empty() {
            return Err(DecodeError::MissingDocumentId);
        }
        Ok(event)
    }

    pub fn document_id(&self) -> DocumentId {
        DocumentId::new(self.id.clone())
    }
}

/// An invoice has been created with its fiscal number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCreatedEvent {
    #[serde(rename = "ID")]
    pub id: String,
    /// Decimal rendering of the assigned number.
    #[serde(rename = "FiscalNumber")]
    pub fiscal_number: String,
    #[serde(rename = "Type")]
    pub doc_type: String,
    #[serde(rename = "Amount")]
    pub amount: u32,
    #[serde(rename = "Currency")]
    pub currency: String,
}

impl InvoiceCreatedEvent {
    pub fn from_prepared(prepared: &DocumentPreparedEvent, fiscal_number: FiscalNumber) -> Self {
        Self {
            id: prepared.id.clone(),
            fiscal_number: fiscal_number.to_string(),
            doc_type: prepared.doc_type.clone(),
            amount: prepared.amount,
            currency: prepared.currency.clone(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// A rejected inbound message, parked on the dead-letter topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub source_topic: String,
    pub sequence: u64,
    pub reason: String,
    /// The original payload, lossily decoded as UTF-8.
    pub payload: String,
}

impl DeadLetter {
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_wire_field_names() {
        let payload = br#"{"ID":"doc-1","Type":"invoice","Amount":1250,"Currency":"EUR"}"#;
        let event = DocumentPreparedEvent::decode(payload).unwrap();
        assert_eq!(event.id, "doc-1");
        assert_eq!(event.doc_type, "invoice");
        assert_eq!(event.amount, 1250);
        assert_eq!(event.currency, "EUR");
    }

    #[test]
    fn rejects_non_json() {
        let result = DocumentPreparedEvent::decode(b"not json");
        assert!(matches!(result, Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn rejects_negative_amount() {
        let payload = br#"{"ID":"doc-1","Type":"invoice","Amount":-5,"Currency":"EUR"}"#;
        assert!(matches!(
            DocumentPreparedEvent::decode(payload),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_blank_id() {
        let payload = br#"{"ID":" ","Type":"invoice","Amount":1,"Currency":"EUR"}"#;
        assert!(matches!(
            DocumentPreparedEvent::decode(payload),
            Err(DecodeError::MissingDocumentId)
        ));
    }

    #[test]
    fn invoice_created_renders_fiscal_number_as_string() {
        let prepared = DocumentPreparedEvent {
            id: "doc-1".to_string(),
            doc_type: "invoice".to_string(),
            amount: 990,
            currency: "HRK".to_string(),
        };
        let created = InvoiceCreatedEvent::from_prepared(&prepared, FiscalNumber::new(42));

        let json: serde_json::Value = serde_json::from_slice(&created.encode().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "ID": "doc-1",
                "FiscalNumber": "42",
                "Type": "invoice",
                "Amount": 990,
                "Currency": "HRK"
            })
        );
    }
}
