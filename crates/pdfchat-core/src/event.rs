// Q&A completion events as delivered by the message queue
//
// The AI service publishes one event per answered question:
//
//   {"doc_id": "...", "question": "...", "answer": "...", "id": "<uuid>", "timestamp": "..."}
//
// `id` is assigned by the producer and is the only deduplication key across
// the staging buffer, the recency cache and the durable store.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::history::QaRecord;

/// A question/answer completion event, in flight or buffered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaEvent {
    /// Producer-assigned identifier
    pub id: Uuid,

    /// Document (chat) the exchange belongs to
    #[serde(rename = "doc_id", alias = "document_id")]
    pub document_id: String,

    pub question: String,

    pub answer: String,

    /// Producer-supplied creation time, kept verbatim
    pub timestamp: String,
}

impl QaEvent {
    /// Create an event with a fresh time-ordered id
    pub fn new(
        document_id: impl Into<String>,
        question: impl Into<String>,
        answer: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            document_id: document_id.into(),
            question: question.into(),
            answer: answer.into(),
            timestamp: timestamp.into(),
        }
    }

    /// Replace the generated id
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Decode a raw queue payload
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Encode as the queue wire format
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The document-independent record stored in the cache and the durable store
    pub fn to_record(&self) -> QaRecord {
        QaRecord {
            id: self.id,
            question: self.question.clone(),
            answer: self.answer.clone(),
            timestamp: self.timestamp.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_wire_format() {
        let payload = br#"{
            "doc_id": "doc-1",
            "question": "What is this?",
            "answer": "A PDF.",
            "id": "0190f5a2-7c1e-7000-8000-000000000001",
            "timestamp": "2024-05-01T10:00:00Z"
        }"#;

        let event = QaEvent::from_slice(payload).unwrap();

        assert_eq!(event.document_id, "doc-1");
        assert_eq!(event.question, "What is this?");
        assert_eq!(event.answer, "A PDF.");
        assert_eq!(
            event.id.to_string(),
            "0190f5a2-7c1e-7000-8000-000000000001"
        );
        assert_eq!(event.timestamp, "2024-05-01T10:00:00Z");
    }

    #[test]
    fn test_document_id_alias_accepted() {
        let payload = br#"{"document_id":"doc-2","question":"q","answer":"a","id":"0190f5a2-7c1e-7000-8000-000000000002","timestamp":"t"}"#;

        let event = QaEvent::from_slice(payload).unwrap();
        assert_eq!(event.document_id, "doc-2");
    }

    #[test]
    fn test_encodes_doc_id_field() {
        let event = QaEvent::new("doc-3", "q", "a", "2024-05-01T10:00:00Z");
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();

        assert_eq!(json["doc_id"], "doc-3");
        assert!(json.get("document_id").is_none());
        assert_eq!(json["id"], event.id.to_string());
    }

    #[test]
    fn test_rejects_non_uuid_id() {
        let payload =
            br#"{"doc_id":"doc-1","question":"q","answer":"a","id":"not-a-uuid","timestamp":"t"}"#;
        assert!(QaEvent::from_slice(payload).is_err());
    }

    #[test]
    fn test_rejects_missing_field() {
        let payload = br#"{"doc_id":"doc-1","question":"q","id":"0190f5a2-7c1e-7000-8000-000000000001","timestamp":"t"}"#;
        assert!(QaEvent::from_slice(payload).is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(QaEvent::from_slice(b"not json at all").is_err());
    }

    #[test]
    fn test_to_record_drops_document() {
        let event = QaEvent::new("doc-1", "q", "a", "2024-05-01T10:00:00Z");
        let record = event.to_record();

        assert_eq!(record.id, event.id);
        assert_eq!(record.question, "q");
        assert_eq!(record.answer, "a");
        assert_eq!(record.timestamp, "2024-05-01T10:00:00Z");
    }
}
