// Database models (internal, may differ from core types)

use chrono::{DateTime, Utc};
use pdfchat_core::{Chat, DeadLetter, HistoryError, QaEvent, QaRecord};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================
// Chats
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct ChatRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub doc_id: String,
    pub doc_text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateChat {
    pub user_id: Uuid,
    pub doc_id: String,
    pub doc_text: String,
}

impl From<ChatRow> for Chat {
    fn from(row: ChatRow) -> Self {
        Chat {
            id: row.id,
            user_id: row.user_id,
            document_id: row.doc_id,
            document_name: row.doc_text,
            created_at: row.created_at,
        }
    }
}

// ============================================
// Q&A histories
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct QaHistoryRow {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub question: String,
    pub answer: String,
    pub timestamp: String,
}

impl From<QaHistoryRow> for QaRecord {
    fn from(row: QaHistoryRow) -> Self {
        QaRecord {
            id: row.id,
            question: row.question,
            answer: row.answer,
            timestamp: row.timestamp,
        }
    }
}

// ============================================
// Dead letters
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct DeadLetterRow {
    pub id: Uuid,
    pub events: sqlx::types::JsonValue,
    pub error: String,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
}

impl TryFrom<DeadLetterRow> for DeadLetter {
    type Error = HistoryError;

    fn try_from(row: DeadLetterRow) -> Result<Self, Self::Error> {
        let events: Vec<QaEvent> = serde_json::from_value(row.events)?;
        Ok(DeadLetter {
            id: row.id,
            events,
            error: row.error,
            attempts: row.attempts.max(0) as u32,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_chat_row_maps_doc_text_to_document_name() {
        let row = ChatRow {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            doc_id: "doc-1".to_string(),
            doc_text: "paper.pdf".to_string(),
            created_at: Utc::now(),
        };

        let chat: Chat = row.clone().into();
        assert_eq!(chat.id, row.id);
        assert_eq!(chat.document_id, "doc-1");
        assert_eq!(chat.document_name, "paper.pdf");
    }

    #[test]
    fn test_dead_letter_row_decodes_events() {
        let event = QaEvent::new("doc-1", "q", "a", "2024-05-01T10:00:00Z");
        let row = DeadLetterRow {
            id: Uuid::now_v7(),
            events: serde_json::to_value(vec![event.clone()]).unwrap(),
            error: "boom".to_string(),
            attempts: 3,
            created_at: Utc::now(),
            last_attempt_at: Utc::now(),
        };

        let dead_letter = DeadLetter::try_from(row).unwrap();
        assert_eq!(dead_letter.events, vec![event]);
        assert_eq!(dead_letter.attempts, 3);
    }

    #[test]
    fn test_dead_letter_row_with_corrupt_events() {
        let row = DeadLetterRow {
            id: Uuid::now_v7(),
            events: json!({"not": "a list"}),
            error: "boom".to_string(),
            attempts: 1,
            created_at: Utc::now(),
            last_attempt_at: Utc::now(),
        };

        assert!(matches!(
            DeadLetter::try_from(row),
            Err(HistoryError::Serialization(_))
        ));
    }
}
