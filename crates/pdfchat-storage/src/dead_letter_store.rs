// Database-backed DeadLetterStore implementation
//
// A failed batch is stored as one row; its events are kept as a JSONB array
// in wire format so a replay sees exactly what was buffered.

use async_trait::async_trait;
use pdfchat_core::traits::{DeadLetter, DeadLetterStore};
use pdfchat_core::{HistoryError, QaEvent, Result};
use tracing::debug;
use uuid::Uuid;

use crate::repositories::Database;

/// Database-backed dead-letter store (qa_dead_letters)
#[derive(Clone)]
pub struct DbDeadLetterStore {
    db: Database,
}

impl DbDeadLetterStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DeadLetterStore for DbDeadLetterStore {
    async fn record(&self, events: &[QaEvent], error: &str) -> Result<Uuid> {
        let payload = serde_json::to_value(events)?;
        let row = self
            .db
            .insert_dead_letter(payload, error)
            .await
            .map_err(|e| HistoryError::dead_letter(e.to_string()))?;

        Ok(row.id)
    }

    async fn pending(&self, limit: usize, max_attempts: u32) -> Result<Vec<DeadLetter>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let max_attempts = i32::try_from(max_attempts).unwrap_or(i32::MAX);
        let rows = self
            .db
            .list_dead_letters(limit, max_attempts)
            .await
            .map_err(|e| HistoryError::dead_letter(e.to_string()))?;

        rows.into_iter().map(DeadLetter::try_from).collect()
    }

    async fn record_attempt(&self, id: Uuid, error: &str) -> Result<()> {
        let updated = self
            .db
            .record_dead_letter_attempt(id, error)
            .await
            .map_err(|e| HistoryError::dead_letter(e.to_string()))?;

        if !updated {
            return Err(HistoryError::dead_letter(format!(
                "dead letter not found: {}",
                id
            )));
        }
        Ok(())
    }

    async fn resolve(&self, id: Uuid) -> Result<()> {
        let deleted = self
            .db
            .delete_dead_letter(id)
            .await
            .map_err(|e| HistoryError::dead_letter(e.to_string()))?;

        if !deleted {
            debug!(dead_letter_id = %id, "Dead letter already resolved");
        }
        Ok(())
    }
}

/// Create a database-backed dead-letter store
pub fn create_db_dead_letter_store(db: Database) -> DbDeadLetterStore {
    DbDeadLetterStore::new(db)
}
