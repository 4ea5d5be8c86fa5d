// Database-backed HistoryStore implementation
//
// Reads go through the shared pool. A batch commit runs on one
// `sqlx::Transaction`: chat lookups and inserts share the connection, and
// dropping the transaction without commit rolls it back.

use std::collections::HashSet;

use async_trait::async_trait;
use pdfchat_core::traits::{BatchTransaction, HistoryStore};
use pdfchat_core::{Chat, HistoryError, QaEvent, QaRecord, Result};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::repositories::Database;

// ============================================================================
// DbHistoryStore - chats and qa_histories
// ============================================================================

/// Database-backed history store
#[derive(Clone)]
pub struct DbHistoryStore {
    db: Database,
}

impl DbHistoryStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl HistoryStore for DbHistoryStore {
    async fn find_chat(&self, document_id: &str) -> Result<Option<Chat>> {
        let row = self
            .db
            .get_chat_by_document(document_id)
            .await
            .map_err(|e| HistoryError::store(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn list_records(&self, chat_id: Uuid) -> Result<Vec<QaRecord>> {
        let rows = self
            .db
            .list_qa_histories(chat_id)
            .await
            .map_err(|e| HistoryError::store(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn committed_ids(&self, ids: &[Uuid]) -> Result<HashSet<Uuid>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let found = self
            .db
            .existing_qa_history_ids(ids)
            .await
            .map_err(|e| HistoryError::store(e.to_string()))?;

        Ok(found.into_iter().collect())
    }

    async fn begin(&self) -> Result<Box<dyn BatchTransaction>> {
        let tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| HistoryError::store(e.to_string()))?;

        Ok(Box::new(PgBatchTransaction { tx }))
    }
}

// ============================================================================
// PgBatchTransaction - one transaction per batch
// ============================================================================

struct PgBatchTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BatchTransaction for PgBatchTransaction {
    async fn resolve_chat_id(&mut self, document_id: &str) -> Result<Option<Uuid>> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id
            FROM chats
            WHERE doc_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(document_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| HistoryError::store(e.to_string()))?;

        Ok(row.map(|(id,)| id))
    }

    async fn insert(&mut self, chat_id: Uuid, event: &QaEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO qa_histories (id, chat_id, question, answer, timestamp)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.id)
        .bind(chat_id)
        .bind(&event.question)
        .bind(&event.answer)
        .bind(&event.timestamp)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| HistoryError::store(e.to_string()))?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let PgBatchTransaction { tx } = *self;
        tx.commit()
            .await
            .map_err(|e| HistoryError::store(e.to_string()))
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Create a database-backed history store
pub fn create_db_history_store(db: Database) -> DbHistoryStore {
    DbHistoryStore::new(db)
}
