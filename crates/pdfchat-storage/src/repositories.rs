// Repository layer for database operations
// Chats / Q&A histories / dead letters

use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::*;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create database connection from URL
    pub async fn from_url(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Create a pool with an upper bound on open connections
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ============================================
    // Chats (owned by the upload flow, read here)
    // ============================================

    pub async fn create_chat(&self, input: CreateChat) -> Result<ChatRow> {
        let row = sqlx::query_as::<_, ChatRow>(
            r#"
            INSERT INTO chats (id, user_id, doc_id, doc_text)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, doc_id, doc_text, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.user_id)
        .bind(&input.doc_id)
        .bind(&input.doc_text)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_chat_by_document(&self, doc_id: &str) -> Result<Option<ChatRow>> {
        let row = sqlx::query_as::<_, ChatRow>(
            r#"
            SELECT id, user_id, doc_id, doc_text, created_at
            FROM chats
            WHERE doc_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(doc_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn delete_chat(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chats WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ============================================
    // Q&A histories
    // ============================================

    pub async fn list_qa_histories(&self, chat_id: Uuid) -> Result<Vec<QaHistoryRow>> {
        let rows = sqlx::query_as::<_, QaHistoryRow>(
            r#"
            SELECT id, chat_id, question, answer, timestamp
            FROM qa_histories
            WHERE chat_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Ids among `ids` that already have a row
    pub async fn existing_qa_history_ids(&self, ids: &[Uuid]) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT id FROM qa_histories WHERE id = ANY($1)")
                .bind(ids)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn count_qa_histories(&self, chat_id: Uuid) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM qa_histories WHERE chat_id = $1")
            .bind(chat_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }

    // ============================================
    // Dead letters (batches that failed to commit)
    // ============================================

    pub async fn insert_dead_letter(
        &self,
        events: serde_json::Value,
        error: &str,
    ) -> Result<DeadLetterRow> {
        let row = sqlx::query_as::<_, DeadLetterRow>(
            r#"
            INSERT INTO qa_dead_letters (id, events, error, attempts)
            VALUES ($1, $2, $3, 1)
            RETURNING id, events, error, attempts, created_at, last_attempt_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&events)
        .bind(error)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Oldest dead letters that have not used up their attempts
    pub async fn list_dead_letters(
        &self,
        limit: i64,
        max_attempts: i32,
    ) -> Result<Vec<DeadLetterRow>> {
        let rows = sqlx::query_as::<_, DeadLetterRow>(
            r#"
            SELECT id, events, error, attempts, created_at, last_attempt_at
            FROM qa_dead_letters
            WHERE attempts < $2
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .bind(max_attempts)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn record_dead_letter_attempt(&self, id: Uuid, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE qa_dead_letters
            SET attempts = attempts + 1, error = $2, last_attempt_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_dead_letter(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM qa_dead_letters WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
