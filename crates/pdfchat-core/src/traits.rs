// Core traits for pluggable backends
//
// These traits keep the pipeline independent of its storage:
// - In-memory implementations for tests (see `memory`)
// - Postgres / Redis implementations for production (pdfchat-storage)

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::chat::Chat;
use crate::error::Result;
use crate::event::QaEvent;
use crate::history::QaRecord;

// ============================================================================
// HistoryStore - Durable Q&A rows
// ============================================================================

/// Durable relational store for chats and their Q&A rows
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Look up the chat owning a document
    async fn find_chat(&self, document_id: &str) -> Result<Option<Chat>>;

    /// All committed records of a chat, in storage order
    async fn list_records(&self, chat_id: Uuid) -> Result<Vec<QaRecord>>;

    /// The subset of `ids` that already have a committed row
    async fn committed_ids(&self, ids: &[Uuid]) -> Result<HashSet<Uuid>>;

    /// Open a transaction for one batch
    async fn begin(&self) -> Result<Box<dyn BatchTransaction>>;
}

/// One open batch transaction.
///
/// Dropping the transaction without calling `commit` rolls it back.
#[async_trait]
pub trait BatchTransaction: Send {
    /// Resolve the chat id for a document inside the transaction
    async fn resolve_chat_id(&mut self, document_id: &str) -> Result<Option<Uuid>>;

    /// Insert one event as a row of `chat_id`, keyed by the event id
    async fn insert(&mut self, chat_id: Uuid, event: &QaEvent) -> Result<()>;

    /// Commit every insert made so far
    async fn commit(self: Box<Self>) -> Result<()>;
}

// ============================================================================
// RecencyCache - Not-yet-committed events, per document
// ============================================================================

/// Short-lived per-document list of recent exchanges
#[async_trait]
pub trait RecencyCache: Send + Sync {
    /// Push a record to the head of the document's list
    async fn push(&self, document_id: &str, record: &QaRecord) -> Result<()>;

    /// Raw entries of the document's list, newest first
    async fn recent(&self, document_id: &str) -> Result<Vec<String>>;
}

// ============================================================================
// DeadLetterStore - Batches that failed to commit
// ============================================================================

/// A batch that could not be committed
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub id: Uuid,
    pub events: Vec<QaEvent>,
    pub error: String,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

/// Holding area for failed batches so they can be replayed
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Persist a failed batch with the error that aborted it
    async fn record(&self, events: &[QaEvent], error: &str) -> Result<Uuid>;

    /// Oldest pending dead letters with fewer than `max_attempts` attempts
    async fn pending(&self, limit: usize, max_attempts: u32) -> Result<Vec<DeadLetter>>;

    /// Note another failed replay attempt
    async fn record_attempt(&self, id: Uuid, error: &str) -> Result<()>;

    /// Remove a dead letter whose batch has been committed
    async fn resolve(&self, id: Uuid) -> Result<()>;
}
