// In-memory implementations for examples and testing
//
// These implementations keep all data in memory, making them useful for:
// - Unit tests of the buffer / committer / reconciler pipeline
// - Running the pipeline without Postgres or Redis
//
// Each store can be switched into a failing mode to exercise error paths.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::chat::Chat;
use crate::error::{HistoryError, Result};
use crate::event::QaEvent;
use crate::history::QaRecord;
use crate::traits::{BatchTransaction, DeadLetter, DeadLetterStore, HistoryStore, RecencyCache};

// ============================================================================
// InMemoryHistoryStore - Chats and committed Q&A rows
// ============================================================================

#[derive(Debug, Default)]
struct HistoryState {
    chats: HashMap<String, Chat>,
    records: HashMap<Uuid, Vec<QaRecord>>,
    committed_ids: HashSet<Uuid>,
    commit_failure: Option<String>,
    unavailable: bool,
}

impl HistoryState {
    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            return Err(HistoryError::store("connection refused"));
        }
        Ok(())
    }
}

/// In-memory durable store with transactional batch semantics
///
/// Inserts are staged per transaction and only become visible on commit.
/// A duplicate event id fails the insert like a primary key violation would.
#[derive(Debug, Default, Clone)]
pub struct InMemoryHistoryStore {
    state: Arc<RwLock<HistoryState>>,
}

impl InMemoryHistoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a chat for a document and return it
    pub fn add_chat(&self, document_id: &str, document_name: &str) -> Chat {
        let chat = Chat {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            document_id: document_id.to_string(),
            document_name: document_name.to_string(),
            created_at: Utc::now(),
        };
        self.state
            .write()
            .chats
            .insert(document_id.to_string(), chat.clone());
        chat
    }

    /// Pre-populate committed rows (useful for testing)
    pub fn seed(&self, chat_id: Uuid, records: Vec<QaRecord>) {
        let mut state = self.state.write();
        for record in &records {
            state.committed_ids.insert(record.id);
        }
        state.records.entry(chat_id).or_default().extend(records);
    }

    /// Committed rows of a chat
    pub fn records(&self, chat_id: Uuid) -> Vec<QaRecord> {
        self.state
            .read()
            .records
            .get(&chat_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Total committed rows across all chats
    pub fn record_count(&self) -> usize {
        self.state.read().committed_ids.len()
    }

    /// Make every following commit fail with the given message (`None` to reset)
    pub fn fail_commits(&self, error: Option<&str>) {
        self.state.write().commit_failure = error.map(str::to_string);
    }

    /// Simulate a lost database connection
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unavailable = unavailable;
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn find_chat(&self, document_id: &str) -> Result<Option<Chat>> {
        let state = self.state.read();
        state.check_available()?;
        Ok(state.chats.get(document_id).cloned())
    }

    async fn list_records(&self, chat_id: Uuid) -> Result<Vec<QaRecord>> {
        let state = self.state.read();
        state.check_available()?;
        Ok(state.records.get(&chat_id).cloned().unwrap_or_default())
    }

    async fn committed_ids(&self, ids: &[Uuid]) -> Result<HashSet<Uuid>> {
        let state = self.state.read();
        state.check_available()?;
        Ok(ids
            .iter()
            .filter(|id| state.committed_ids.contains(id))
            .copied()
            .collect())
    }

    async fn begin(&self) -> Result<Box<dyn BatchTransaction>> {
        self.state.read().check_available()?;
        Ok(Box::new(InMemoryBatchTransaction {
            state: Arc::clone(&self.state),
            staged: Vec::new(),
        }))
    }
}

/// Transaction over [`InMemoryHistoryStore`]; staged rows are discarded on drop
struct InMemoryBatchTransaction {
    state: Arc<RwLock<HistoryState>>,
    staged: Vec<(Uuid, QaRecord)>,
}

#[async_trait]
impl BatchTransaction for InMemoryBatchTransaction {
    async fn resolve_chat_id(&mut self, document_id: &str) -> Result<Option<Uuid>> {
        let state = self.state.read();
        state.check_available()?;
        Ok(state.chats.get(document_id).map(|chat| chat.id))
    }

    async fn insert(&mut self, chat_id: Uuid, event: &QaEvent) -> Result<()> {
        let state = self.state.read();
        state.check_available()?;

        let duplicate = state.committed_ids.contains(&event.id)
            || self.staged.iter().any(|(_, r)| r.id == event.id);
        if duplicate {
            return Err(HistoryError::store(format!(
                "duplicate key value violates unique constraint \"qa_histories_pkey\": {}",
                event.id
            )));
        }
        drop(state);

        self.staged.push((chat_id, event.to_record()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryBatchTransaction { state, staged } = *self;
        let mut state = state.write();
        state.check_available()?;
        if let Some(error) = &state.commit_failure {
            return Err(HistoryError::store(error.clone()));
        }

        for (chat_id, record) in staged {
            state.committed_ids.insert(record.id);
            state.records.entry(chat_id).or_default().push(record);
        }
        Ok(())
    }
}

// ============================================================================
// InMemoryRecencyCache - Per-document lists, newest first
// ============================================================================

#[derive(Debug, Default)]
struct CacheState {
    lists: HashMap<String, VecDeque<String>>,
    unavailable: bool,
}

/// In-memory recency cache
///
/// Mirrors the Redis list semantics: push to the head, trim to `max_entries`,
/// read everything newest first. Expiry is not modelled.
#[derive(Debug, Clone)]
pub struct InMemoryRecencyCache {
    state: Arc<RwLock<CacheState>>,
    max_entries: usize,
}

impl Default for InMemoryRecencyCache {
    fn default() -> Self {
        Self::new(200)
    }
}

impl InMemoryRecencyCache {
    /// Create a cache keeping at most `max_entries` per document
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(CacheState::default())),
            max_entries: max_entries.max(1),
        }
    }

    /// Push a raw entry (e.g. a malformed one) to the head of a list
    pub fn push_raw(&self, document_id: &str, raw: &str) {
        let mut state = self.state.write();
        let list = state.lists.entry(document_id.to_string()).or_default();
        list.push_front(raw.to_string());
        list.truncate(self.max_entries);
    }

    /// Number of entries held for a document
    pub fn len(&self, document_id: &str) -> usize {
        self.state
            .read()
            .lists
            .get(document_id)
            .map(|l| l.len())
            .unwrap_or(0)
    }

    /// Simulate a cache outage
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unavailable = unavailable;
    }
}

#[async_trait]
impl RecencyCache for InMemoryRecencyCache {
    async fn push(&self, document_id: &str, record: &QaRecord) -> Result<()> {
        if self.state.read().unavailable {
            return Err(HistoryError::cache("connection refused"));
        }
        let raw = record.to_json()?;
        self.push_raw(document_id, &raw);
        Ok(())
    }

    async fn recent(&self, document_id: &str) -> Result<Vec<String>> {
        let state = self.state.read();
        if state.unavailable {
            return Err(HistoryError::cache("connection refused"));
        }
        Ok(state
            .lists
            .get(document_id)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default())
    }
}

// ============================================================================
// InMemoryDeadLetterStore - Failed batches
// ============================================================================

#[derive(Debug, Default)]
struct DeadLetterState {
    entries: Vec<DeadLetter>,
    unavailable: bool,
}

/// In-memory dead-letter store
#[derive(Debug, Default, Clone)]
pub struct InMemoryDeadLetterStore {
    state: Arc<RwLock<DeadLetterState>>,
}

impl InMemoryDeadLetterStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// All dead letters currently held
    pub fn entries(&self) -> Vec<DeadLetter> {
        self.state.read().entries.clone()
    }

    /// Simulate an unreachable store
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unavailable = unavailable;
    }

    fn check_available(&self) -> Result<()> {
        if self.state.read().unavailable {
            return Err(HistoryError::dead_letter("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn record(&self, events: &[QaEvent], error: &str) -> Result<Uuid> {
        self.check_available()?;
        let id = Uuid::now_v7();
        self.state.write().entries.push(DeadLetter {
            id,
            events: events.to_vec(),
            error: error.to_string(),
            attempts: 1,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn pending(&self, limit: usize, max_attempts: u32) -> Result<Vec<DeadLetter>> {
        self.check_available()?;
        Ok(self
            .state
            .read()
            .entries
            .iter()
            .filter(|e| e.attempts < max_attempts)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn record_attempt(&self, id: Uuid, error: &str) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.write();
        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| HistoryError::dead_letter(format!("dead letter not found: {}", id)))?;
        entry.attempts += 1;
        entry.error = error.to_string();
        Ok(())
    }

    async fn resolve(&self, id: Uuid) -> Result<()> {
        self.check_available()?;
        self.state.write().entries.retain(|e| e.id != id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(document_id: &str, question: &str) -> QaEvent {
        QaEvent::new(document_id, question, "a", "2024-05-01T10:00:00Z")
    }

    #[tokio::test]
    async fn test_staged_rows_invisible_until_commit() {
        let store = InMemoryHistoryStore::new();
        let chat = store.add_chat("doc-1", "doc.pdf");

        let mut tx = store.begin().await.unwrap();
        tx.insert(chat.id, &event("doc-1", "q1")).await.unwrap();
        assert_eq!(store.record_count(), 0);

        tx.commit().await.unwrap();
        assert_eq!(store.records(chat.id).len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = InMemoryHistoryStore::new();
        let chat = store.add_chat("doc-1", "doc.pdf");

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert(chat.id, &event("doc-1", "q1")).await.unwrap();
        }

        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_id_fails_insert() {
        let store = InMemoryHistoryStore::new();
        let chat = store.add_chat("doc-1", "doc.pdf");
        let e = event("doc-1", "q1");
        store.seed(chat.id, vec![e.to_record()]);

        let mut tx = store.begin().await.unwrap();
        let err = tx.insert(chat.id, &e).await.unwrap_err();
        assert!(matches!(err, HistoryError::Store(_)));
    }

    #[tokio::test]
    async fn test_cache_lists_newest_first_and_trims() {
        let cache = InMemoryRecencyCache::new(2);
        for q in ["q1", "q2", "q3"] {
            cache
                .push("doc-1", &event("doc-1", q).to_record())
                .await
                .unwrap();
        }

        let entries = cache.recent("doc-1").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(QaRecord::from_json(&entries[0]).unwrap().question, "q3");
        assert_eq!(QaRecord::from_json(&entries[1]).unwrap().question, "q2");
    }

    #[tokio::test]
    async fn test_dead_letter_lifecycle() {
        let store = InMemoryDeadLetterStore::new();
        let id = store
            .record(&[event("doc-1", "q1")], "boom")
            .await
            .unwrap();

        store.record_attempt(id, "boom again").await.unwrap();
        let pending = store.pending(10, 5).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 2);
        assert_eq!(pending[0].error, "boom again");

        store.resolve(id).await.unwrap();
        assert!(store.pending(10, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_skips_exhausted_letters() {
        let store = InMemoryDeadLetterStore::new();
        let exhausted = store.record(&[event("doc-1", "q1")], "boom").await.unwrap();
        store.record_attempt(exhausted, "boom").await.unwrap();
        let fresh = store.record(&[event("doc-1", "q2")], "boom").await.unwrap();

        let pending = store.pending(1, 2).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, fresh);
        assert_eq!(store.entries().len(), 2);
    }

    #[tokio::test]
    async fn test_committed_ids_subset() {
        let store = InMemoryHistoryStore::new();
        let chat = store.add_chat("doc-1", "doc.pdf");
        let kept = event("doc-1", "q1");
        store.seed(chat.id, vec![kept.to_record()]);
        let other = event("doc-1", "q2");

        let found = store.committed_ids(&[kept.id, other.id]).await.unwrap();
        assert_eq!(found, HashSet::from([kept.id]));
    }
}
