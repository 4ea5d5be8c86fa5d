//! History reconciler
//!
//! Builds the history of one document from two sources:
//! - the recency cache, which sees events before the batch committer runs
//! - the durable rows of the document's chat
//!
//! Entries are deduplicated by event id (cache first, durable rows fill the
//! gaps) and sorted by timestamp. The cache is best effort: when it cannot
//! be read the history is served from durable rows alone.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{HistoryError, Result};
use crate::history::{sort_chronologically, ChatHistory, QaRecord};
use crate::traits::{HistoryStore, RecencyCache};

/// Read-side merge of recency cache and durable store
#[derive(Clone)]
pub struct HistoryReconciler {
    store: Arc<dyn HistoryStore>,
    cache: Arc<dyn RecencyCache>,
}

impl HistoryReconciler {
    pub fn new(store: Arc<dyn HistoryStore>, cache: Arc<dyn RecencyCache>) -> Self {
        Self { store, cache }
    }

    /// Deduplicated, time-ordered history of a document
    #[instrument(skip(self))]
    pub async fn history(&self, document_id: &str) -> Result<ChatHistory> {
        let chat = self
            .store
            .find_chat(document_id)
            .await?
            .ok_or_else(|| HistoryError::chat_not_found(document_id))?;

        let mut seen = HashSet::new();
        let mut merged = self.cached_records(document_id, &mut seen).await;
        let from_cache = merged.len();

        for record in self.store.list_records(chat.id).await? {
            if seen.insert(record.id) {
                merged.push(record);
            }
        }

        debug!(
            from_cache,
            from_store = merged.len() - from_cache,
            "History merged"
        );

        sort_chronologically(&mut merged);

        Ok(ChatHistory {
            chat_id: chat.id,
            document_name: chat.document_name,
            entries: merged.into_iter().map(Into::into).collect(),
        })
    }

    /// Cache entries oldest first, first occurrence of each id wins
    async fn cached_records(&self, document_id: &str, seen: &mut HashSet<Uuid>) -> Vec<QaRecord> {
        let raw = match self.cache.recent(document_id).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Recency cache unavailable, serving durable history only");
                return Vec::new();
            }
        };

        // The cache list is newest first
        raw.iter()
            .rev()
            .filter_map(|entry| match QaRecord::from_json(entry) {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!(error = %e, "Skipping unparseable cache entry");
                    None
                }
            })
            .filter(|record| seen.insert(record.id))
            .collect()
    }
}
