//! # Redis recency cache
//!
//! Short-lived, per-document view of exchanges the batch committer has not
//! written yet.
//!
//! ## Layout
//!
//! - One list per document: `chat_history_temp:{document_id}`
//! - Entries are JSON `{"id","question","answer","timestamp"}`, newest at the head
//! - Each push runs `LPUSH`, `LTRIM` and `EXPIRE` in one atomic pipeline, so
//!   the list stays bounded and idle documents expire
//! - Reads return the whole list (`LRANGE 0 -1`)
use std::time::Duration;

use async_trait::async_trait;
use pdfchat_core::traits::RecencyCache;
use pdfchat_core::{HistoryError, QaRecord, Result};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

/// Key prefix of the per-document lists
pub const KEY_PREFIX: &str = "chat_history_temp";

/// Redis list key for a document
pub fn cache_key(document_id: &str) -> String {
    format!("{}:{}", KEY_PREFIX, document_id)
}

/// Open a managed (auto-reconnecting) Redis connection
pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager> {
    let client = Client::open(redis_url).map_err(|e| HistoryError::config(e.to_string()))?;
    client
        .get_connection_manager()
        .await
        .map_err(|e| HistoryError::cache(e.to_string()))
}

/// Redis-backed recency cache
#[derive(Clone)]
pub struct RedisRecencyCache {
    connection: ConnectionManager,
    ttl: Duration,
    max_entries: usize,
}

impl RedisRecencyCache {
    /// `ttl` is rounded to whole seconds, at least one; `EXPIRE 0` would
    /// delete the list on every push.
    pub fn new(connection: ConnectionManager, ttl: Duration, max_entries: usize) -> Self {
        Self {
            connection,
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    fn expire_secs(&self) -> i64 {
        expire_secs(self.ttl)
    }
}

fn expire_secs(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX).max(1)
}

#[async_trait]
impl RecencyCache for RedisRecencyCache {
    async fn push(&self, document_id: &str, record: &QaRecord) -> Result<()> {
        let key = cache_key(document_id);
        let raw = record.to_json()?;
        let mut connection = self.connection.clone();

        let _: () = redis::pipe()
            .atomic()
            .lpush(&key, raw)
            .ignore()
            .ltrim(&key, 0, self.max_entries as isize - 1)
            .ignore()
            .expire(&key, self.expire_secs())
            .ignore()
            .query_async(&mut connection)
            .await
            .map_err(|e| HistoryError::cache(e.to_string()))?;

        Ok(())
    }

    async fn recent(&self, document_id: &str) -> Result<Vec<String>> {
        let mut connection = self.connection.clone();
        connection
            .lrange(cache_key(document_id), 0, -1)
            .await
            .map_err(|e| HistoryError::cache(e.to_string()))
    }
}
