// Postgres / Redis storage layer
//
// This crate provides production implementations for core traits:
// - DbHistoryStore: implements HistoryStore (chats, qa_histories)
// - DbDeadLetterStore: implements DeadLetterStore (qa_dead_letters)
// - RedisRecencyCache: implements RecencyCache (chat_history_temp:{doc_id})

pub mod dead_letter_store;
pub mod history_store;
pub mod models;
pub mod recency_cache;
pub mod repositories;

pub use dead_letter_store::{create_db_dead_letter_store, DbDeadLetterStore};
pub use history_store::{create_db_history_store, DbHistoryStore};
pub use models::*;
pub use recency_cache::{cache_key, init_redis, RedisRecencyCache};
pub use repositories::*;
