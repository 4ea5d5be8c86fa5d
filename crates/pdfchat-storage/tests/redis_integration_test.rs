//! Integration tests for RedisRecencyCache
//!
//! Run with: cargo test -p pdfchat-storage --test redis_integration_test -- --ignored
//!
//! Requirements:
//! - Redis running with REDIS_URL set or redis://localhost:6379

use std::time::Duration;

use uuid::Uuid;

use pdfchat_core::traits::RecencyCache;
use pdfchat_core::{QaEvent, QaRecord};
use pdfchat_storage::{init_redis, RedisRecencyCache};

fn get_redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

async fn create_test_cache(max_entries: usize) -> RedisRecencyCache {
    let connection = init_redis(&get_redis_url())
        .await
        .expect("Failed to connect to Redis. Set REDIS_URL or ensure redis is running.");
    RedisRecencyCache::new(connection, Duration::from_secs(60), max_entries)
}

fn record(document_id: &str, question: &str) -> QaRecord {
    QaEvent::new(document_id, question, "a", "2024-05-01T10:00:00Z").to_record()
}

#[tokio::test]
#[ignore]
async fn test_push_is_newest_first_and_trimmed() {
    let cache = create_test_cache(2).await;
    let document_id = format!("doc-{}", Uuid::now_v7());

    for q in ["q1", "q2", "q3"] {
        cache.push(&document_id, &record(&document_id, q)).await.unwrap();
    }

    let entries = cache.recent(&document_id).await.unwrap();
    let questions: Vec<_> = entries
        .iter()
        .map(|raw| QaRecord::from_json(raw).unwrap().question)
        .collect();
    assert_eq!(questions, vec!["q3", "q2"]);
}

#[tokio::test]
#[ignore]
async fn test_unknown_document_is_empty() {
    let cache = create_test_cache(10).await;
    let entries = cache
        .recent(&format!("doc-{}", Uuid::now_v7()))
        .await
        .unwrap();
    assert!(entries.is_empty());
}
