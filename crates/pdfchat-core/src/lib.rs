// PDF Chat Q&A History Pipeline
//
// This crate provides a storage-agnostic implementation of the Q&A history
// ingest and reconcile path:
// queue event → recency cache + staging buffer → timed batch commit → durable rows
//
// Key design decisions:
// - Uses traits (HistoryStore, RecencyCache, DeadLetterStore) for pluggable backends
// - One transaction per batch; events of unknown documents are skipped, any other
//   failure aborts the batch and hands it to the dead-letter store
// - Reads merge the recency cache with durable rows, deduplicated by event id
// - The staging buffer is shared explicitly (Arc), never via globals

pub mod buffer;
pub mod chat;
pub mod committer;
pub mod error;
pub mod event;
pub mod history;
pub mod ingest;
pub mod reconciler;
pub mod traits;

// Telemetry (tracing-subscriber with env filter)
pub mod telemetry;

// In-memory implementations for examples and testing
pub mod memory;

// Re-exports for convenience
pub use buffer::StagingBuffer;
pub use chat::Chat;
pub use committer::{BatchCommitter, CommitterConfig, FlushOutcome, ReplayReport};
pub use error::{HistoryError, Result};
pub use event::QaEvent;
pub use history::{
    parse_time_of_day, parse_timestamp, sort_chronologically, ChatHistory, HistoryEntry, QaRecord,
    TimestampKey,
};
pub use ingest::{Disposition, Ingestor};
pub use reconciler::HistoryReconciler;
pub use traits::{BatchTransaction, DeadLetter, DeadLetterStore, HistoryStore, RecencyCache};
