// Error types for the Q&A history pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, HistoryError>;

/// Errors that can occur while ingesting, committing or reading Q&A history
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Durable store error (query, transaction or connection failure)
    #[error("History store error: {0}")]
    Store(String),

    /// Recency cache error
    #[error("Recency cache error: {0}")]
    Cache(String),

    /// Dead-letter store error
    #[error("Dead-letter store error: {0}")]
    DeadLetter(String),

    /// Message queue error
    #[error("Queue error: {0}")]
    Queue(String),

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No chat exists for the given document
    #[error("Chat not found for document: {0}")]
    ChatNotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl HistoryError {
    /// Create a durable store error
    pub fn store(msg: impl Into<String>) -> Self {
        HistoryError::Store(msg.into())
    }

    /// Create a recency cache error
    pub fn cache(msg: impl Into<String>) -> Self {
        HistoryError::Cache(msg.into())
    }

    /// Create a dead-letter store error
    pub fn dead_letter(msg: impl Into<String>) -> Self {
        HistoryError::DeadLetter(msg.into())
    }

    /// Create a queue error
    pub fn queue(msg: impl Into<String>) -> Self {
        HistoryError::Queue(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        HistoryError::Configuration(msg.into())
    }

    /// Create a chat not found error
    pub fn chat_not_found(document_id: impl Into<String>) -> Self {
        HistoryError::ChatNotFound(document_id.into())
    }
}
