// Chat entity (owned by the API service, read-only here)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat created when a user uploads a document.
///
/// Q&A rows reference the chat, not the document, so every durable write
/// resolves `document_id -> chat.id` first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_id: String,
    /// Display name of the uploaded document
    pub document_name: String,
    pub created_at: DateTime<Utc>,
}
