//! Core data models used throughout foldertalk.
//!
//! These types represent the chunks, vector metadata, chat turns, and
//! folder/file records that flow through the indexing and chat pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bounded slice of a document's text used as a retrieval unit.
///
/// Offsets are byte positions into the source text, snapped to UTF-8
/// character boundaries. `chunk_index` is the 0-based sequential position
/// within the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub content: String,
    pub start_index: usize,
    pub end_index: usize,
    pub chunk_index: i64,
}

/// Metadata stored alongside every chunk vector.
///
/// A closed struct rather than a free-form bag so that filter queries stay
/// type-checked end to end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub file_id: String,
    pub file_name: String,
    pub folder_id: String,
    pub folder_name: String,
    pub user_id: String,
    pub mime_type: String,
    pub chunk_index: i64,
    pub chunk_text: String,
    pub start_index: usize,
    pub end_index: usize,
}

/// A single similarity-search hit from the vector index.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

/// Source attribution attached to an assistant reply on the fallback path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub file_name: String,
    pub file_id: String,
    pub score: f32,
    pub chunk_index: i64,
}

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

/// A persisted chat turn. Citations are empty except for fallback replies.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub chat_id: String,
    pub role: MessageRole,
    pub content: String,
    pub citations: Vec<Citation>,
    pub created_at: DateTime<Utc>,
}

/// A chat session, 1:1 with a folder.
#[derive(Debug, Clone)]
pub struct ChatRecord {
    pub id: String,
    pub folder_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Folder-level indexing lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    Pending,
    Processing,
    Completed,
    Partial,
    Failed,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Pending => "pending",
            IndexStatus::Processing => "processing",
            IndexStatus::Completed => "completed",
            IndexStatus::Partial => "partial",
            IndexStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(IndexStatus::Pending),
            "processing" => Some(IndexStatus::Processing),
            "completed" => Some(IndexStatus::Completed),
            "partial" => Some(IndexStatus::Partial),
            "failed" => Some(IndexStatus::Failed),
            _ => None,
        }
    }
}

/// A registered folder and its indexing state.
#[derive(Debug, Clone)]
pub struct FolderRecord {
    pub id: String,
    pub name: String,
    pub user_id: String,
    pub index_status: IndexStatus,
    pub last_indexed: Option<DateTime<Utc>>,
}

/// A file within a registered folder.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: String,
    pub folder_id: String,
    pub name: String,
    pub mime_type: String,
    pub indexed: bool,
}

/// A file's extracted plain text, ready for chunking or batching.
#[derive(Debug, Clone)]
pub struct ExtractedFile {
    pub file_id: String,
    pub file_name: String,
    pub content: String,
}

/// Persisted managed-assistant identity, one per user.
#[derive(Debug, Clone)]
pub struct AssistantIdentity {
    pub user_id: String,
    pub assistant_name: String,
    pub created_at: DateTime<Utc>,
}
