//! Metadata storage abstraction.
//!
//! The [`MetaStore`] trait covers the relational state the pipeline
//! consumes: folders and their indexing status, files and their indexed
//! flags, chats and messages, and the per-user assistant identity.
//! Implementations must be `Send + Sync` to work with async runtimes.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    AssistantIdentity, ChatMessage, ChatRecord, Citation, FileRecord, FolderRecord, IndexStatus,
    MessageRole,
};

/// Abstract metadata backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_folder`](MetaStore::upsert_folder) | Register or refresh a folder |
/// | [`get_folder`](MetaStore::get_folder) | Fetch a folder with its status |
/// | [`set_folder_status`](MetaStore::set_folder_status) | Persist a status transition |
/// | [`upsert_file`](MetaStore::upsert_file) | Register or refresh a file |
/// | [`files_in_folder`](MetaStore::files_in_folder) | List a folder's files |
/// | [`set_file_indexed`](MetaStore::set_file_indexed) | Flip one file's indexed flag |
/// | [`clear_folder_file_flags`](MetaStore::clear_folder_file_flags) | Un-index every file in a folder |
/// | [`replace_file_chunks`](MetaStore::replace_file_chunks) | Record a file's chunk positions |
/// | [`get_or_create_chat`](MetaStore::get_or_create_chat) | The 1:1 folder chat, touched on access |
/// | [`get_chat`](MetaStore::get_chat) | Fetch a chat by id |
/// | [`touch_chat`](MetaStore::touch_chat) | Bump a chat's updated_at |
/// | [`delete_chat`](MetaStore::delete_chat) | Remove a chat and its messages |
/// | [`append_message`](MetaStore::append_message) | Persist the next chat turn |
/// | [`recent_messages`](MetaStore::recent_messages) | Last N messages, oldest first |
/// | [`get_assistant_identity`](MetaStore::get_assistant_identity) | Look up the user's assistant |
/// | [`ensure_assistant_identity`](MetaStore::ensure_assistant_identity) | Conditional-insert the identity |
#[async_trait]
pub trait MetaStore: Send + Sync {
    async fn upsert_folder(&self, folder: &FolderRecord) -> Result<()>;

    async fn get_folder(&self, folder_id: &str) -> Result<Option<FolderRecord>>;

    /// Persist a folder status transition. `last_indexed = None` clears
    /// the stamp.
    async fn set_folder_status(
        &self,
        folder_id: &str,
        status: IndexStatus,
        last_indexed: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn upsert_file(&self, file: &FileRecord) -> Result<()>;

    async fn files_in_folder(&self, folder_id: &str) -> Result<Vec<FileRecord>>;

    async fn set_file_indexed(&self, file_id: &str, indexed: bool) -> Result<()>;

    async fn clear_folder_file_flags(&self, folder_id: &str) -> Result<()>;

    /// Replace the recorded chunk positions for a file (content stays in
    /// the vector store).
    async fn replace_file_chunks(&self, file_id: &str, chunk_indexes: &[i64]) -> Result<()>;

    async fn get_or_create_chat(&self, folder_id: &str) -> Result<ChatRecord>;

    async fn get_chat(&self, chat_id: &str) -> Result<Option<ChatRecord>>;

    async fn touch_chat(&self, chat_id: &str) -> Result<()>;

    async fn delete_chat(&self, chat_id: &str) -> Result<()>;

    /// Append a message to a chat. The store assigns the id and a
    /// creation timestamp strictly later than any prior message in the
    /// same chat.
    async fn append_message(
        &self,
        chat_id: &str,
        role: MessageRole,
        content: &str,
        citations: &[Citation],
    ) -> Result<ChatMessage>;

    /// The last `limit` messages of a chat, oldest first.
    async fn recent_messages(&self, chat_id: &str, limit: usize) -> Result<Vec<ChatMessage>>;

    async fn get_assistant_identity(&self, user_id: &str) -> Result<Option<AssistantIdentity>>;

    /// Conditional insert: persist `(user_id, assistant_name)` only if no
    /// identity exists yet, then return whatever is persisted. Two
    /// concurrent first-time callers converge on one row.
    async fn ensure_assistant_identity(
        &self,
        user_id: &str,
        assistant_name: &str,
    ) -> Result<AssistantIdentity>;
}
