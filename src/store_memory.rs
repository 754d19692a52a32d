//! In-memory [`MetaStore`] implementation for testing.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Message
//! timestamps are forced strictly monotonic per store so ordering
//! assertions hold even within one millisecond.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::{
    AssistantIdentity, ChatMessage, ChatRecord, Citation, FileRecord, FolderRecord, IndexStatus,
    MessageRole,
};
use crate::store::MetaStore;

/// In-memory metadata store for tests.
pub struct InMemoryMetaStore {
    folders: RwLock<HashMap<String, FolderRecord>>,
    files: RwLock<HashMap<String, FileRecord>>,
    chunks: RwLock<HashMap<String, Vec<i64>>>,
    chats: RwLock<HashMap<String, ChatRecord>>,
    messages: RwLock<Vec<ChatMessage>>,
    assistants: RwLock<HashMap<String, AssistantIdentity>>,
    last_message_at: RwLock<DateTime<Utc>>,
}

impl InMemoryMetaStore {
    pub fn new() -> Self {
        Self {
            folders: RwLock::new(HashMap::new()),
            files: RwLock::new(HashMap::new()),
            chunks: RwLock::new(HashMap::new()),
            chats: RwLock::new(HashMap::new()),
            messages: RwLock::new(Vec::new()),
            assistants: RwLock::new(HashMap::new()),
            last_message_at: RwLock::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    /// All messages of a chat in insertion order (test helper).
    pub fn messages_for(&self, chat_id: &str) -> Vec<ChatMessage> {
        self.messages
            .read()
            .unwrap()
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect()
    }

    /// Recorded chunk positions for a file (test helper).
    pub fn chunks_for(&self, file_id: &str) -> Vec<i64> {
        self.chunks
            .read()
            .unwrap()
            .get(file_id)
            .cloned()
            .unwrap_or_default()
    }

    fn next_message_timestamp(&self) -> DateTime<Utc> {
        let mut last = self.last_message_at.write().unwrap();
        let now = Utc::now();
        let ts = if now > *last {
            now
        } else {
            *last + Duration::milliseconds(1)
        };
        *last = ts;
        ts
    }
}

impl Default for InMemoryMetaStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetaStore for InMemoryMetaStore {
    async fn upsert_folder(&self, folder: &FolderRecord) -> Result<()> {
        let mut folders = self.folders.write().unwrap();
        // Upsert refreshes identity fields; indexing state is preserved.
        let mut record = folder.clone();
        if let Some(existing) = folders.get(&folder.id) {
            record.index_status = existing.index_status;
            record.last_indexed = existing.last_indexed;
        }
        folders.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get_folder(&self, folder_id: &str) -> Result<Option<FolderRecord>> {
        Ok(self.folders.read().unwrap().get(folder_id).cloned())
    }

    async fn set_folder_status(
        &self,
        folder_id: &str,
        status: IndexStatus,
        last_indexed: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if let Some(folder) = self.folders.write().unwrap().get_mut(folder_id) {
            folder.index_status = status;
            folder.last_indexed = last_indexed;
        }
        Ok(())
    }

    async fn upsert_file(&self, file: &FileRecord) -> Result<()> {
        let mut files = self.files.write().unwrap();
        let mut record = file.clone();
        if let Some(existing) = files.get(&file.id) {
            record.indexed = existing.indexed;
        }
        files.insert(record.id.clone(), record);
        Ok(())
    }

    async fn files_in_folder(&self, folder_id: &str) -> Result<Vec<FileRecord>> {
        let mut files: Vec<FileRecord> = self
            .files
            .read()
            .unwrap()
            .values()
            .filter(|f| f.folder_id == folder_id)
            .cloned()
            .collect();
        files.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(files)
    }

    async fn set_file_indexed(&self, file_id: &str, indexed: bool) -> Result<()> {
        if let Some(file) = self.files.write().unwrap().get_mut(file_id) {
            file.indexed = indexed;
        }
        Ok(())
    }

    async fn clear_folder_file_flags(&self, folder_id: &str) -> Result<()> {
        for file in self.files.write().unwrap().values_mut() {
            if file.folder_id == folder_id {
                file.indexed = false;
            }
        }
        Ok(())
    }

    async fn replace_file_chunks(&self, file_id: &str, chunk_indexes: &[i64]) -> Result<()> {
        self.chunks
            .write()
            .unwrap()
            .insert(file_id.to_string(), chunk_indexes.to_vec());
        Ok(())
    }

    async fn get_or_create_chat(&self, folder_id: &str) -> Result<ChatRecord> {
        let mut chats = self.chats.write().unwrap();
        if let Some(existing) = chats.values_mut().find(|c| c.folder_id == folder_id) {
            existing.updated_at = Utc::now();
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let chat = ChatRecord {
            id: Uuid::new_v4().to_string(),
            folder_id: folder_id.to_string(),
            created_at: now,
            updated_at: now,
        };
        chats.insert(chat.id.clone(), chat.clone());
        Ok(chat)
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Option<ChatRecord>> {
        Ok(self.chats.read().unwrap().get(chat_id).cloned())
    }

    async fn touch_chat(&self, chat_id: &str) -> Result<()> {
        if let Some(chat) = self.chats.write().unwrap().get_mut(chat_id) {
            chat.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        self.messages
            .write()
            .unwrap()
            .retain(|m| m.chat_id != chat_id);
        self.chats.write().unwrap().remove(chat_id);
        Ok(())
    }

    async fn append_message(
        &self,
        chat_id: &str,
        role: MessageRole,
        content: &str,
        citations: &[Citation],
    ) -> Result<ChatMessage> {
        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            role,
            content: content.to_string(),
            citations: citations.to_vec(),
            created_at: self.next_message_timestamp(),
        };
        self.messages.write().unwrap().push(message.clone());
        Ok(message)
    }

    async fn recent_messages(&self, chat_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        let messages = self.messages.read().unwrap();
        let mut all: Vec<ChatMessage> = messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect();
        all.sort_by_key(|m| m.created_at);
        let skip = all.len().saturating_sub(limit);
        Ok(all.into_iter().skip(skip).collect())
    }

    async fn get_assistant_identity(&self, user_id: &str) -> Result<Option<AssistantIdentity>> {
        Ok(self.assistants.read().unwrap().get(user_id).cloned())
    }

    async fn ensure_assistant_identity(
        &self,
        user_id: &str,
        assistant_name: &str,
    ) -> Result<AssistantIdentity> {
        let mut assistants = self.assistants.write().unwrap();
        let identity = assistants
            .entry(user_id.to_string())
            .or_insert_with(|| AssistantIdentity {
                user_id: user_id.to_string(),
                assistant_name: assistant_name.to_string(),
                created_at: Utc::now(),
            });
        Ok(identity.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chat_is_one_per_folder() {
        let store = InMemoryMetaStore::new();
        let a = store.get_or_create_chat("d1").await.unwrap();
        let b = store.get_or_create_chat("d1").await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_message_timestamps_strictly_increase() {
        let store = InMemoryMetaStore::new();
        let chat = store.get_or_create_chat("d1").await.unwrap();
        let m1 = store
            .append_message(&chat.id, MessageRole::User, "one", &[])
            .await
            .unwrap();
        let m2 = store
            .append_message(&chat.id, MessageRole::Assistant, "two", &[])
            .await
            .unwrap();
        assert!(m1.created_at < m2.created_at);
    }

    #[tokio::test]
    async fn test_recent_messages_takes_last_n_oldest_first() {
        let store = InMemoryMetaStore::new();
        let chat = store.get_or_create_chat("d1").await.unwrap();
        for i in 0..5 {
            store
                .append_message(&chat.id, MessageRole::User, &format!("m{}", i), &[])
                .await
                .unwrap();
        }
        let recent = store.recent_messages(&chat.id, 3).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_ensure_assistant_identity_is_conditional() {
        let store = InMemoryMetaStore::new();
        let first = store
            .ensure_assistant_identity("u1", "assistant-user-u1")
            .await
            .unwrap();
        let second = store
            .ensure_assistant_identity("u1", "some-other-name")
            .await
            .unwrap();
        assert_eq!(first.assistant_name, second.assistant_name);
    }
}
