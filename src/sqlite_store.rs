//! SQLite-backed [`MetaStore`] implementation.
//!
//! Maps each [`MetaStore`] operation to SQL against the schema created by
//! [`crate::migrate`]. Timestamps are stored as Unix milliseconds.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{
    AssistantIdentity, ChatMessage, ChatRecord, Citation, FileRecord, FolderRecord, IndexStatus,
    MessageRole,
};
use crate::store::MetaStore;

/// SQLite implementation of the [`MetaStore`] trait.
pub struct SqliteMetaStore {
    pool: SqlitePool,
}

impl SqliteMetaStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn ts_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn row_to_folder(row: &sqlx::sqlite::SqliteRow) -> FolderRecord {
    let status: String = row.get("index_status");
    let last_indexed: Option<i64> = row.get("last_indexed");
    FolderRecord {
        id: row.get("id"),
        name: row.get("name"),
        user_id: row.get("user_id"),
        index_status: IndexStatus::parse(&status).unwrap_or(IndexStatus::Pending),
        last_indexed: last_indexed.map(from_millis),
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> ChatMessage {
    let role: String = row.get("role");
    let citations_json: Option<String> = row.get("citations_json");
    let citations: Vec<Citation> = citations_json
        .and_then(|j| serde_json::from_str(&j).ok())
        .unwrap_or_default();
    ChatMessage {
        id: row.get("id"),
        chat_id: row.get("chat_id"),
        role: MessageRole::parse(&role).unwrap_or(MessageRole::User),
        content: row.get("content"),
        citations,
        created_at: from_millis(row.get("created_at")),
    }
}

#[async_trait]
impl MetaStore for SqliteMetaStore {
    async fn upsert_folder(&self, folder: &FolderRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO folders (id, name, user_id, index_status, last_indexed)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                user_id = excluded.user_id
            "#,
        )
        .bind(&folder.id)
        .bind(&folder.name)
        .bind(&folder.user_id)
        .bind(folder.index_status.as_str())
        .bind(folder.last_indexed.map(ts_millis))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_folder(&self, folder_id: &str) -> Result<Option<FolderRecord>> {
        let row = sqlx::query(
            "SELECT id, name, user_id, index_status, last_indexed FROM folders WHERE id = ?",
        )
        .bind(folder_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_folder))
    }

    async fn set_folder_status(
        &self,
        folder_id: &str,
        status: IndexStatus,
        last_indexed: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query("UPDATE folders SET index_status = ?, last_indexed = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(last_indexed.map(ts_millis))
            .bind(folder_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_file(&self, file: &FileRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO files (id, folder_id, name, mime_type, indexed)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                folder_id = excluded.folder_id,
                name = excluded.name,
                mime_type = excluded.mime_type
            "#,
        )
        .bind(&file.id)
        .bind(&file.folder_id)
        .bind(&file.name)
        .bind(&file.mime_type)
        .bind(file.indexed as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn files_in_folder(&self, folder_id: &str) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query(
            "SELECT id, folder_id, name, mime_type, indexed FROM files WHERE folder_id = ? ORDER BY id",
        )
        .bind(folder_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let indexed: i64 = row.get("indexed");
                FileRecord {
                    id: row.get("id"),
                    folder_id: row.get("folder_id"),
                    name: row.get("name"),
                    mime_type: row.get("mime_type"),
                    indexed: indexed != 0,
                }
            })
            .collect())
    }

    async fn set_file_indexed(&self, file_id: &str, indexed: bool) -> Result<()> {
        sqlx::query("UPDATE files SET indexed = ? WHERE id = ?")
            .bind(indexed as i64)
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_folder_file_flags(&self, folder_id: &str) -> Result<()> {
        sqlx::query("UPDATE files SET indexed = 0 WHERE folder_id = ?")
            .bind(folder_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn replace_file_chunks(&self, file_id: &str, chunk_indexes: &[i64]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM file_chunks WHERE file_id = ?")
            .bind(file_id)
            .execute(&mut *tx)
            .await?;

        for chunk_index in chunk_indexes {
            sqlx::query("INSERT INTO file_chunks (file_id, chunk_index) VALUES (?, ?)")
                .bind(file_id)
                .bind(chunk_index)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_or_create_chat(&self, folder_id: &str) -> Result<ChatRecord> {
        let now = ts_millis(Utc::now());

        // One chat per folder: the conflict target keeps the original id
        // and only bumps the access timestamp.
        sqlx::query(
            r#"
            INSERT INTO chats (id, folder_id, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(folder_id) DO UPDATE SET updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(folder_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT id, folder_id, created_at, updated_at FROM chats WHERE folder_id = ?",
        )
        .bind(folder_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(ChatRecord {
            id: row.get("id"),
            folder_id: row.get("folder_id"),
            created_at: from_millis(row.get("created_at")),
            updated_at: from_millis(row.get("updated_at")),
        })
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Option<ChatRecord>> {
        let row =
            sqlx::query("SELECT id, folder_id, created_at, updated_at FROM chats WHERE id = ?")
                .bind(chat_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|row| ChatRecord {
            id: row.get("id"),
            folder_id: row.get("folder_id"),
            created_at: from_millis(row.get("created_at")),
            updated_at: from_millis(row.get("updated_at")),
        }))
    }

    async fn touch_chat(&self, chat_id: &str) -> Result<()> {
        sqlx::query("UPDATE chats SET updated_at = ? WHERE id = ?")
            .bind(ts_millis(Utc::now()))
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM messages WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM chats WHERE id = ?")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_message(
        &self,
        chat_id: &str,
        role: MessageRole,
        content: &str,
        citations: &[Citation],
    ) -> Result<ChatMessage> {
        // Force a timestamp strictly later than any prior message in this
        // chat so persisted ordering matches protocol ordering.
        let prior_max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(created_at) FROM messages WHERE chat_id = ?")
                .bind(chat_id)
                .fetch_one(&self.pool)
                .await?;

        let now = ts_millis(Utc::now());
        let created_at = match prior_max {
            Some(max) if now <= max => max + 1,
            _ => now,
        };

        let citations_json = if citations.is_empty() {
            None
        } else {
            Some(serde_json::to_string(citations)?)
        };

        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            role,
            content: content.to_string(),
            citations: citations.to_vec(),
            created_at: from_millis(created_at),
        };

        sqlx::query(
            r#"
            INSERT INTO messages (id, chat_id, role, content, citations_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(chat_id)
        .bind(role.as_str())
        .bind(content)
        .bind(&citations_json)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(message)
    }

    async fn recent_messages(&self, chat_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, chat_id, role, content, citations_json, created_at
            FROM messages
            WHERE chat_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(chat_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut messages: Vec<ChatMessage> = rows.iter().map(row_to_message).collect();
        messages.reverse();
        Ok(messages)
    }

    async fn get_assistant_identity(&self, user_id: &str) -> Result<Option<AssistantIdentity>> {
        let row = sqlx::query(
            "SELECT user_id, assistant_name, created_at FROM assistants WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| AssistantIdentity {
            user_id: row.get("user_id"),
            assistant_name: row.get("assistant_name"),
            created_at: from_millis(row.get("created_at")),
        }))
    }

    async fn ensure_assistant_identity(
        &self,
        user_id: &str,
        assistant_name: &str,
    ) -> Result<AssistantIdentity> {
        // Conditional insert: first writer wins, everyone reads back the
        // same row. This closes the create-if-absent race.
        sqlx::query(
            r#"
            INSERT INTO assistants (user_id, assistant_name, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(assistant_name)
        .bind(ts_millis(Utc::now()))
        .execute(&self.pool)
        .await?;

        self.get_assistant_identity(user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("assistant identity missing after insert"))
    }
}
