//! Integration tests for the SQLite metadata store.

use std::path::PathBuf;

use foldertalk::config::{
    AccountConfig, AssistantConfig, BatchConfig, ChunkingConfig, CompletionConfig, Config,
    DbConfig, EmbeddingConfig, IndexingConfig, RetrievalConfig, ServerConfig,
};
use foldertalk::models::{Citation, FolderRecord, IndexStatus, MessageRole};
use foldertalk::sqlite_store::SqliteMetaStore;
use foldertalk::store::MetaStore;
use foldertalk::{db, migrate};

fn test_config(db_path: PathBuf) -> Config {
    Config {
        account: AccountConfig {
            user_id: "u1".to_string(),
        },
        db: DbConfig { path: db_path },
        chunking: ChunkingConfig::default(),
        retrieval: RetrievalConfig::default(),
        embedding: EmbeddingConfig::default(),
        completion: CompletionConfig::default(),
        vector: None,
        assistant: AssistantConfig::default(),
        batch: BatchConfig::default(),
        indexing: IndexingConfig::default(),
        server: ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        },
        source: None,
    }
}

async fn open_store(tmp: &tempfile::TempDir) -> SqliteMetaStore {
    let cfg = test_config(tmp.path().join("ftalk.sqlite"));
    migrate::run_migrations(&cfg).await.unwrap();
    // Migrations are idempotent.
    migrate::run_migrations(&cfg).await.unwrap();
    let pool = db::connect(&cfg).await.unwrap();
    SqliteMetaStore::new(pool)
}

async fn seed_folder(store: &SqliteMetaStore, folder_id: &str) {
    store
        .upsert_folder(&FolderRecord {
            id: folder_id.to_string(),
            name: "Reports".to_string(),
            user_id: "u1".to_string(),
            index_status: IndexStatus::Pending,
            last_indexed: None,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn chat_is_one_per_folder_and_survives_reopen() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    seed_folder(&store, "d1").await;

    let first = store.get_or_create_chat("d1").await.unwrap();
    let second = store.get_or_create_chat("d1").await.unwrap();
    assert_eq!(first.id, second.id);
    assert!(second.updated_at >= first.updated_at);
}

#[tokio::test]
async fn message_timestamps_are_strictly_increasing() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    seed_folder(&store, "d1").await;
    let chat = store.get_or_create_chat("d1").await.unwrap();

    let user = store
        .append_message(&chat.id, MessageRole::User, "question", &[])
        .await
        .unwrap();
    let reply = store
        .append_message(&chat.id, MessageRole::Assistant, "answer", &[])
        .await
        .unwrap();
    assert!(user.created_at < reply.created_at);

    let recent = store.recent_messages(&chat.id, 10).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].role, MessageRole::User);
    assert_eq!(recent[1].role, MessageRole::Assistant);
}

#[tokio::test]
async fn citations_round_trip_through_json_column() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    seed_folder(&store, "d1").await;
    let chat = store.get_or_create_chat("d1").await.unwrap();

    let citations = vec![Citation {
        file_name: "a.txt".to_string(),
        file_id: "f1".to_string(),
        score: 0.92,
        chunk_index: 3,
    }];
    store
        .append_message(&chat.id, MessageRole::Assistant, "grounded", &citations)
        .await
        .unwrap();

    let recent = store.recent_messages(&chat.id, 10).await.unwrap();
    assert_eq!(recent[0].citations, citations);
}

#[tokio::test]
async fn recent_messages_returns_last_n_oldest_first() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    seed_folder(&store, "d1").await;
    let chat = store.get_or_create_chat("d1").await.unwrap();

    for i in 0..6 {
        store
            .append_message(&chat.id, MessageRole::User, &format!("m{}", i), &[])
            .await
            .unwrap();
    }

    let recent = store.recent_messages(&chat.id, 4).await.unwrap();
    let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["m2", "m3", "m4", "m5"]);
}

#[tokio::test]
async fn assistant_identity_insert_is_conditional() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let first = store
        .ensure_assistant_identity("u1", "assistant-user-u1")
        .await
        .unwrap();
    let second = store
        .ensure_assistant_identity("u1", "assistant-user-u1-other")
        .await
        .unwrap();
    assert_eq!(first.assistant_name, second.assistant_name);
    assert_eq!(second.assistant_name, "assistant-user-u1");
}

#[tokio::test]
async fn folder_status_and_flags_round_trip() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    seed_folder(&store, "d1").await;

    store
        .upsert_file(&foldertalk::models::FileRecord {
            id: "f1".to_string(),
            folder_id: "d1".to_string(),
            name: "a.txt".to_string(),
            mime_type: "text/plain".to_string(),
            indexed: false,
        })
        .await
        .unwrap();
    store.set_file_indexed("f1", true).await.unwrap();

    store
        .set_folder_status("d1", IndexStatus::Completed, Some(chrono::Utc::now()))
        .await
        .unwrap();

    let folder = store.get_folder("d1").await.unwrap().unwrap();
    assert_eq!(folder.index_status, IndexStatus::Completed);
    assert!(folder.last_indexed.is_some());

    // Reset path: pending, stamp cleared, files unmarked.
    store
        .set_folder_status("d1", IndexStatus::Pending, None)
        .await
        .unwrap();
    store.clear_folder_file_flags("d1").await.unwrap();

    let folder = store.get_folder("d1").await.unwrap().unwrap();
    assert_eq!(folder.index_status, IndexStatus::Pending);
    assert!(folder.last_indexed.is_none());

    let files = store.files_in_folder("d1").await.unwrap();
    assert!(files.iter().all(|f| !f.indexed));
}
