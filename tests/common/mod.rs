//! Shared in-memory collaborators for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use foldertalk::assistant::{
    AssistantApi, AssistantChatResponse, AssistantError, AssistantErrorReason,
    AssistantFileMetadata, AssistantService, AssistantTurn, RemoteAssistantFile,
};
use foldertalk::chat::{ChatOrchestrator, ChatSettings};
use foldertalk::completion::CompletionGateway;
use foldertalk::embedding::EmbeddingGateway;
use foldertalk::models::{FolderRecord, IndexStatus};
use foldertalk::sources::{DocumentSource, SourceFile};
use foldertalk::store::MetaStore;
use foldertalk::store_memory::InMemoryMetaStore;
use foldertalk::vector_index::VectorIndex;
use foldertalk::vector_store::memory::InMemoryVectorStore;

// ============ Embeddings ============

/// Deterministic embeddings: counts of a/b/c/d characters.
pub struct StubEmbeddings;

#[async_trait]
impl EmbeddingGateway for StubEmbeddings {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                vec![
                    t.matches('a').count() as f32 + 0.01,
                    t.matches('b').count() as f32,
                    t.matches('c').count() as f32,
                    t.matches('d').count() as f32,
                ]
            })
            .collect())
    }

    fn dims(&self) -> usize {
        4
    }
}

// ============ Completions ============

/// Records prompts and returns a canned answer.
pub struct MockCompletions {
    pub prompts: Mutex<Vec<String>>,
    pub response: String,
    pub fail: bool,
}

impl MockCompletions {
    pub fn answering(response: &str) -> Arc<Self> {
        Arc::new(Self {
            prompts: Mutex::new(Vec::new()),
            response: response.to_string(),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            prompts: Mutex::new(Vec::new()),
            response: String::new(),
            fail: true,
        })
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CompletionGateway for MockCompletions {
    async fn complete(&self, system_prompt: &str, _user_message: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(system_prompt.to_string());
        if self.fail {
            anyhow::bail!("completion backend unavailable");
        }
        Ok(self.response.clone())
    }
}

// ============ Assistant API ============

/// How the mock assistant answers chat calls.
#[derive(Debug, Clone)]
pub enum ChatBehavior {
    Succeed(String),
    FailTerms,
    FailService,
}

/// In-memory stand-in for the remote assistant service.
pub struct MockAssistantApi {
    pub created: Mutex<HashSet<String>>,
    pub chat_behavior: Mutex<ChatBehavior>,
    pub chat_calls: AtomicUsize,
    pub chat_turn_counts: Mutex<Vec<usize>>,
    pub files: Mutex<Vec<RemoteAssistantFile>>,
    pub deleted_file_ids: Mutex<Vec<String>>,
    /// Uploads whose file name contains this substring fail.
    pub fail_uploads_containing: Mutex<Option<String>>,
    /// When set, `list_files` fails (exercises best-effort cleanup).
    pub fail_listing: Mutex<bool>,
    next_file_id: AtomicUsize,
}

impl MockAssistantApi {
    pub fn new(behavior: ChatBehavior) -> Arc<Self> {
        Arc::new(Self {
            created: Mutex::new(HashSet::new()),
            chat_behavior: Mutex::new(behavior),
            chat_calls: AtomicUsize::new(0),
            chat_turn_counts: Mutex::new(Vec::new()),
            files: Mutex::new(Vec::new()),
            deleted_file_ids: Mutex::new(Vec::new()),
            fail_uploads_containing: Mutex::new(None),
            fail_listing: Mutex::new(false),
            next_file_id: AtomicUsize::new(1),
        })
    }

    pub fn uploaded_names(&self) -> Vec<String> {
        self.files
            .lock()
            .unwrap()
            .iter()
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn seed_remote_file(&self, folder_id: &str, name: &str) {
        let id = self.next_file_id.fetch_add(1, Ordering::SeqCst);
        self.files.lock().unwrap().push(RemoteAssistantFile {
            id: format!("remote-{}", id),
            name: name.to_string(),
            metadata: Some(AssistantFileMetadata {
                user_id: "u1".to_string(),
                folder_id: folder_id.to_string(),
                file_name: Some(name.to_string()),
                batch_file_name: None,
                included_files: None,
                file_count: None,
                uploaded_at: "2024-01-01T00:00:00Z".to_string(),
            }),
        });
    }
}

#[async_trait]
impl AssistantApi for MockAssistantApi {
    async fn describe_assistant(&self, name: &str) -> Result<(), AssistantError> {
        if self.created.lock().unwrap().contains(name) {
            Ok(())
        } else {
            Err(AssistantError::new(
                AssistantErrorReason::NotFound,
                format!("no assistant named {}", name),
            ))
        }
    }

    async fn create_assistant(
        &self,
        name: &str,
        _instructions: &str,
    ) -> Result<(), AssistantError> {
        self.created.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    async fn chat(
        &self,
        _name: &str,
        turns: &[AssistantTurn],
    ) -> Result<AssistantChatResponse, AssistantError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        self.chat_turn_counts.lock().unwrap().push(turns.len());

        match self.chat_behavior.lock().unwrap().clone() {
            ChatBehavior::Succeed(content) => Ok(AssistantChatResponse {
                content,
                usage: Some(serde_json::json!({ "total_tokens": 42 })),
            }),
            ChatBehavior::FailTerms => Err(AssistantError::new(
                AssistantErrorReason::TermsNotAccepted,
                "terms of service not accepted",
            )),
            ChatBehavior::FailService => Err(AssistantError::new(
                AssistantErrorReason::Service,
                "internal assistant failure",
            )),
        }
    }

    async fn upload_file(
        &self,
        _name: &str,
        path: &std::path::Path,
        file_name: &str,
        metadata: &AssistantFileMetadata,
    ) -> Result<(), AssistantError> {
        if let Some(needle) = self.fail_uploads_containing.lock().unwrap().as_ref() {
            if file_name.contains(needle.as_str()) {
                return Err(AssistantError::new(
                    AssistantErrorReason::Service,
                    "upload rejected",
                ));
            }
        }

        // The transient artifact must exist at upload time.
        assert!(path.exists(), "transient upload artifact missing");

        let id = self.next_file_id.fetch_add(1, Ordering::SeqCst);
        self.files.lock().unwrap().push(RemoteAssistantFile {
            id: format!("remote-{}", id),
            name: file_name.to_string(),
            metadata: Some(metadata.clone()),
        });
        Ok(())
    }

    async fn list_files(&self, _name: &str) -> Result<Vec<RemoteAssistantFile>, AssistantError> {
        if *self.fail_listing.lock().unwrap() {
            return Err(AssistantError::new(
                AssistantErrorReason::Service,
                "listing unavailable",
            ));
        }
        Ok(self.files.lock().unwrap().clone())
    }

    async fn delete_file(&self, _name: &str, file_id: &str) -> Result<(), AssistantError> {
        self.deleted_file_ids
            .lock()
            .unwrap()
            .push(file_id.to_string());
        self.files.lock().unwrap().retain(|f| f.id != file_id);
        Ok(())
    }
}

// ============ Document source ============

/// Scripted document source: fixed listing, per-file text or failure.
pub struct MockSource {
    pub files: Vec<SourceFile>,
    pub texts: HashMap<String, String>,
    pub failing: HashSet<String>,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            texts: HashMap::new(),
            failing: HashSet::new(),
        }
    }

    pub fn with_file(mut self, id: &str, name: &str, text: &str) -> Self {
        self.files.push(SourceFile {
            id: id.to_string(),
            name: name.to_string(),
            locator: name.to_string(),
            mime_type: "text/plain".to_string(),
        });
        self.texts.insert(id.to_string(), text.to_string());
        self
    }

    pub fn with_failing_file(mut self, id: &str, name: &str) -> Self {
        self.files.push(SourceFile {
            id: id.to_string(),
            name: name.to_string(),
            locator: name.to_string(),
            mime_type: "text/plain".to_string(),
        });
        self.failing.insert(id.to_string());
        self
    }
}

#[async_trait]
impl DocumentSource for MockSource {
    fn folder_name(&self, folder_id: &str) -> String {
        format!("Folder {}", folder_id)
    }

    async fn list_files(&self, _folder_id: &str) -> Result<Vec<SourceFile>> {
        Ok(self.files.clone())
    }

    async fn fetch_text(&self, file: &SourceFile) -> Result<String> {
        if self.failing.contains(&file.id) {
            anyhow::bail!("extraction failed for {}", file.name);
        }
        Ok(self.texts.get(&file.id).cloned().unwrap_or_default())
    }
}

// ============ Wiring helpers ============

pub const USER: &str = "u1";

pub struct Harness {
    pub store: Arc<InMemoryMetaStore>,
    pub vector_store: Arc<InMemoryVectorStore>,
    pub vector_index: Arc<VectorIndex>,
    pub assistant_api: Arc<MockAssistantApi>,
    pub assistant: Arc<AssistantService>,
    pub completions: Arc<MockCompletions>,
    pub orchestrator: Arc<ChatOrchestrator>,
}

pub fn harness(behavior: ChatBehavior, completions: Arc<MockCompletions>) -> Harness {
    harness_with_batch_limit(behavior, completions, 10 * 1024 * 1024)
}

pub fn harness_with_batch_limit(
    behavior: ChatBehavior,
    completions: Arc<MockCompletions>,
    max_batch_bytes: usize,
) -> Harness {
    let store = Arc::new(InMemoryMetaStore::new());
    let vector_store = Arc::new(InMemoryVectorStore::new());
    let vector_index = Arc::new(VectorIndex::new(
        vector_store.clone(),
        Arc::new(StubEmbeddings),
    ));
    let assistant_api = MockAssistantApi::new(behavior);
    let assistant = Arc::new(AssistantService::new(
        assistant_api.clone(),
        store.clone(),
        Duration::ZERO,
        max_batch_bytes,
    ));
    let orchestrator = Arc::new(ChatOrchestrator::new(
        store.clone(),
        vector_index.clone(),
        completions.clone(),
        assistant.clone(),
        USER.to_string(),
        ChatSettings::default(),
    ));

    Harness {
        store,
        vector_store,
        vector_index,
        assistant_api,
        assistant,
        completions,
        orchestrator,
    }
}

/// Register a folder for the test user and open its chat.
pub async fn seed_folder_and_chat(
    store: &Arc<InMemoryMetaStore>,
    folder_id: &str,
) -> foldertalk::models::ChatRecord {
    store
        .upsert_folder(&FolderRecord {
            id: folder_id.to_string(),
            name: format!("Folder {}", folder_id),
            user_id: USER.to_string(),
            index_status: IndexStatus::Pending,
            last_indexed: None,
        })
        .await
        .unwrap();
    store.get_or_create_chat(folder_id).await.unwrap()
}
