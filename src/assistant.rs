//! Managed document-assistant client.
//!
//! Wraps the remote assistant service behind two layers:
//! - **[`AssistantApi`]** — the raw remote operations (describe, create,
//!   chat, upload/list/delete files), implemented by
//!   [`PineconeAssistantApi`] over the service's REST API.
//! - **[`AssistantService`]** — the lifecycle logic the pipeline uses:
//!   one persisted assistant per user (created lazily, guarded by a
//!   conditional insert), transient-file uploads, batched uploads, and
//!   chat with history.
//!
//! Failures carry a structured [`AssistantErrorReason`] populated from the
//! service's error code, so callers branch on an enum — never on message
//! text. The orchestrator uses `TermsNotAccepted` to decide whether the
//! vector-search fallback applies.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::batch::{pack_batches, BatchUploadOutcome, UploadStatus};
use crate::config::AssistantConfig;
use crate::models::{ChatMessage, ExtractedFile, MessageRole};
use crate::store::MetaStore;

/// Why an assistant operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantErrorReason {
    /// The account has not accepted the service's terms — the one failure
    /// the chat orchestrator recovers from via the fallback path.
    TermsNotAccepted,
    /// The named assistant or file does not exist.
    NotFound,
    /// The service rejected the request for rate reasons.
    RateLimited,
    /// Any other service-side failure.
    Service,
    /// The request never reached the service.
    Network,
}

/// Typed assistant failure (no panic; callers branch on `reason`).
#[derive(Debug)]
pub struct AssistantError {
    pub reason: AssistantErrorReason,
    pub message: String,
}

impl AssistantError {
    pub fn new(reason: AssistantErrorReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for AssistantError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.reason {
            AssistantErrorReason::TermsNotAccepted => {
                write!(f, "assistant terms not accepted: {}", self.message)
            }
            AssistantErrorReason::NotFound => write!(f, "assistant not found: {}", self.message),
            AssistantErrorReason::RateLimited => write!(f, "assistant rate limited: {}", self.message),
            AssistantErrorReason::Service => write!(f, "assistant service error: {}", self.message),
            AssistantErrorReason::Network => write!(f, "assistant network error: {}", self.message),
        }
    }
}

impl std::error::Error for AssistantError {}

/// A role-tagged turn sent to the assistant chat endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AssistantTurn {
    pub role: MessageRole,
    pub content: String,
}

/// Raw response from the assistant chat endpoint.
#[derive(Debug, Clone)]
pub struct AssistantChatResponse {
    pub content: String,
    pub usage: Option<serde_json::Value>,
}

/// Metadata attached to every uploaded assistant file.
///
/// Closed struct with explicit optional fields: single-file uploads carry
/// `file_name`, batched uploads carry `batch_file_name`, `included_files`,
/// and `file_count`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssistantFileMetadata {
    pub user_id: String,
    pub folder_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_file_name: Option<String>,
    /// Serialized list of the file names included in a batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub included_files: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_count: Option<usize>,
    pub uploaded_at: String,
}

/// A file as listed by the remote assistant.
#[derive(Debug, Clone)]
pub struct RemoteAssistantFile {
    pub id: String,
    pub name: String,
    pub metadata: Option<AssistantFileMetadata>,
}

/// Raw remote assistant operations.
#[async_trait]
pub trait AssistantApi: Send + Sync {
    /// Check that the named assistant exists.
    async fn describe_assistant(&self, name: &str) -> Result<(), AssistantError>;

    /// Create the named assistant with a system instruction.
    async fn create_assistant(&self, name: &str, instructions: &str)
        -> Result<(), AssistantError>;

    /// Send a message list and return the reply.
    async fn chat(
        &self,
        name: &str,
        turns: &[AssistantTurn],
    ) -> Result<AssistantChatResponse, AssistantError>;

    /// Upload a file artifact with metadata.
    async fn upload_file(
        &self,
        name: &str,
        path: &Path,
        file_name: &str,
        metadata: &AssistantFileMetadata,
    ) -> Result<(), AssistantError>;

    /// List all files uploaded to the named assistant.
    async fn list_files(&self, name: &str) -> Result<Vec<RemoteAssistantFile>, AssistantError>;

    /// Delete one uploaded file by id.
    async fn delete_file(&self, name: &str, file_id: &str) -> Result<(), AssistantError>;
}

// ============ Pinecone Assistant API ============

/// [`AssistantApi`] implementation over the Pinecone Assistant REST API.
///
/// Control-plane calls (describe/create) go to `api_host`; data-plane
/// calls (chat/files) go to `data_host`. Requires `PINECONE_API_KEY`.
pub struct PineconeAssistantApi {
    api_host: String,
    data_host: String,
    timeout_secs: u64,
}

impl PineconeAssistantApi {
    pub fn new(config: &AssistantConfig) -> Result<Self> {
        if std::env::var("PINECONE_API_KEY").is_err() {
            anyhow::bail!("PINECONE_API_KEY environment variable not set");
        }

        Ok(Self {
            api_host: config.api_host.trim_end_matches('/').to_string(),
            data_host: config.data_host.trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn client(&self) -> Result<reqwest::Client, AssistantError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| AssistantError::new(AssistantErrorReason::Network, e.to_string()))
    }

    fn api_key(&self) -> Result<String, AssistantError> {
        std::env::var("PINECONE_API_KEY").map_err(|_| {
            AssistantError::new(AssistantErrorReason::Network, "PINECONE_API_KEY not set")
        })
    }

    /// Turn a failed response into a typed error using the service's
    /// structured error code, falling back to the HTTP status class.
    async fn classify_failure(response: reqwest::Response) -> AssistantError {
        let status = response.status();
        let body: serde_json::Value = response.json().await.unwrap_or(serde_json::json!({}));
        let code = body
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|c| c.as_str())
            .unwrap_or("");
        let message = body
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .unwrap_or("")
            .to_string();

        let reason = match code {
            "TERMS_OF_SERVICE_NOT_ACCEPTED" => AssistantErrorReason::TermsNotAccepted,
            "NOT_FOUND" => AssistantErrorReason::NotFound,
            _ if status.as_u16() == 404 => AssistantErrorReason::NotFound,
            _ if status.as_u16() == 429 => AssistantErrorReason::RateLimited,
            _ => AssistantErrorReason::Service,
        };

        AssistantError::new(reason, format!("{} ({})", message, status))
    }

    fn network_err(e: reqwest::Error) -> AssistantError {
        AssistantError::new(AssistantErrorReason::Network, e.to_string())
    }
}

#[async_trait]
impl AssistantApi for PineconeAssistantApi {
    async fn describe_assistant(&self, name: &str) -> Result<(), AssistantError> {
        let response = self
            .client()?
            .get(format!("{}/assistant/assistants/{}", self.api_host, name))
            .header("Api-Key", self.api_key()?)
            .send()
            .await
            .map_err(Self::network_err)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::classify_failure(response).await)
        }
    }

    async fn create_assistant(
        &self,
        name: &str,
        instructions: &str,
    ) -> Result<(), AssistantError> {
        let response = self
            .client()?
            .post(format!("{}/assistant/assistants", self.api_host))
            .header("Api-Key", self.api_key()?)
            .json(&serde_json::json!({
                "name": name,
                "instructions": instructions,
            }))
            .send()
            .await
            .map_err(Self::network_err)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::classify_failure(response).await)
        }
    }

    async fn chat(
        &self,
        name: &str,
        turns: &[AssistantTurn],
    ) -> Result<AssistantChatResponse, AssistantError> {
        let messages: Vec<serde_json::Value> = turns
            .iter()
            .map(|t| serde_json::json!({ "role": t.role.as_str(), "content": t.content }))
            .collect();

        let response = self
            .client()?
            .post(format!("{}/assistant/chat/{}", self.data_host, name))
            .header("Api-Key", self.api_key()?)
            .json(&serde_json::json!({ "messages": messages }))
            .send()
            .await
            .map_err(Self::network_err)?;

        if !response.status().is_success() {
            return Err(Self::classify_failure(response).await);
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(Self::network_err)?;

        let content = json
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(AssistantChatResponse {
            content,
            usage: json.get("usage").cloned(),
        })
    }

    async fn upload_file(
        &self,
        name: &str,
        path: &Path,
        file_name: &str,
        metadata: &AssistantFileMetadata,
    ) -> Result<(), AssistantError> {
        let bytes = std::fs::read(path)
            .map_err(|e| AssistantError::new(AssistantErrorReason::Network, e.to_string()))?;

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let metadata_json = serde_json::to_string(metadata)
            .map_err(|e| AssistantError::new(AssistantErrorReason::Service, e.to_string()))?;

        let response = self
            .client()?
            .post(format!("{}/assistant/files/{}", self.data_host, name))
            .header("Api-Key", self.api_key()?)
            .query(&[("metadata", metadata_json)])
            .multipart(form)
            .send()
            .await
            .map_err(Self::network_err)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::classify_failure(response).await)
        }
    }

    async fn list_files(&self, name: &str) -> Result<Vec<RemoteAssistantFile>, AssistantError> {
        let response = self
            .client()?
            .get(format!("{}/assistant/files/{}", self.data_host, name))
            .header("Api-Key", self.api_key()?)
            .send()
            .await
            .map_err(Self::network_err)?;

        if !response.status().is_success() {
            return Err(Self::classify_failure(response).await);
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(Self::network_err)?;

        let files = json
            .get("files")
            .and_then(|f| f.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(files
            .iter()
            .map(|f| RemoteAssistantFile {
                id: f
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                name: f
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                metadata: f
                    .get("metadata")
                    .and_then(|m| serde_json::from_value(m.clone()).ok()),
            })
            .collect())
    }

    async fn delete_file(&self, name: &str, file_id: &str) -> Result<(), AssistantError> {
        let response = self
            .client()?
            .delete(format!(
                "{}/assistant/files/{}/{}",
                self.data_host, name, file_id
            ))
            .header("Api-Key", self.api_key()?)
            .send()
            .await
            .map_err(Self::network_err)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::classify_failure(response).await)
        }
    }
}

// ============ Assistant Service ============

/// Result of [`AssistantService::create_or_get_assistant`].
#[derive(Debug, Clone)]
pub struct CreateOrGetAssistant {
    pub assistant_name: String,
    /// Whether the remote assistant already existed.
    pub existed: bool,
}

/// System instruction given to every newly created assistant.
const ASSISTANT_INSTRUCTIONS: &str = "You are an AI assistant helping a user understand and work \
with the documents in their folder. Answer questions based on the uploaded documents. Be helpful, \
accurate, and cite specific documents when referencing information.";

/// Lifecycle and upload logic over an [`AssistantApi`].
pub struct AssistantService {
    api: Arc<dyn AssistantApi>,
    store: Arc<dyn MetaStore>,
    readiness_delay: Duration,
    max_batch_bytes: usize,
}

impl AssistantService {
    pub fn new(
        api: Arc<dyn AssistantApi>,
        store: Arc<dyn MetaStore>,
        readiness_delay: Duration,
        max_batch_bytes: usize,
    ) -> Self {
        Self {
            api,
            store,
            readiness_delay,
            max_batch_bytes,
        }
    }

    /// Deterministic assistant name for a user.
    pub fn assistant_name_for(user_id: &str) -> String {
        let sanitized: String = user_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect();
        format!("assistant-user-{}", sanitized)
    }

    /// Look up or lazily create the user's one managed assistant.
    ///
    /// The persisted identity is written with a conditional insert, so
    /// repeated or concurrent calls converge on the same name and
    /// therefore the same remote assistant. A newly created assistant is
    /// given the configured readiness delay before the handle is returned.
    pub async fn create_or_get_assistant(&self, user_id: &str) -> Result<CreateOrGetAssistant> {
        let identity = match self.store.get_assistant_identity(user_id).await? {
            Some(identity) => identity,
            None => {
                let name = Self::assistant_name_for(user_id);
                self.store.ensure_assistant_identity(user_id, &name).await?
            }
        };

        match self.api.describe_assistant(&identity.assistant_name).await {
            Ok(()) => Ok(CreateOrGetAssistant {
                assistant_name: identity.assistant_name,
                existed: true,
            }),
            Err(err) if err.reason == AssistantErrorReason::NotFound => {
                self.api
                    .create_assistant(&identity.assistant_name, ASSISTANT_INSTRUCTIONS)
                    .await?;
                // The service needs a moment before a fresh assistant accepts traffic.
                tokio::time::sleep(self.readiness_delay).await;
                Ok(CreateOrGetAssistant {
                    assistant_name: identity.assistant_name,
                    existed: false,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Upload one file's raw text under single-file metadata.
    pub async fn upload_file_content(
        &self,
        user_id: &str,
        folder_id: &str,
        content: &str,
        file_name: &str,
    ) -> Result<()> {
        let metadata = AssistantFileMetadata {
            user_id: user_id.to_string(),
            folder_id: folder_id.to_string(),
            file_name: Some(file_name.to_string()),
            batch_file_name: None,
            included_files: None,
            file_count: None,
            uploaded_at: Utc::now().to_rfc3339(),
        };
        self.upload_content(user_id, content, file_name, &metadata)
            .await
    }

    /// Stage content as a transient file artifact and upload it.
    ///
    /// The transient file is removed when it drops, whatever the upload
    /// outcome — only the upload result propagates.
    async fn upload_content(
        &self,
        user_id: &str,
        content: &str,
        file_name: &str,
        metadata: &AssistantFileMetadata,
    ) -> Result<()> {
        let created = self.create_or_get_assistant(user_id).await?;

        let sanitized = sanitize_file_name(file_name);
        let mut temp = tempfile::Builder::new()
            .prefix(&format!("{}-", sanitized))
            .suffix(".txt")
            .tempfile()?;
        temp.write_all(content.as_bytes())?;
        temp.flush()?;

        self.api
            .upload_file(&created.assistant_name, temp.path(), file_name, metadata)
            .await?;

        Ok(())
    }

    /// Pack files into size-bounded batches and upload each independently.
    ///
    /// One batch's failure never aborts its siblings; every batch reports
    /// its own outcome.
    pub async fn upload_batched_content(
        &self,
        user_id: &str,
        folder_id: &str,
        files: &[ExtractedFile],
    ) -> Result<Vec<BatchUploadOutcome>> {
        let batches = pack_batches(folder_id, files, self.max_batch_bytes);
        let mut outcomes = Vec::with_capacity(batches.len());

        for batch in batches {
            let metadata = AssistantFileMetadata {
                user_id: user_id.to_string(),
                folder_id: folder_id.to_string(),
                file_name: None,
                batch_file_name: Some(batch.name.clone()),
                included_files: Some(serde_json::to_string(&batch.files)?),
                file_count: Some(batch.files.len()),
                uploaded_at: Utc::now().to_rfc3339(),
            };

            let result = self
                .upload_content(user_id, &batch.body, &batch.name, &metadata)
                .await;

            outcomes.push(match result {
                Ok(()) => BatchUploadOutcome {
                    batch_name: batch.name,
                    files: batch.files,
                    status: UploadStatus::Success,
                    error: None,
                },
                Err(e) => BatchUploadOutcome {
                    batch_name: batch.name,
                    files: batch.files,
                    status: UploadStatus::Error,
                    error: Some(e.to_string()),
                },
            });
        }

        Ok(outcomes)
    }

    /// Delete every remote file whose metadata binds it to the folder.
    ///
    /// Individual delete failures are warned and skipped; the count of
    /// successful deletions is returned.
    pub async fn delete_files_for_folder(&self, user_id: &str, folder_id: &str) -> Result<usize> {
        let created = self.create_or_get_assistant(user_id).await?;
        let files = self.api.list_files(&created.assistant_name).await?;

        let mut deleted = 0usize;
        for file in files {
            let belongs = file
                .metadata
                .as_ref()
                .map(|m| m.folder_id == folder_id)
                .unwrap_or(false);
            if !belongs {
                continue;
            }

            match self
                .api
                .delete_file(&created.assistant_name, &file.id)
                .await
            {
                Ok(()) => deleted += 1,
                Err(e) => {
                    eprintln!("warning: could not delete assistant file {}: {}", file.id, e);
                }
            }
        }

        Ok(deleted)
    }

    /// Send a chat turn with prior history to the user's assistant.
    ///
    /// History messages are replayed role-tagged in order, followed by the
    /// new user message. The assistant manages grounding and citation
    /// extraction internally on this path.
    pub async fn chat_with_assistant(
        &self,
        user_id: &str,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<AssistantChatResponse> {
        let created = self.create_or_get_assistant(user_id).await?;

        let mut turns: Vec<AssistantTurn> = history
            .iter()
            .map(|m| AssistantTurn {
                role: m.role,
                content: m.content.clone(),
            })
            .collect();
        turns.push(AssistantTurn {
            role: MessageRole::User,
            content: message.to_string(),
        });

        self.api
            .chat(&created.assistant_name, &turns)
            .await
            .map_err(|e| e.into())
    }
}

/// Replace characters that are invalid in filesystem names.
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assistant_name_is_deterministic_and_sanitized() {
        let a = AssistantService::assistant_name_for("User_42@Example");
        let b = AssistantService::assistant_name_for("User_42@Example");
        assert_eq!(a, b);
        assert_eq!(a, "assistant-user-user-42-example");
    }

    #[test]
    fn test_sanitize_file_name_strips_path_separators() {
        assert_eq!(
            sanitize_file_name("notes/2024: draft?.txt"),
            "notes-2024- draft-.txt"
        );
    }

    #[test]
    fn test_error_display_carries_reason() {
        let err = AssistantError::new(AssistantErrorReason::TermsNotAccepted, "code 403");
        assert!(err.to_string().contains("terms not accepted"));
    }

    #[test]
    fn test_file_metadata_serializes_camel_case() {
        let metadata = AssistantFileMetadata {
            user_id: "u1".to_string(),
            folder_id: "d1".to_string(),
            file_name: Some("a.txt".to_string()),
            batch_file_name: None,
            included_files: None,
            file_count: None,
            uploaded_at: "2024-01-01T00:00:00Z".to_string(),
        };
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["folderId"], "d1");
        assert_eq!(json["fileName"], "a.txt");
        assert!(json.get("batchFileName").is_none());
    }
}
