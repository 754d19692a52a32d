//! Folder indexing coordination.
//!
//! Drives "index all files in a folder" across either backend and owns the
//! folder's [`IndexStatus`] transitions:
//!
//! ```text
//! pending → processing → completed   (every file succeeded)
//!                      → partial     (some succeeded, some failed)
//!                      → failed      (none succeeded)
//! ```
//!
//! Two interchangeable strategies share that state machine:
//! - **per-file** — extract, chunk, embed, and upsert each unindexed file
//!   into the vector index, one at a time, optionally throttled;
//! - **assistant-batch** — purge the folder's previously uploaded files,
//!   extract everything, and ship the folder as few size-bounded batches
//!   to the managed assistant.
//!
//! Per-file failures are recorded and never abort the run. Deleting a chat
//! resets its folder to `pending` and un-indexes every file; remote
//! cleanup is attempted first but its failures never block the local
//! reset.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::assistant::AssistantService;
use crate::batch::UploadStatus;
use crate::chunker::chunk_by_tokens;
use crate::models::{ExtractedFile, FileRecord, FolderRecord, IndexStatus};
use crate::sources::{DocumentSource, SourceFile};
use crate::store::MetaStore;
use crate::vector_index::{FileContext, VectorIndex};

/// Fixed inter-file delay for the per-file strategy.
///
/// Throttling policy lives here, outside the indexing loop; a zero delay
/// disables it.
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    delay: Duration,
}

impl Throttle {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn disabled() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }

    pub async fn wait(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// Which backend a folder indexing run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStrategy {
    PerFile,
    AssistantBatch,
}

/// Per-file result of an indexing run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOutcome {
    pub file_id: String,
    pub file_name: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
    Skipped,
}

/// Summary of one folder indexing run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexReport {
    pub folder_id: String,
    pub folder_name: String,
    pub total_files: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub status: IndexStatus,
    pub outcomes: Vec<FileOutcome>,
}

/// Chunking knobs for the per-file strategy.
#[derive(Debug, Clone, Copy)]
pub struct IndexChunking {
    pub target_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for IndexChunking {
    fn default() -> Self {
        Self {
            target_tokens: 500,
            overlap_tokens: 50,
        }
    }
}

/// The coordinator, bound to one account.
pub struct FolderIndexer {
    store: Arc<dyn MetaStore>,
    source: Arc<dyn DocumentSource>,
    vector_index: Arc<VectorIndex>,
    assistant: Arc<AssistantService>,
    user_id: String,
    chunking: IndexChunking,
    throttle: Throttle,
}

impl FolderIndexer {
    pub fn new(
        store: Arc<dyn MetaStore>,
        source: Arc<dyn DocumentSource>,
        vector_index: Arc<VectorIndex>,
        assistant: Arc<AssistantService>,
        user_id: String,
        chunking: IndexChunking,
        throttle: Throttle,
    ) -> Self {
        Self {
            store,
            source,
            vector_index,
            assistant,
            user_id,
            chunking,
            throttle,
        }
    }

    /// Index a folder with the chosen strategy and persist the final status.
    pub async fn index_folder(
        &self,
        folder_id: &str,
        strategy: IndexStrategy,
    ) -> Result<IndexReport> {
        let (folder, files) = self.register_folder(folder_id).await?;

        // Per-file runs only touch unindexed files; when there are none,
        // leave the folder's status exactly as it is.
        if strategy == IndexStrategy::PerFile
            && !files.is_empty()
            && files.iter().all(|(record, _)| record.indexed)
        {
            return Ok(IndexReport {
                folder_id: folder.id,
                folder_name: folder.name,
                total_files: files.len(),
                success_count: 0,
                error_count: 0,
                status: folder.index_status,
                outcomes: Vec::new(),
            });
        }

        self.store
            .set_folder_status(folder_id, IndexStatus::Processing, Some(Utc::now()))
            .await?;

        let outcomes = match strategy {
            IndexStrategy::PerFile => self.run_per_file(&folder, &files).await?,
            IndexStrategy::AssistantBatch => self.run_assistant_batch(&folder, &files).await?,
        };

        let success_count = outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Success)
            .count();
        let error_count = outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Error)
            .count();

        let status = final_status(success_count, error_count);
        self.store
            .set_folder_status(folder_id, status, Some(Utc::now()))
            .await?;

        Ok(IndexReport {
            folder_id: folder.id,
            folder_name: folder.name,
            total_files: files.len(),
            success_count,
            error_count,
            status,
            outcomes,
        })
    }

    /// List the folder's files from the source and mirror them into the
    /// metadata store. Existing indexed flags and status are preserved.
    async fn register_folder(
        &self,
        folder_id: &str,
    ) -> Result<(FolderRecord, Vec<(FileRecord, SourceFile)>)> {
        let source_files = self.source.list_files(folder_id).await?;
        let folder_name = self.source.folder_name(folder_id);

        self.store
            .upsert_folder(&FolderRecord {
                id: folder_id.to_string(),
                name: folder_name.clone(),
                user_id: self.user_id.clone(),
                index_status: IndexStatus::Pending,
                last_indexed: None,
            })
            .await?;

        let mut files = Vec::with_capacity(source_files.len());
        for source_file in source_files {
            let record = FileRecord {
                id: source_file.id.clone(),
                folder_id: folder_id.to_string(),
                name: source_file.name.clone(),
                mime_type: source_file.mime_type.clone(),
                indexed: false,
            };
            self.store.upsert_file(&record).await?;
            files.push((record, source_file));
        }

        let folder = self
            .store
            .get_folder(folder_id)
            .await?
            .context("folder missing after upsert")?;

        // Re-read flags so previously indexed files keep their state.
        let stored = self.store.files_in_folder(folder_id).await?;
        let files = files
            .into_iter()
            .map(|(mut record, source_file)| {
                if let Some(existing) = stored.iter().find(|f| f.id == record.id) {
                    record.indexed = existing.indexed;
                }
                (record, source_file)
            })
            .collect();

        Ok((folder, files))
    }

    /// Per-file strategy: chunk and embed every unindexed file.
    async fn run_per_file(
        &self,
        folder: &FolderRecord,
        files: &[(FileRecord, SourceFile)],
    ) -> Result<Vec<FileOutcome>> {
        let mut outcomes = Vec::new();

        for (record, source_file) in files {
            if record.indexed {
                continue;
            }

            self.throttle.wait().await;

            let content = match self.source.fetch_text(source_file).await {
                Ok(content) => content,
                Err(e) => {
                    outcomes.push(FileOutcome {
                        file_id: record.id.clone(),
                        file_name: record.name.clone(),
                        status: OutcomeStatus::Error,
                        detail: Some(e.to_string()),
                        batch: None,
                    });
                    continue;
                }
            };

            let chunks = chunk_by_tokens(
                &content,
                self.chunking.target_tokens,
                self.chunking.overlap_tokens,
            );

            if chunks.is_empty() {
                // Nothing extractable; don't retry this file on the next run.
                self.store.set_file_indexed(&record.id, true).await?;
                outcomes.push(FileOutcome {
                    file_id: record.id.clone(),
                    file_name: record.name.clone(),
                    status: OutcomeStatus::Skipped,
                    detail: Some("No content extracted".to_string()),
                    batch: None,
                });
                continue;
            }

            let context = FileContext {
                file_id: record.id.clone(),
                file_name: record.name.clone(),
                folder_id: folder.id.clone(),
                folder_name: folder.name.clone(),
                user_id: self.user_id.clone(),
                mime_type: record.mime_type.clone(),
            };

            match self.vector_index.index_file_chunks(&context, &chunks).await {
                Ok(()) => {
                    let chunk_indexes: Vec<i64> = chunks.iter().map(|c| c.chunk_index).collect();
                    self.store
                        .replace_file_chunks(&record.id, &chunk_indexes)
                        .await?;
                    self.store.set_file_indexed(&record.id, true).await?;
                    outcomes.push(FileOutcome {
                        file_id: record.id.clone(),
                        file_name: record.name.clone(),
                        status: OutcomeStatus::Success,
                        detail: Some(format!("{} chunks", chunks.len())),
                        batch: None,
                    });
                }
                Err(e) => {
                    outcomes.push(FileOutcome {
                        file_id: record.id.clone(),
                        file_name: record.name.clone(),
                        status: OutcomeStatus::Error,
                        detail: Some(e.to_string()),
                        batch: None,
                    });
                }
            }
        }

        Ok(outcomes)
    }

    /// Assistant-batch strategy: purge prior uploads, extract everything,
    /// upload as few batches, and map batch outcomes back onto files.
    async fn run_assistant_batch(
        &self,
        folder: &FolderRecord,
        files: &[(FileRecord, SourceFile)],
    ) -> Result<Vec<FileOutcome>> {
        // Purge before re-upload so re-indexing never duplicates content.
        self.assistant
            .create_or_get_assistant(&self.user_id)
            .await
            .context("Failed to prepare assistant for indexing")?;
        let purged = self
            .assistant
            .delete_files_for_folder(&self.user_id, &folder.id)
            .await
            .context("Failed to purge prior assistant files")?;
        if purged > 0 {
            eprintln!("purged {} prior assistant files for folder {}", purged, folder.id);
        }

        let mut outcomes = Vec::new();
        let mut extracted: Vec<ExtractedFile> = Vec::new();

        for (record, source_file) in files {
            match self.source.fetch_text(source_file).await {
                Ok(content) if content.trim().is_empty() => {
                    outcomes.push(FileOutcome {
                        file_id: record.id.clone(),
                        file_name: record.name.clone(),
                        status: OutcomeStatus::Skipped,
                        detail: Some("No content extracted".to_string()),
                        batch: None,
                    });
                }
                Ok(content) => {
                    extracted.push(ExtractedFile {
                        file_id: record.id.clone(),
                        file_name: record.name.clone(),
                        content,
                    });
                }
                Err(e) => {
                    outcomes.push(FileOutcome {
                        file_id: record.id.clone(),
                        file_name: record.name.clone(),
                        status: OutcomeStatus::Error,
                        detail: Some(e.to_string()),
                        batch: None,
                    });
                }
            }
        }

        if extracted.is_empty() {
            return Ok(outcomes);
        }

        let upload_outcomes = self
            .assistant
            .upload_batched_content(&self.user_id, &folder.id, &extracted)
            .await?;

        for upload in upload_outcomes {
            for file_name in &upload.files {
                let Some(file) = extracted.iter().find(|f| f.file_name == *file_name) else {
                    continue;
                };

                match upload.status {
                    UploadStatus::Success => {
                        self.store.set_file_indexed(&file.file_id, true).await?;
                        outcomes.push(FileOutcome {
                            file_id: file.file_id.clone(),
                            file_name: file.file_name.clone(),
                            status: OutcomeStatus::Success,
                            detail: None,
                            batch: Some(upload.batch_name.clone()),
                        });
                    }
                    UploadStatus::Error => {
                        outcomes.push(FileOutcome {
                            file_id: file.file_id.clone(),
                            file_name: file.file_name.clone(),
                            status: OutcomeStatus::Error,
                            detail: upload.error.clone().or_else(|| {
                                Some("Batch upload failed".to_string())
                            }),
                            batch: Some(upload.batch_name.clone()),
                        });
                    }
                }
            }
        }

        Ok(outcomes)
    }

    /// Delete a chat and force its folder back to an unindexed state.
    ///
    /// Remote cleanup (assistant files, folder vectors) runs first and is
    /// best-effort: failures are warned and the local reset proceeds.
    pub async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        let Some(chat) = self.store.get_chat(chat_id).await? else {
            bail!("Chat not found");
        };

        if let Some(folder) = self.store.get_folder(&chat.folder_id).await? {
            if folder.user_id != self.user_id {
                bail!("Chat not found");
            }
        }

        if let Err(e) = self
            .assistant
            .delete_files_for_folder(&self.user_id, &chat.folder_id)
            .await
        {
            eprintln!(
                "warning: could not delete assistant files for folder {}: {}",
                chat.folder_id, e
            );
        }

        if let Err(e) = self
            .vector_index
            .delete_folder_vectors(&chat.folder_id, &self.user_id)
            .await
        {
            eprintln!(
                "warning: could not delete vectors for folder {}: {}",
                chat.folder_id, e
            );
        }

        self.store.delete_chat(chat_id).await?;
        self.store
            .set_folder_status(&chat.folder_id, IndexStatus::Pending, None)
            .await?;
        self.store.clear_folder_file_flags(&chat.folder_id).await?;

        Ok(())
    }
}

/// Fold per-file counts into the folder's final status.
fn final_status(success_count: usize, error_count: usize) -> IndexStatus {
    if success_count > 0 && error_count == 0 {
        IndexStatus::Completed
    } else if success_count > 0 {
        IndexStatus::Partial
    } else {
        IndexStatus::Failed
    }
}
