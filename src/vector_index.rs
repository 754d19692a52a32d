//! Per-user-namespaced chunk index over the vector store.
//!
//! Composes the embedding gateway and the [`VectorStore`] into the
//! operations the indexing coordinator and chat fallback need: index a
//! file's chunks, similarity-search a user's namespace, and scoped
//! deletion. Every record lives in the namespace named by its owning user
//! id, so queries can never cross a user boundary.

use anyhow::Result;
use std::sync::Arc;

use crate::embedding::{embed_query, EmbeddingGateway};
use crate::models::{ChunkMetadata, SearchResult, TextChunk};
use crate::vector_store::{VectorFilter, VectorRecord, VectorStore};

/// Identity of the file whose chunks are being indexed.
#[derive(Debug, Clone)]
pub struct FileContext {
    pub file_id: String,
    pub file_name: String,
    pub folder_id: String,
    pub folder_name: String,
    pub user_id: String,
    pub mime_type: String,
}

/// Options for [`VectorIndex::search_similar`].
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub folder_id: Option<String>,
    pub top_k: usize,
    pub min_score: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            folder_id: None,
            top_k: 10,
            min_score: 0.7,
        }
    }
}

/// Chunk-level vector index with per-user namespacing.
pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
    embeddings: Arc<dyn EmbeddingGateway>,
}

impl VectorIndex {
    pub fn new(store: Arc<dyn VectorStore>, embeddings: Arc<dyn EmbeddingGateway>) -> Self {
        Self { store, embeddings }
    }

    /// Embed and upsert a file's chunks into the owning user's namespace.
    ///
    /// No-op on empty input. All chunk texts are embedded in one gateway
    /// call and upserted in one batch. Record ids are deterministic
    /// (`"{file_id}-chunk-{chunk_index}"`), so re-indexing the same file
    /// overwrites instead of duplicating.
    pub async fn index_file_chunks(&self, file: &FileContext, chunks: &[TextChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embeddings.embed(&texts).await?;

        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(vectors.into_iter())
            .map(|(chunk, values)| VectorRecord {
                id: format!("{}-chunk-{}", file.file_id, chunk.chunk_index),
                values,
                metadata: ChunkMetadata {
                    file_id: file.file_id.clone(),
                    file_name: file.file_name.clone(),
                    folder_id: file.folder_id.clone(),
                    folder_name: file.folder_name.clone(),
                    user_id: file.user_id.clone(),
                    mime_type: file.mime_type.clone(),
                    chunk_index: chunk.chunk_index,
                    chunk_text: chunk.content.clone(),
                    start_index: chunk.start_index,
                    end_index: chunk.end_index,
                },
            })
            .collect();

        self.store.upsert(&file.user_id, records).await
    }

    /// Similarity-search a user's namespace.
    ///
    /// Embeds the query once, fetches the top `top_k` neighbors (optionally
    /// pre-filtered to one folder), then drops anything scoring below
    /// `min_score`. Results keep the store's descending-score order.
    pub async fn search_similar(
        &self,
        query: &str,
        user_id: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let query_vec = embed_query(self.embeddings.as_ref(), query).await?;

        let filter = options
            .folder_id
            .as_ref()
            .map(|id| VectorFilter::FolderId(id.clone()));

        let matches = self
            .store
            .query(user_id, &query_vec, options.top_k, filter.as_ref())
            .await?;

        Ok(matches
            .into_iter()
            .filter(|m| m.score >= options.min_score)
            .map(|m| SearchResult {
                id: m.id,
                score: m.score,
                metadata: m.metadata,
            })
            .collect())
    }

    /// Delete all chunk vectors for one file.
    pub async fn delete_file_vectors(&self, file_id: &str, user_id: &str) -> Result<()> {
        self.store
            .delete_by_filter(user_id, &VectorFilter::FileId(file_id.to_string()))
            .await
    }

    /// Delete all chunk vectors for one folder.
    pub async fn delete_folder_vectors(&self, folder_id: &str, user_id: &str) -> Result<()> {
        self.store
            .delete_by_filter(user_id, &VectorFilter::FolderId(folder_id.to_string()))
            .await
    }

    /// Delete a user's entire namespace.
    pub async fn delete_user_vectors(&self, user_id: &str) -> Result<()> {
        self.store.delete_namespace(user_id).await
    }
}
