//! Vector store abstraction.
//!
//! The [`VectorStore`] trait defines the namespace-scoped operations the
//! vector index needs: batch upsert, nearest-neighbor query with an
//! optional metadata filter, and scoped deletes. Namespaces partition the
//! store per user; operations never cross a namespace boundary.
//!
//! Two implementations:
//! - **[`PineconeStore`]** — serverless index over the Pinecone data-plane API.
//! - **[`memory::InMemoryVectorStore`]** — brute-force cosine store for tests.

pub mod memory;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::VectorConfig;
use crate::models::ChunkMetadata;

/// A vector plus its metadata, keyed by a caller-chosen id.
///
/// Upserting a record with an existing id overwrites the prior vector and
/// metadata.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A query hit with the store's native similarity score.
#[derive(Debug, Clone)]
pub struct ScoredVector {
    pub id: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

/// Typed metadata filter for queries and deletes.
///
/// Closed on purpose: the only filterable fields are the ones the index
/// writes, so filter queries stay type-checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VectorFilter {
    FileId(String),
    FolderId(String),
}

impl VectorFilter {
    /// Render as the store's `{"field": {"$eq": value}}` filter document.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            VectorFilter::FileId(id) => serde_json::json!({ "fileId": { "$eq": id } }),
            VectorFilter::FolderId(id) => serde_json::json!({ "folderId": { "$eq": id } }),
        }
    }
}

/// Namespace-scoped vector storage backend.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Upsert a batch of records into a namespace. Same-id records overwrite.
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<()>;

    /// Query the `top_k` nearest neighbors in a namespace, optionally
    /// pre-filtered by metadata. Results are in descending score order.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&VectorFilter>,
    ) -> Result<Vec<ScoredVector>>;

    /// Delete all records in a namespace matching the filter.
    async fn delete_by_filter(&self, namespace: &str, filter: &VectorFilter) -> Result<()>;

    /// Delete every record in a namespace.
    async fn delete_namespace(&self, namespace: &str) -> Result<()>;
}

// ============ Pinecone Store ============

/// Vector store backed by a Pinecone serverless index.
///
/// Talks to the index data-plane host from config. Requires the
/// `PINECONE_API_KEY` environment variable to be set.
pub struct PineconeStore {
    index_host: String,
    timeout_secs: u64,
}

impl PineconeStore {
    pub fn new(config: &VectorConfig) -> Result<Self> {
        if std::env::var("PINECONE_API_KEY").is_err() {
            bail!("PINECONE_API_KEY environment variable not set");
        }

        Ok(Self {
            index_host: config.index_host.trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?)
    }

    fn api_key(&self) -> Result<String> {
        std::env::var("PINECONE_API_KEY")
            .map_err(|_| anyhow::anyhow!("PINECONE_API_KEY not set"))
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let client = self.client()?;
        let response = client
            .post(format!("{}{}", self.index_host, path))
            .header("Api-Key", self.api_key()?)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Vector store error {}: {}", status, body_text);
        }

        Ok(response.json().await.unwrap_or(serde_json::json!({})))
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let vectors: Vec<serde_json::Value> = records
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id,
                    "values": r.values,
                    "metadata": r.metadata,
                })
            })
            .collect();

        self.post(
            "/vectors/upsert",
            serde_json::json!({ "vectors": vectors, "namespace": namespace }),
        )
        .await?;

        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&VectorFilter>,
    ) -> Result<Vec<ScoredVector>> {
        let mut body = serde_json::json!({
            "vector": vector,
            "topK": top_k,
            "namespace": namespace,
            "includeMetadata": true,
        });
        if let Some(f) = filter {
            body["filter"] = f.to_json();
        }

        let json = self.post("/query", body).await?;

        let matches = json
            .get("matches")
            .and_then(|m| m.as_array())
            .cloned()
            .unwrap_or_default();

        let mut results = Vec::with_capacity(matches.len());
        for m in matches {
            let id = m
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let score = m.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32;
            let metadata: ChunkMetadata = serde_json::from_value(
                m.get("metadata").cloned().unwrap_or(serde_json::json!({})),
            )
            .map_err(|e| anyhow::anyhow!("Invalid vector metadata for {}: {}", id, e))?;

            results.push(ScoredVector {
                id,
                score,
                metadata,
            });
        }

        Ok(results)
    }

    async fn delete_by_filter(&self, namespace: &str, filter: &VectorFilter) -> Result<()> {
        self.post(
            "/vectors/delete",
            serde_json::json!({ "namespace": namespace, "filter": filter.to_json() }),
        )
        .await?;
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        self.post(
            "/vectors/delete",
            serde_json::json!({ "namespace": namespace, "deleteAll": true }),
        )
        .await?;
        Ok(())
    }
}
