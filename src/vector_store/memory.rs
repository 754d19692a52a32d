//! In-memory [`VectorStore`] implementation for testing.
//!
//! Uses `HashMap` behind `std::sync::RwLock` for thread safety. Queries
//! are brute-force cosine similarity over the namespace's stored vectors.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use super::{ScoredVector, VectorFilter, VectorRecord, VectorStore};

/// In-memory vector store for tests.
pub struct InMemoryVectorStore {
    namespaces: RwLock<HashMap<String, HashMap<String, VectorRecord>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            namespaces: RwLock::new(HashMap::new()),
        }
    }

    /// Number of records currently stored in a namespace.
    pub fn namespace_len(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .unwrap()
            .get(namespace)
            .map(|ns| ns.len())
            .unwrap_or(0)
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

fn matches_filter(record: &VectorRecord, filter: &VectorFilter) -> bool {
    match filter {
        VectorFilter::FileId(id) => record.metadata.file_id == *id,
        VectorFilter::FolderId(id) => record.metadata.folder_id == *id,
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<()> {
        let mut namespaces = self.namespaces.write().unwrap();
        let ns = namespaces.entry(namespace.to_string()).or_default();
        for record in records {
            ns.insert(record.id.clone(), record);
        }
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&VectorFilter>,
    ) -> Result<Vec<ScoredVector>> {
        let namespaces = self.namespaces.read().unwrap();
        let Some(ns) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut results: Vec<ScoredVector> = ns
            .values()
            .filter(|r| filter.map(|f| matches_filter(r, f)).unwrap_or(true))
            .map(|r| ScoredVector {
                id: r.id.clone(),
                score: cosine_similarity(vector, &r.values),
                metadata: r.metadata.clone(),
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);
        Ok(results)
    }

    async fn delete_by_filter(&self, namespace: &str, filter: &VectorFilter) -> Result<()> {
        let mut namespaces = self.namespaces.write().unwrap();
        if let Some(ns) = namespaces.get_mut(namespace) {
            ns.retain(|_, r| !matches_filter(r, filter));
        }
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        self.namespaces.write().unwrap().remove(namespace);
        Ok(())
    }
}
