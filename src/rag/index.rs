use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use super::embedding::Embedder;
use super::store::{ChunkMatch, IndexMeta, RagStore};
use crate::core::errors::ApiError;

/// How `build_index` produced its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    /// A completed persisted index was reused as-is.
    Loaded,
    /// The index was regenerated from the document folder.
    Built,
}

/// Read side of document retrieval, as seen by tools.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `k` chunk texts, most similar to `query` first.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>, ApiError>;
}

/// A loaded index plus the embedder that built it.
pub struct DocumentIndex {
    store: Arc<dyn RagStore>,
    embedder: Arc<dyn Embedder>,
}

impl DocumentIndex {
    pub fn new(store: Arc<dyn RagStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ChunkMatch>, ApiError> {
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self.embedder.embed(&[query.to_string()]).await?;
        let query_embedding = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Internal("embedder returned no vector".to_string()))?;

        // A query without any embeddable token scores 0 against every chunk.
        if query_embedding.iter().all(|v| *v == 0.0) {
            return Ok(Vec::new());
        }

        self.store.search(&query_embedding, k).await
    }

    pub async fn meta(&self) -> Result<IndexMeta, ApiError> {
        self.store.meta().await
    }

    pub async fn close(&self) {
        self.store.close().await;
    }
}

#[async_trait]
impl Retriever for DocumentIndex {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>, ApiError> {
        Ok(self
            .search(query, k)
            .await?
            .into_iter()
            .map(|m| m.chunk.text)
            .collect())
    }
}
