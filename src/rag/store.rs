//! RagStore trait: the persisted vector index behind document retrieval.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// A bounded span of one source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub chunk_id: String,
    /// Originating file, relative to the document folder.
    pub source: String,
    /// Position of this chunk within its document.
    pub chunk_index: usize,
    /// Byte offset of the chunk text in the document.
    pub start_offset: usize,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMatch {
    pub chunk: DocumentChunk,
    /// Cosine similarity (higher = better).
    pub score: f32,
}

/// Bookkeeping stored next to the chunks.
///
/// `built_at` is written in the same transaction as the chunks, so an index
/// without it was never completed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexMeta {
    pub embedder_id: Option<String>,
    pub built_at: Option<String>,
    pub chunk_count: usize,
}

impl IndexMeta {
    pub fn is_complete_for(&self, embedder_id: &str) -> bool {
        self.built_at.is_some() && self.embedder_id.as_deref() == Some(embedder_id)
    }
}

#[async_trait]
pub trait RagStore: Send + Sync {
    /// Replace the whole index with `items` and record who embedded them.
    async fn write_index(
        &self,
        items: Vec<(DocumentChunk, Vec<f32>)>,
        embedder_id: &str,
    ) -> Result<(), ApiError>;

    /// Chunks most similar to `query_embedding`, best first.
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkMatch>, ApiError>;

    async fn count(&self) -> Result<usize, ApiError>;

    async fn meta(&self) -> Result<IndexMeta, ApiError>;

    /// Release file handles before the index is deleted.
    async fn close(&self) {}
}
