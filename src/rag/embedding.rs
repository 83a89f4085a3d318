//! Text embedders used to build and query the document index.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use sha2::{Digest, Sha256};

use super::vector_math::l2_normalize;
use crate::core::config::{EmbeddingBackend, EmbeddingSettings};
use crate::core::errors::ApiError;
use crate::llm::LlmProvider;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier recorded in the index; a different id forces a rebuild.
    fn id(&self) -> String;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;
}

/// Offline feature-hashing embedder.
///
/// Each lowercase word token is hashed with SHA-256; the first four bytes pick
/// a bucket and the fifth byte picks the sign. Vectors are L2-normalised, so
/// texts sharing vocabulary score high under cosine similarity.
pub struct HashingEmbedder {
    dimensions: usize,
    token_pattern: Regex,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Result<Self, ApiError> {
        if dimensions == 0 {
            return Err(ApiError::BadRequest(
                "embedding dimensions must be positive".to_string(),
            ));
        }
        let token_pattern = Regex::new(r"\w+").map_err(ApiError::internal)?;
        Ok(Self {
            dimensions,
            token_pattern,
        })
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();

        for token in self.token_pattern.find_iter(&lowered) {
            let digest = Sha256::digest(token.as_str().as_bytes());
            let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
                % self.dimensions;
            let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn id(&self) -> String {
        format!("hashing-sha256-{}", self.dimensions)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

/// Delegates to the LLM service's embeddings endpoint.
pub struct RemoteEmbedder {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl RemoteEmbedder {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn id(&self) -> String {
        format!("remote-{}", self.model)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.provider.embed(texts, &self.model).await
    }
}

pub fn build_embedder(
    settings: &EmbeddingSettings,
    provider: Arc<dyn LlmProvider>,
) -> Result<Arc<dyn Embedder>, ApiError> {
    match settings.backend {
        EmbeddingBackend::Hashing => Ok(Arc::new(HashingEmbedder::new(settings.dimensions)?)),
        EmbeddingBackend::Remote => Ok(Arc::new(RemoteEmbedder::new(
            provider,
            settings.model.clone(),
        ))),
    }
}
