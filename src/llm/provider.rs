use async_trait::async_trait;

use super::types::{ChatMessage, ChatRequest};
use crate::core::errors::ApiError;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "openai_compat")
    fn name(&self) -> &str;

    /// one completion; the returned message is always assistant-role and may carry tool calls
    async fn chat(&self, request: ChatRequest) -> Result<ChatMessage, ApiError>;

    /// generate embeddings
    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, ApiError>;
}
