use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{schema_for, Tool};
use crate::core::errors::ApiError;
use crate::rag::Retriever;

pub const RETRIEVE_TOOL_NAME: &str = "retrieve_from_docs";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum QueryInput {
    One(String),
    Many(Vec<String>),
}

impl QueryInput {
    pub fn into_queries(self) -> Vec<String> {
        match self {
            QueryInput::One(query) => vec![query],
            QueryInput::Many(queries) => queries,
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RetrieveArgs {
    /// One query, or several to look up in order.
    pub query: QueryInput,
}

/// Looks up passages in the user's uploaded documents.
pub struct RetrieveFromDocsTool {
    retriever: Arc<dyn Retriever>,
    top_k: usize,
}

impl RetrieveFromDocsTool {
    pub fn new(retriever: Arc<dyn Retriever>, top_k: usize) -> Self {
        Self { retriever, top_k }
    }

    /// Passages for every query, concatenated in query order.
    pub async fn retrieve_all(&self, queries: &[String]) -> Result<Vec<String>, ApiError> {
        let mut passages = Vec::new();
        for query in queries {
            match self.retriever.retrieve(query, self.top_k).await {
                Ok(found) => passages.extend(found),
                Err(ApiError::IndexUnavailable) => {
                    debug!("No document index; returning no passages");
                    return Ok(Vec::new());
                }
                Err(err) => return Err(ApiError::tool(RETRIEVE_TOOL_NAME, err)),
            }
        }
        Ok(passages)
    }
}

#[async_trait]
impl Tool for RetrieveFromDocsTool {
    fn name(&self) -> &str {
        RETRIEVE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Retrieve relevant passages from the user's uploaded documents. Accepts one query or a list of queries."
    }

    fn input_schema(&self) -> Value {
        schema_for::<RetrieveArgs>()
    }

    async fn invoke(&self, args: &Value) -> Result<String, ApiError> {
        let args: RetrieveArgs = serde_json::from_value(args.clone())
            .map_err(|e| ApiError::tool(RETRIEVE_TOOL_NAME, e))?;
        let passages = self.retrieve_all(&args.query.into_queries()).await?;
        serde_json::to_string(&passages).map_err(ApiError::internal)
    }
}
