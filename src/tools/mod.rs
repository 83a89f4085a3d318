//! Tools the model may call during a turn.

pub mod retrieve;
pub mod search;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::config::Settings;
use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, ToolCall, ToolDeclaration};
use crate::rag::Retriever;

pub use retrieve::RetrieveFromDocsTool;
pub use search::{SearchResult, SearchTool};

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn input_schema(&self) -> Value;

    async fn invoke(&self, args: &Value) -> Result<String, ApiError>;

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.input_schema(),
        }
    }
}

/// JSON schema for `T` as sent to the model, without the meta-schema header.
pub fn schema_for<T: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default();
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    schema
}

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    validator: jsonschema::Validator,
}

/// Name -> tool registry, resolved when a call is executed.
#[derive(Default)]
pub struct ToolSet {
    order: Vec<String>,
    tools: HashMap<String, RegisteredTool>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ApiError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ApiError::BadRequest(format!("tool `{}` is already registered", name)));
        }

        let validator = jsonschema::validator_for(&tool.input_schema()).map_err(|e| {
            ApiError::Internal(format!("tool `{}` has an invalid input schema: {}", name, e))
        })?;

        self.order.push(name.clone());
        self.tools.insert(name, RegisteredTool { tool, validator });
        Ok(())
    }

    pub fn with(mut self, tool: Arc<dyn Tool>) -> Result<Self, ApiError> {
        self.register(tool)?;
        Ok(self)
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|entry| entry.tool.declaration())
            .collect()
    }

    /// Runs one call and wraps the outcome as a tool message.
    ///
    /// Failures never escape: unknown names, invalid arguments, tool errors and
    /// timeouts all become error text answering `call.id`.
    pub async fn execute(&self, call: &ToolCall, timeout: Duration) -> ChatMessage {
        let content = match self.run(call, timeout).await {
            Ok(output) => output,
            Err(err) => {
                warn!("Tool call {} ({}) failed: {}", call.id, call.name, err);
                format!("Error: {}", err)
            }
        };
        ChatMessage::tool(call.id.clone(), content)
    }

    async fn run(&self, call: &ToolCall, timeout: Duration) -> Result<String, ApiError> {
        let entry = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ApiError::UnknownTool(call.name.clone()))?;

        if let Value::String(raw) = &call.arguments {
            return Err(ApiError::tool(
                &call.name,
                format!("arguments are not a JSON object: {}", raw),
            ));
        }

        let problems: Vec<String> = entry
            .validator
            .iter_errors(&call.arguments)
            .map(|e| e.to_string())
            .collect();
        if !problems.is_empty() {
            return Err(ApiError::tool(
                &call.name,
                format!("invalid arguments: {}", problems.join("; ")),
            ));
        }

        debug!("Invoking tool {} with {}", call.name, call.arguments);
        match tokio::time::timeout(timeout, entry.tool.invoke(&call.arguments)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::tool(
                &call.name,
                format!("timed out after {}s", timeout.as_secs_f32()),
            )),
        }
    }
}

/// `search_tool` and `retrieve_from_docs`, configured from `settings`.
pub fn default_toolset(
    settings: &Settings,
    retriever: Arc<dyn Retriever>,
) -> Result<ToolSet, ApiError> {
    ToolSet::new()
        .with(Arc::new(SearchTool::new(settings.search.clone())?))?
        .with(Arc::new(RetrieveFromDocsTool::new(
            retriever,
            settings.retrieval_top_k,
        )))
}
