use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use uuid::Uuid;

use super::provider::LlmProvider;
use super::types::{ChatMessage, ChatRequest, Role, ToolCall, ToolDeclaration};
use crate::core::config::LlmSettings;
use crate::core::errors::ApiError;

/// Any server speaking the OpenAI chat-completions dialect (Groq, LM Studio,
/// Ollama's `/v1`, vLLM, ...).
#[derive(Clone)]
pub struct OpenAiCompatProvider {
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    client: Client,
}

impl OpenAiCompatProvider {
    pub fn new(settings: &LlmSettings, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            client,
        })
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.post(url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn build_chat_body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages.iter().map(to_wire_message).collect::<Vec<_>>(),
            "stream": false,
        });

        if let Some(obj) = body.as_object_mut() {
            if !request.tools.is_empty() {
                obj.insert(
                    "tools".to_string(),
                    Value::Array(request.tools.iter().map(to_wire_tool).collect()),
                );
                obj.insert("tool_choice".to_string(), json!("auto"));
            }
            if let Some(t) = request.temperature.or(self.temperature) {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens.or(self.max_tokens) {
                obj.insert("max_tokens".to_string(), json!(t));
            }
        }

        body
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai_compat"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatMessage, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(&request);

        let res = self
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::model)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::ModelInvocation(format!(
                "chat completion returned {}: {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::model)?;
        let message = payload
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .ok_or_else(|| ApiError::model("response has no choices"))?;

        Ok(parse_assistant_message(message))
    }

    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        let url = format!("{}/embeddings", self.base_url);

        let body = json!({
            "model": model_id,
            "input": inputs,
        });

        let res = self
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!("embedding error: {}", text)));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;

        parse_embeddings(&payload, inputs.len())
    }
}

/// One vector per input, all numeric and of equal length.
pub(crate) fn parse_embeddings(payload: &Value, expected: usize) -> Result<Vec<Vec<f32>>, ApiError> {
    let data = payload
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::Internal("embedding response has no data".to_string()))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for (index, item) in data.iter().enumerate() {
        let values = item
            .get("embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| ApiError::Internal(format!("embedding {} is missing", index)))?;
        let vector = values
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| {
                ApiError::Internal(format!("embedding {} has a non-numeric component", index))
            })?;
        embeddings.push(vector);
    }

    if embeddings.len() != expected {
        return Err(ApiError::Internal(format!(
            "embedding endpoint returned {} vectors for {} inputs",
            embeddings.len(),
            expected
        )));
    }
    if let Some(first) = embeddings.first() {
        let dims = first.len();
        if embeddings.iter().any(|v| v.len() != dims) {
            return Err(ApiError::Internal(
                "embedding endpoint returned vectors of different lengths".to_string(),
            ));
        }
    }

    Ok(embeddings)
}

fn to_wire_tool(tool: &ToolDeclaration) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

/// Arguments travel as a JSON-encoded string on the wire.
pub(crate) fn to_wire_message(message: &ChatMessage) -> Value {
    let mut wire = json!({
        "role": message.role.as_str(),
        "content": message.content,
    });

    let Some(obj) = wire.as_object_mut() else {
        return wire;
    };

    if !message.tool_calls.is_empty() {
        let calls: Vec<Value> = message
            .tool_calls
            .iter()
            .map(|call| {
                let arguments = match &call.arguments {
                    Value::String(raw) => raw.clone(),
                    other => other.to_string(),
                };
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": { "name": call.name, "arguments": arguments },
                })
            })
            .collect();
        obj.insert("tool_calls".to_string(), Value::Array(calls));
        if message.content.is_empty() {
            obj.insert("content".to_string(), Value::Null);
        }
    }

    if let Some(call_id) = &message.tool_call_id {
        obj.insert("tool_call_id".to_string(), json!(call_id));
    }

    wire
}

pub(crate) fn parse_assistant_message(message: &Value) -> ChatMessage {
    let content = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| calls.iter().filter_map(parse_tool_call).collect())
        .unwrap_or_default();

    ChatMessage {
        role: Role::Assistant,
        content,
        tool_calls,
        tool_call_id: None,
    }
}

fn parse_tool_call(call: &Value) -> Option<ToolCall> {
    let function = call.get("function")?;
    let name = function.get("name")?.as_str()?.to_string();

    let arguments = match function.get("arguments") {
        Some(Value::String(raw)) if raw.trim().is_empty() => json!({}),
        Some(Value::String(raw)) => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
        }
        Some(other) => other.clone(),
        None => json!({}),
    };

    let id = call
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple()));

    Some(ToolCall {
        id,
        name,
        arguments,
    })
}
