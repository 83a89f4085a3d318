use std::env;
use std::time::Duration;

use serde_json::Value;

use super::defaults::*;

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    /// Local feature hashing, no network.
    Hashing,
    /// The LLM service's `/embeddings` endpoint.
    Remote,
}

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    pub model: String,
    pub dimensions: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct IngestionSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub system_prompt: String,
    pub max_rounds: usize,
    pub model_timeout: Duration,
    pub tool_timeout: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            model_timeout: Duration::from_secs(DEFAULT_MODEL_TIMEOUT_SECS),
            tool_timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub provider: String,
    pub max_results: usize,
    pub timeout: Duration,
    pub google_api_key: Option<String>,
    pub google_engine_id: Option<String>,
    pub brave_api_key: Option<String>,
    pub bing_api_key: Option<String>,
}

/// Typed view over the merged YAML config, with every default applied.
#[derive(Debug, Clone)]
pub struct Settings {
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub ingestion: IngestionSettings,
    pub retrieval_top_k: usize,
    pub agent: AgentSettings,
    pub search: SearchSettings,
    pub cors_allowed_origins: Vec<String>,
}

impl Settings {
    pub fn from_config(config: &Value) -> Self {
        let llm = LlmSettings {
            base_url: str_at(config, "llm", "base_url")
                .unwrap_or(DEFAULT_LLM_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: str_at(config, "llm", "model")
                .unwrap_or(DEFAULT_LLM_MODEL)
                .to_string(),
            api_key: secret_at(config, "llm", "api_key").or_else(api_key_from_env),
            temperature: config
                .get("llm")
                .and_then(|v| v.get("temperature"))
                .and_then(Value::as_f64),
            max_tokens: u64_at(config, "llm", "max_tokens").and_then(|v| u32::try_from(v).ok()),
        };

        let embedding = EmbeddingSettings {
            backend: match str_at(config, "embedding", "provider") {
                Some("remote") => EmbeddingBackend::Remote,
                _ => EmbeddingBackend::Hashing,
            },
            model: str_at(config, "embedding", "model")
                .unwrap_or(DEFAULT_EMBEDDING_MODEL)
                .to_string(),
            dimensions: u64_at(config, "embedding", "dimensions")
                .map(|v| v as usize)
                .unwrap_or(DEFAULT_EMBEDDING_DIMENSIONS),
        };

        let ingestion = IngestionSettings {
            chunk_size: u64_at(config, "ingestion", "chunk_size")
                .map(|v| v as usize)
                .unwrap_or(DEFAULT_CHUNK_SIZE),
            chunk_overlap: u64_at(config, "ingestion", "chunk_overlap")
                .map(|v| v as usize)
                .unwrap_or(DEFAULT_CHUNK_OVERLAP),
        };

        let agent = AgentSettings {
            system_prompt: str_at(config, "agent", "system_prompt")
                .unwrap_or(DEFAULT_SYSTEM_PROMPT)
                .to_string(),
            max_rounds: u64_at(config, "agent", "max_rounds")
                .map(|v| v as usize)
                .unwrap_or(DEFAULT_MAX_ROUNDS),
            model_timeout: Duration::from_secs(
                u64_at(config, "agent", "model_timeout_secs").unwrap_or(DEFAULT_MODEL_TIMEOUT_SECS),
            ),
            tool_timeout: Duration::from_secs(
                u64_at(config, "agent", "tool_timeout_secs").unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS),
            ),
        };

        let search = SearchSettings {
            provider: str_at(config, "tools", "search_provider")
                .unwrap_or(DEFAULT_SEARCH_PROVIDER)
                .to_string(),
            max_results: u64_at(config, "tools", "search_max_results")
                .map(|v| v as usize)
                .unwrap_or(DEFAULT_SEARCH_MAX_RESULTS),
            timeout: agent.tool_timeout,
            google_api_key: secret_at(config, "tools", "google_search_api_key"),
            google_engine_id: secret_at(config, "tools", "google_search_engine_id"),
            brave_api_key: secret_at(config, "tools", "brave_search_api_key"),
            bing_api_key: secret_at(config, "tools", "bing_search_api_key"),
        };

        let cors_allowed_origins = config
            .get("server")
            .and_then(|v| v.get("cors_allowed_origins"))
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            llm,
            embedding,
            ingestion,
            retrieval_top_k: u64_at(config, "retrieval", "top_k")
                .map(|v| v as usize)
                .unwrap_or(DEFAULT_TOP_K),
            agent,
            search,
            cors_allowed_origins,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&Value::Null)
    }
}

fn str_at<'a>(config: &'a Value, section: &str, key: &str) -> Option<&'a str> {
    config
        .get(section)
        .and_then(|v| v.get(key))
        .and_then(Value::as_str)
}

fn u64_at(config: &Value, section: &str, key: &str) -> Option<u64> {
    config
        .get(section)
        .and_then(|v| v.get(key))
        .and_then(Value::as_u64)
}

fn secret_at(config: &Value, section: &str, key: &str) -> Option<String> {
    str_at(config, section, key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn api_key_from_env() -> Option<String> {
    LLM_API_KEY_ENV_VARS
        .iter()
        .filter_map(|name| env::var(name).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}
