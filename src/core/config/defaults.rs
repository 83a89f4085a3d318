pub const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_LLM_MODEL: &str = "llama-3.1-8b-instant";
pub const LLM_API_KEY_ENV_VARS: [&str; 2] = ["GROQ_API_KEY", "LLM_API_KEY"];

pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

pub const DEFAULT_CHUNK_SIZE: usize = 200;
pub const DEFAULT_CHUNK_OVERLAP: usize = 0;
pub const DEFAULT_TOP_K: usize = 3;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Answer clearly and concisely. Always respond strictly in Markdown format.";
pub const DEFAULT_MAX_ROUNDS: usize = 8;
pub const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_SEARCH_PROVIDER: &str = "duckduckgo";
pub const DEFAULT_SEARCH_MAX_RESULTS: usize = 5;
