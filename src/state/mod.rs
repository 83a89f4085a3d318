use std::sync::Arc;

use crate::agent::ChatAgent;
use crate::core::config::{AppPaths, ConfigService, Settings};
use crate::history::HistoryStore;
use crate::llm::{LlmProvider, OpenAiCompatProvider};
use crate::rag::{build_embedder, IngestionPipeline, KnowledgeBase};
use crate::tools::{default_toolset, ToolSet};

pub mod error;

use error::InitializationError;

/// Application state shared across all routes.
///
/// Every service is constructed here and injected into its consumers; nothing
/// is global.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: Arc<Settings>,
    pub history: Arc<HistoryStore>,
    pub llm: Arc<dyn LlmProvider>,
    pub knowledge: Arc<KnowledgeBase>,
    pub tools: Arc<ToolSet>,
    pub agent: Arc<ChatAgent>,
}

impl AppState {
    pub async fn initialize() -> Result<Arc<Self>, InitializationError> {
        Self::initialize_with(Arc::new(AppPaths::new())).await
    }

    /// Loads config for `paths`, opens the conversation database and wires
    /// the LLM client, knowledge base, tools and agent together. The document
    /// index itself is built lazily on first retrieval.
    pub async fn initialize_with(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());
        let settings = Arc::new(
            config
                .load_settings()
                .map_err(|e| InitializationError::Config(e.into()))?,
        );

        let history = Arc::new(
            HistoryStore::new(paths.db_path.clone())
                .await
                .map_err(|e| InitializationError::History(e.into()))?,
        );

        let llm: Arc<dyn LlmProvider> = Arc::new(
            OpenAiCompatProvider::new(&settings.llm, settings.agent.model_timeout)
                .map_err(|e| InitializationError::Llm(e.into()))?,
        );

        let embedder = build_embedder(&settings.embedding, llm.clone())
            .map_err(|e| InitializationError::Rag(e.into()))?;
        let pipeline =
            IngestionPipeline::new(settings.ingestion, embedder, paths.index_path.clone())
                .map_err(|e| InitializationError::Rag(e.into()))?;
        let knowledge = Arc::new(KnowledgeBase::new(paths.docs_dir.clone(), pipeline));

        let tools = Arc::new(
            default_toolset(&settings, knowledge.clone())
                .map_err(|e| InitializationError::Tools(e.into()))?,
        );

        let agent = Arc::new(
            ChatAgent::new(
                llm.clone(),
                tools.clone(),
                history.clone(),
                settings.agent.clone(),
            )
            .map_err(|e| InitializationError::Graph(e.into()))?,
        );

        tracing::info!(
            "Initialized with model {} at {} (tools: {})",
            settings.llm.model,
            settings.llm.base_url,
            tools.names().join(", ")
        );

        Ok(Arc::new(AppState {
            paths,
            config,
            settings,
            history,
            llm,
            knowledge,
            tools,
            agent,
        }))
    }
}
