// Node trait, execution context and graph errors

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::agent::AgentEvent;
use crate::core::config::AgentSettings;
use crate::core::errors::ApiError;
use crate::history::ConversationStore;
use crate::llm::{ChatMessage, LlmProvider};
use crate::tools::ToolSet;

use super::state::{AgentState, LoopState};

/// Everything a node may touch while a turn runs.
pub struct NodeContext<'a> {
    pub llm: &'a dyn LlmProvider,
    pub tools: &'a ToolSet,
    pub store: &'a dyn ConversationStore,
    pub events: &'a mpsc::Sender<AgentEvent>,
    pub settings: &'a AgentSettings,
}

impl NodeContext<'_> {
    /// Sends an event to the caller. A caller that stopped listening does not
    /// stop the turn.
    pub async fn emit(&self, event: AgentEvent) {
        if self.events.send(event).await.is_err() {
            tracing::debug!("Agent event receiver dropped; continuing turn");
        }
    }

    /// Persists `messages` in one append, then records and streams them.
    pub async fn commit(
        &self,
        node_id: &str,
        state: &mut AgentState,
        messages: Vec<ChatMessage>,
    ) -> Result<(), GraphError> {
        self.store
            .append(&state.thread_id, &messages)
            .await
            .map_err(|e| GraphError::persistence(node_id, e.to_string()))?;

        for message in messages {
            self.emit(AgentEvent::Message {
                thread_id: state.thread_id.clone(),
                message: message.clone(),
            })
            .await;
            state.push(message);
        }
        Ok(())
    }

    pub async fn transition(&self, state: &mut AgentState, next: LoopState) {
        state.loop_state = next;
        self.emit(AgentEvent::State {
            thread_id: state.thread_id.clone(),
            state: next,
        })
        .await;
    }
}

/// Output from a node execution
#[derive(Debug, Clone)]
pub enum NodeOutput {
    /// Follow the default edge
    Continue,
    /// Follow the edge labelled with this condition
    Branch(String),
    /// Graph execution complete
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphErrorKind {
    /// Wiring problems, step limit, missing edges.
    Runtime,
    ModelInvocation,
    Persistence,
}

/// Graph execution error
///
/// `execution_trace` lists the node ids visited before the failure, most
/// recent last.
#[derive(Debug, Clone)]
pub struct GraphError {
    pub node_id: String,
    pub message: String,
    pub kind: GraphErrorKind,
    pub execution_trace: Vec<String>,
}

impl GraphError {
    pub fn new(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            message: message.into(),
            kind: GraphErrorKind::Runtime,
            execution_trace: Vec::new(),
        }
    }

    pub fn model(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: GraphErrorKind::ModelInvocation,
            ..Self::new(node_id, message)
        }
    }

    pub fn persistence(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: GraphErrorKind::Persistence,
            ..Self::new(node_id, message)
        }
    }

    pub fn with_trace(mut self, trace: Vec<String>) -> Self {
        self.execution_trace = trace;
        self
    }
}

impl From<GraphError> for ApiError {
    fn from(err: GraphError) -> Self {
        match err.kind {
            GraphErrorKind::ModelInvocation => ApiError::ModelInvocation(err.message),
            GraphErrorKind::Persistence | GraphErrorKind::Runtime => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.execution_trace.is_empty() {
            write!(f, "GraphError in {}: {}", self.node_id, self.message)
        } else {
            write!(
                f,
                "GraphError in {} (trace: {}): {}",
                self.node_id,
                self.execution_trace.join(" -> "),
                self.message
            )
        }
    }
}

impl std::error::Error for GraphError {}

/// Node trait - all graph nodes implement this
#[async_trait]
pub trait Node: Send + Sync {
    /// Unique identifier for this node
    fn id(&self) -> &'static str;

    async fn execute(
        &self,
        state: &mut AgentState,
        ctx: &NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError>;
}
