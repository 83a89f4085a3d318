//! The conversational agent: runs one user turn through the chat/tools graph
//! against a thread's persisted history.

pub mod events;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::core::config::AgentSettings;
use crate::core::errors::ApiError;
use crate::graph::{build_agent_graph, AgentState, GraphRuntime, LoopState, NodeContext, TurnStatus};
use crate::history::{validate_thread_id, ConversationStore};
use crate::llm::{ChatMessage, LlmProvider};
use crate::tools::ToolSet;

pub use events::AgentEvent;

const EVENT_BUFFER: usize = 64;

/// Result recorded for a call whose turn stopped before the tool answered.
pub const INTERRUPTED_TOOL_RESULT: &str = "Error: interrupted before the tool returned a result";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub thread_id: String,
    pub status: TurnStatus,
    pub answer: Option<String>,
    pub model_rounds: usize,
    /// Everything appended to the thread during the turn, in order.
    pub messages: Vec<ChatMessage>,
}

pub struct ChatAgent {
    llm: Arc<dyn LlmProvider>,
    tools: Arc<ToolSet>,
    store: Arc<dyn ConversationStore>,
    graph: GraphRuntime,
    settings: AgentSettings,
    thread_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ChatAgent {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        tools: Arc<ToolSet>,
        store: Arc<dyn ConversationStore>,
        settings: AgentSettings,
    ) -> Result<Self, ApiError> {
        let graph = build_agent_graph(settings.max_rounds)?;
        Ok(Self {
            llm,
            tools,
            store,
            graph,
            settings,
            thread_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> Arc<dyn ConversationStore> {
        self.store.clone()
    }

    /// Runs one turn to completion, streaming events into `events`.
    ///
    /// Turns on the same thread are serialised; turns on different threads
    /// run independently. On failure an `Error` event is emitted and the
    /// messages appended before the failure stay in the thread.
    pub async fn run_turn(
        &self,
        thread_id: &str,
        input: &str,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Result<TurnOutcome, ApiError> {
        let result = self.run_turn_inner(thread_id, input, events).await;

        if let Err(err) = &result {
            error!("Turn on thread {} failed: {}", thread_id, err);
            let _ = events
                .send(AgentEvent::Error {
                    thread_id: thread_id.to_string(),
                    message: err.to_string(),
                })
                .await;
        }
        result
    }

    /// Spawns the turn and returns the event stream; the channel closes when
    /// the turn ends.
    pub fn stream_turn(self: &Arc<Self>, thread_id: String, input: String) -> mpsc::Receiver<AgentEvent> {
        let (rx, _handle) = self.spawn_turn(thread_id, input);
        rx
    }

    /// Runs the turn on its own task. Dropping the receiver or the handle
    /// does not cancel it.
    pub fn spawn_turn(
        self: &Arc<Self>,
        thread_id: String,
        input: String,
    ) -> (
        mpsc::Receiver<AgentEvent>,
        JoinHandle<Result<TurnOutcome, ApiError>>,
    ) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let agent = Arc::clone(self);
        let handle = tokio::spawn(async move { agent.run_turn(&thread_id, &input, &tx).await });
        (rx, handle)
    }

    async fn run_turn_inner(
        &self,
        thread_id: &str,
        input: &str,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Result<TurnOutcome, ApiError> {
        validate_thread_id(thread_id)?;
        if input.trim().is_empty() {
            return Err(ApiError::BadRequest("message cannot be empty".to_string()));
        }

        let lock = self.thread_lock(thread_id);
        let _guard = lock.lock().await;

        let history = self.store.load(thread_id).await?;
        let mut state = AgentState::new(thread_id, history);
        let ctx = NodeContext {
            llm: self.llm.as_ref(),
            tools: self.tools.as_ref(),
            store: self.store.as_ref(),
            events,
            settings: &self.settings,
        };

        let unanswered = state.unanswered_tool_calls();
        if !unanswered.is_empty() {
            warn!(
                "Thread {} has {} unanswered tool call(s) from an interrupted turn",
                thread_id,
                unanswered.len()
            );
            let results = unanswered
                .into_iter()
                .map(|call| ChatMessage::tool(call.id, INTERRUPTED_TOOL_RESULT))
                .collect();
            ctx.commit("resume", &mut state, results).await?;
        }

        ctx.commit("input", &mut state, vec![ChatMessage::user(input)])
            .await?;
        ctx.transition(&mut state, LoopState::AwaitingModel).await;
        self.graph.run(&mut state, &ctx).await?;

        let status = state.status.unwrap_or(TurnStatus::Done);
        info!(
            "Turn on thread {} finished: {:?} after {} model round(s)",
            thread_id, status, state.model_rounds
        );

        ctx.emit(AgentEvent::Done {
            thread_id: thread_id.to_string(),
            status,
            answer: state.answer.clone(),
        })
        .await;

        Ok(TurnOutcome {
            thread_id: state.thread_id,
            status,
            answer: state.answer,
            model_rounds: state.model_rounds,
            messages: state.appended,
        })
    }

    fn thread_lock(&self, thread_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .thread_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Drop locks nobody is holding or waiting on.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}
