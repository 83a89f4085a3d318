// Per-turn state carried through the graph

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::llm::{ChatMessage, ToolCall};

/// Where the agent loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopState {
    AwaitingModel,
    ExecutingTools,
    Done,
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// The model answered without requesting tools.
    Done,
    /// `agent.max_rounds` model calls were made without a final answer.
    MaxRoundsExceeded,
}

#[derive(Debug, Clone)]
pub struct AgentState {
    pub thread_id: String,
    /// Full thread history, including everything appended this turn.
    pub messages: Vec<ChatMessage>,
    /// Messages appended during this turn, in order.
    pub appended: Vec<ChatMessage>,
    pub model_rounds: usize,
    pub loop_state: LoopState,
    pub status: Option<TurnStatus>,
    pub answer: Option<String>,
}

impl AgentState {
    pub fn new(thread_id: impl Into<String>, history: Vec<ChatMessage>) -> Self {
        Self {
            thread_id: thread_id.into(),
            messages: history,
            appended: Vec::new(),
            model_rounds: 0,
            loop_state: LoopState::AwaitingModel,
            status: None,
            answer: None,
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.appended.push(message.clone());
        self.messages.push(message);
    }

    /// Calls requested anywhere in the thread that no tool message answers,
    /// in request order. Left behind when a turn stops mid-round.
    pub fn unanswered_tool_calls(&self) -> Vec<ToolCall> {
        let answered: HashSet<&str> = self
            .messages
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        self.messages
            .iter()
            .filter(|m| m.requests_tools())
            .flat_map(|m| m.tool_calls.iter())
            .filter(|call| !answered.contains(call.id.as_str()))
            .cloned()
            .collect()
    }

    /// Tool calls requested by the latest message, if it is an assistant one.
    pub fn pending_tool_calls(&self) -> Vec<ToolCall> {
        match self.messages.last() {
            Some(last) if last.requests_tools() => last.tool_calls.clone(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pending_calls_come_from_the_last_assistant_message() {
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "search_tool".to_string(),
            arguments: json!({ "query": "rust" }),
        };
        let mut state = AgentState::new("t", vec![ChatMessage::user("hi")]);
        assert!(state.pending_tool_calls().is_empty());

        state.push(ChatMessage::assistant_with_tools("", vec![call.clone()]));
        assert_eq!(state.pending_tool_calls(), vec![call]);
        assert_eq!(state.appended.len(), 1);

        state.push(ChatMessage::tool("call_1", "done"));
        assert!(state.pending_tool_calls().is_empty());
    }

    #[test]
    fn unanswered_calls_skip_answered_ones() {
        let call = |id: &str| ToolCall {
            id: id.to_string(),
            name: "search_tool".to_string(),
            arguments: json!({ "query": "q" }),
        };
        let history = vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant_with_tools("", vec![call("call_1"), call("call_2")]),
            ChatMessage::tool("call_1", "ok"),
        ];
        let state = AgentState::new("t", history);

        let ids: Vec<String> = state.unanswered_tool_calls().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["call_2".to_string()]);
    }

    #[test]
    fn states_serialize_like_the_wire_protocol() {
        assert_eq!(
            serde_json::to_value(LoopState::ExecutingTools).unwrap(),
            json!("EXECUTING_TOOLS")
        );
        assert_eq!(
            serde_json::to_value(TurnStatus::MaxRoundsExceeded).unwrap(),
            json!("max_rounds_exceeded")
        );
    }
}
