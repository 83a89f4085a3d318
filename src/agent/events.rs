use serde::Serialize;

use crate::graph::{LoopState, TurnStatus};
use crate::llm::ChatMessage;

/// What the agent streams to its caller while a turn runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A message was appended to the thread.
    Message {
        #[serde(rename = "threadId")]
        thread_id: String,
        message: ChatMessage,
    },
    /// The loop moved to another state.
    State {
        #[serde(rename = "threadId")]
        thread_id: String,
        state: LoopState,
    },
    /// The turn finished; always the last event of a successful turn.
    Done {
        #[serde(rename = "threadId")]
        thread_id: String,
        status: TurnStatus,
        answer: Option<String>,
    },
    /// The turn failed; history appended before the failure is kept.
    Error {
        #[serde(rename = "threadId")]
        thread_id: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_are_tagged_by_type() {
        let event = AgentEvent::Message {
            thread_id: "t1".to_string(),
            message: ChatMessage::assistant("hi"),
        };
        assert_eq!(
            serde_json::to_value(event).unwrap(),
            json!({
                "type": "message",
                "threadId": "t1",
                "message": { "role": "assistant", "content": "hi" }
            })
        );

        let done = AgentEvent::Done {
            thread_id: "t1".to_string(),
            status: TurnStatus::Done,
            answer: Some("hi".to_string()),
        };
        assert_eq!(serde_json::to_value(done).unwrap()["status"], json!("done"));
    }
}
