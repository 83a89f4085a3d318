// Chat Node
// One model round: system prompt + history + tool declarations -> assistant message

use std::collections::HashSet;

use async_trait::async_trait;
use uuid::Uuid;

use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput};
use crate::graph::state::{AgentState, LoopState, TurnStatus};
use crate::llm::{ChatMessage, ChatRequest, Role};

use super::TOOLS_BRANCH;

pub struct ChatNode;

impl ChatNode {
    pub fn new() -> Self {
        Self
    }

    fn build_request(state: &AgentState, ctx: &NodeContext<'_>) -> ChatRequest {
        let mut messages = Vec::with_capacity(state.messages.len() + 1);
        messages.push(ChatMessage::system(ctx.settings.system_prompt.clone()));
        messages.extend(state.messages.iter().cloned());
        ChatRequest::new(messages).with_tools(ctx.tools.declarations())
    }
}

impl Default for ChatNode {
    fn default() -> Self {
        Self::new()
    }
}

/// Forces the reply into an assistant message whose call ids are unique
/// within the thread so far.
fn normalize_reply(reply: ChatMessage, history: &[ChatMessage]) -> ChatMessage {
    let mut seen: HashSet<String> = history
        .iter()
        .flat_map(|m| m.tool_calls.iter().map(|c| c.id.clone()))
        .collect();

    let tool_calls = reply
        .tool_calls
        .into_iter()
        .map(|mut call| {
            if !seen.insert(call.id.clone()) {
                call.id = format!("call_{}", Uuid::new_v4().simple());
                seen.insert(call.id.clone());
            }
            call
        })
        .collect();

    ChatMessage {
        role: Role::Assistant,
        content: reply.content,
        tool_calls,
        tool_call_id: None,
    }
}

#[async_trait]
impl Node for ChatNode {
    fn id(&self) -> &'static str {
        "chat"
    }

    async fn execute(
        &self,
        state: &mut AgentState,
        ctx: &NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError> {
        if state.model_rounds >= ctx.settings.max_rounds {
            tracing::warn!(
                "Thread {} reached the model round limit ({})",
                state.thread_id,
                ctx.settings.max_rounds
            );
            state.status = Some(TurnStatus::MaxRoundsExceeded);
            ctx.transition(state, LoopState::Done).await;
            return Ok(NodeOutput::Final);
        }

        let request = Self::build_request(state, ctx);
        state.model_rounds += 1;

        let reply = match tokio::time::timeout(ctx.settings.model_timeout, ctx.llm.chat(request))
            .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => return Err(GraphError::model(self.id(), err.to_string())),
            Err(_) => {
                return Err(GraphError::model(
                    self.id(),
                    format!(
                        "model call timed out after {}s",
                        ctx.settings.model_timeout.as_secs_f32()
                    ),
                ))
            }
        };

        let reply = normalize_reply(reply, &state.messages);
        let requests_tools = reply.requests_tools();
        let content = reply.content.clone();
        ctx.commit(self.id(), state, vec![reply]).await?;

        if requests_tools {
            ctx.transition(state, LoopState::ExecutingTools).await;
            return Ok(NodeOutput::Branch(TOOLS_BRANCH.to_string()));
        }

        state.answer = Some(content);
        state.status = Some(TurnStatus::Done);
        ctx.transition(state, LoopState::Done).await;
        Ok(NodeOutput::Final)
    }
}
