// Tools Node
// Runs every call requested by the last assistant message concurrently

use async_trait::async_trait;
use futures_util::future::join_all;

use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput};
use crate::graph::state::{AgentState, LoopState};

pub struct ToolsNode;

impl ToolsNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ToolsNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for ToolsNode {
    fn id(&self) -> &'static str {
        "tools"
    }

    async fn execute(
        &self,
        state: &mut AgentState,
        ctx: &NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError> {
        let calls = state.pending_tool_calls();
        tracing::debug!(
            "Executing {} tool call(s) for thread {}",
            calls.len(),
            state.thread_id
        );

        // join_all keeps request order regardless of completion order.
        let results = join_all(
            calls
                .iter()
                .map(|call| ctx.tools.execute(call, ctx.settings.tool_timeout)),
        )
        .await;

        ctx.commit(self.id(), state, results).await?;
        ctx.transition(state, LoopState::AwaitingModel).await;
        Ok(NodeOutput::Continue)
    }
}
