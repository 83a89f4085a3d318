// Graph Builder
// chat --(tools)--> tools --> chat, until chat returns Final

use super::node::GraphError;
use super::nodes::{ChatNode, ToolsNode, TOOLS_BRANCH};
use super::runtime::{GraphBuilder, GraphRuntime};

/// Builds the agent loop graph for at most `max_rounds` model calls.
pub fn build_agent_graph(max_rounds: usize) -> Result<GraphRuntime, GraphError> {
    // max_rounds chat/tools pairs plus the chat step that notices the limit.
    let max_steps = max_rounds.saturating_mul(2).saturating_add(2);

    GraphBuilder::new()
        .entry("chat")
        .max_steps(max_steps)
        .node(Box::new(ChatNode::new()))
        .node(Box::new(ToolsNode::new()))
        .conditional_edge("chat", "tools", TOOLS_BRANCH)
        .edge("tools", "chat")
        .build()
}
