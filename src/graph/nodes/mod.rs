// Graph Nodes

pub mod chat;
pub mod tools;

pub use chat::ChatNode;
pub use tools::ToolsNode;

/// Condition label on the chat -> tools edge.
pub const TOOLS_BRANCH: &str = "tools";
