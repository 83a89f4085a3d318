// Agent loop as a StateGraph on petgraph

pub mod builder;
pub mod node;
pub mod runtime;
pub mod state;

pub mod nodes;

pub use builder::build_agent_graph;
pub use node::{GraphError, GraphErrorKind, Node, NodeContext, NodeOutput};
pub use runtime::GraphRuntime;
pub use state::{AgentState, LoopState, TurnStatus};
