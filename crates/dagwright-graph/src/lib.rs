//! Graph runtime: a directed graph of typed nodes sharing one state record.
//!
//! A `Graph` owns nodes, plain edges and conditional edges. Every structural
//! mutation recompiles an `ExecutionPlan` and swaps it in atomically; each
//! `execute` call walks its own snapshot of that plan from the first-added
//! node, threading a `SharedState` through every node it visits. Routers
//! choose conditional branches by writing `context["next_node"]`.

pub mod edge;
pub mod graph;
pub mod manager;
pub mod node;
pub mod nodes;
pub mod plan;
pub mod prompt_library;
pub mod proposal;
pub mod state;

pub use edge::{ConditionalEdge, Edge};
pub use graph::Graph;
pub use manager::{GraphComponents, GraphManager};
pub use node::{GraphNode, Node, NodeInfo};
pub use plan::ExecutionPlan;
pub use prompt_library::PromptLibrary;
pub use proposal::GraphProposal;
pub use state::{SharedState, StepMessage};
