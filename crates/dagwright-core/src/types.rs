use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form key/value map threaded between nodes and capability units.
pub type ContextMap = serde_json::Map<String, serde_json::Value>;

/// Identifier for a single graph invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type tag carried by every graph node.
///
/// The serialized form is the tag used in node hashes, so renaming a
/// variant changes every hash computed for nodes of that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Prompt,
    Router,
    DataSource,
    Skill,
    Service,
    Tool,
    StructuredRouter,
    StructuredSupportAgent,
    Custom,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Router => "router",
            Self::DataSource => "data_source",
            Self::Skill => "skill",
            Self::Service => "service",
            Self::Tool => "tool",
            Self::StructuredRouter => "structured_router",
            Self::StructuredSupportAgent => "structured_support_agent",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named prompt template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub name: String,
    pub template: String,
    #[serde(default)]
    pub input_variables: Vec<String>,
}

impl Prompt {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            input_variables: Vec::new(),
        }
    }
}

/// A document returned by a searchable data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: ContextMap,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: ContextMap::new(),
        }
    }
}

/// Events emitted while graphs are built, executed and upgraded.
#[derive(Debug, Clone)]
pub enum GraphEvent {
    /// Graph walk started.
    RunStarted { run_id: RunId, entry: String },
    /// A node is about to execute.
    NodeEntered { run_id: RunId, node_id: String, step: usize },
    /// A node finished executing.
    NodeCompleted { run_id: RunId, node_id: String },
    /// A capability failed inside a node; the walk continued.
    NodeFailed { run_id: RunId, node_id: String, error: String },
    /// Graph walk completed.
    RunCompleted { run_id: RunId, steps: usize },
    /// The orchestrator served a query without the graph.
    Degraded { run_id: RunId, error: String },
    /// A versioned node was replaced with a newer version.
    NodeUpgraded { node_id: String, from: String, to: String, node_hash: String },
    /// A versioned node was replaced with an older version.
    NodeRolledBack { node_id: String, from: String, to: String, node_hash: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_kind_serializes_as_tag() {
        let tag = serde_json::to_value(NodeKind::StructuredSupportAgent).unwrap();
        assert_eq!(tag, "structured_support_agent");
        assert_eq!(NodeKind::DataSource.to_string(), "data_source");
    }

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }
}
