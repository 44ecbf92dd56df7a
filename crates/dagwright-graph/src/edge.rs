use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Unconditional transition between two nodes.
///
/// Serializes as a `[from, to]` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct Edge {
    pub from: String,
    pub to: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.from == node_id || self.to == node_id
    }
}

impl From<(String, String)> for Edge {
    fn from((from, to): (String, String)) -> Self {
        Self { from, to }
    }
}

impl From<Edge> for (String, String) {
    fn from(edge: Edge) -> Self {
        (edge.from, edge.to)
    }
}

/// Branches out of a router node: branch key → destination node id.
///
/// The branch key is the value the router wrote into `context["next_node"]`.
/// A key with no branch ends the walk.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConditionalEdge {
    pub source: String,
    pub branches: BTreeMap<String, String>,
}

impl ConditionalEdge {
    pub fn new(source: impl Into<String>, branches: BTreeMap<String, String>) -> Self {
        Self {
            source: source.into(),
            branches,
        }
    }

    /// Destination for `key`, if any.
    pub fn target(&self, key: &str) -> Option<&str> {
        self.branches.get(key).map(String::as_str)
    }

    /// Drop every branch that leads to `node_id`.
    pub fn forget_target(&mut self, node_id: &str) {
        self.branches.retain(|_, to| to != node_id);
    }
}
