use serde::{Deserialize, Serialize};
use tracing::info;

use dagwright_core::error::{DagwrightError, Result};

use crate::edge::Edge;
use crate::graph::Graph;

/// A reviewed change to a graph's structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphProposal {
    pub proposal_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub remove_nodes: Vec<String>,
    #[serde(default)]
    pub add_edges: Vec<Edge>,
    #[serde(default)]
    pub remove_edges: Vec<Edge>,
}

impl GraphProposal {
    pub fn new(proposal_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            proposal_id: proposal_id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.remove_nodes.is_empty() && self.add_edges.is_empty() && self.remove_edges.is_empty()
    }

    /// Check the proposal against `graph` without changing it: added edges
    /// must connect nodes that exist after the removals.
    pub fn validate(&self, graph: &Graph) -> Result<()> {
        for edge in &self.add_edges {
            for end in [&edge.from, &edge.to] {
                if self.remove_nodes.contains(end) || !graph.contains(end)? {
                    return Err(DagwrightError::InvalidGraph(format!(
                        "proposal {} adds edge {} -> {} to missing node '{end}'",
                        self.proposal_id, edge.from, edge.to
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validate, then remove nodes, add edges and remove edges in that order.
    pub fn apply_to(&self, graph: &Graph) -> Result<()> {
        self.validate(graph)?;
        for id in &self.remove_nodes {
            graph.remove_node(id)?;
        }
        for edge in &self.add_edges {
            graph.add_edge(edge.from.clone(), edge.to.clone())?;
        }
        for edge in &self.remove_edges {
            graph.remove_edge(&edge.from, &edge.to)?;
        }
        info!(
            proposal = %self.proposal_id,
            removed_nodes = self.remove_nodes.len(),
            added_edges = self.add_edges.len(),
            removed_edges = self.remove_edges.len(),
            "Applied graph proposal"
        );
        Ok(())
    }
}
