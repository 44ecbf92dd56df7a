use std::collections::BTreeMap;
use std::sync::Arc;

use dagwright_graph::nodes::StructuredSupportAgentNode;

/// Versioned nodes keyed by capability domain.
///
/// Owned by one manager; nodes are shared with that manager's graph.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    by_domain: BTreeMap<String, Arc<StructuredSupportAgentNode>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. Returns the previous node for the domain.
    pub fn insert(
        &mut self,
        domain: impl Into<String>,
        node: Arc<StructuredSupportAgentNode>,
    ) -> Option<Arc<StructuredSupportAgentNode>> {
        self.by_domain.insert(domain.into(), node)
    }

    pub fn get(&self, domain: &str) -> Option<&Arc<StructuredSupportAgentNode>> {
        self.by_domain.get(domain)
    }

    /// Domains in sorted order.
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.by_domain.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_domain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_domain.is_empty()
    }
}
