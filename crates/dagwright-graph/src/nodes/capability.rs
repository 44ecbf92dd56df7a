use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;
use tracing::{debug, warn};

use dagwright_core::error::{DagwrightError, Result};
use dagwright_core::traits::Capability;
use dagwright_core::types::{ContextMap, NodeKind};

use crate::node::{Node, NodeInfo};
use crate::state::SharedState;

/// Skill, service or tool node: hands the accumulated context to a
/// capability unit and records whatever it returns.
pub struct CapabilityNode {
    info: NodeInfo,
    kind: NodeKind,
    capability: Arc<dyn Capability>,
}

impl CapabilityNode {
    /// `kind` must be one of `Skill`, `Service` or `Tool`.
    pub fn new(info: NodeInfo, kind: NodeKind, capability: Arc<dyn Capability>) -> Result<Self> {
        if !matches!(kind, NodeKind::Skill | NodeKind::Service | NodeKind::Tool) {
            return Err(DagwrightError::InvalidGraph(format!(
                "capability node '{}' cannot have kind '{kind}'",
                info.id
            )));
        }
        Ok(Self {
            info,
            kind,
            capability,
        })
    }

    pub fn skill(info: NodeInfo, capability: Arc<dyn Capability>) -> Self {
        Self {
            info,
            kind: NodeKind::Skill,
            capability,
        }
    }

    pub fn service(info: NodeInfo, capability: Arc<dyn Capability>) -> Self {
        Self {
            info,
            kind: NodeKind::Service,
            capability,
        }
    }

    pub fn tool(info: NodeInfo, capability: Arc<dyn Capability>) -> Self {
        Self {
            info,
            kind: NodeKind::Tool,
            capability,
        }
    }

    pub fn capability(&self) -> &Arc<dyn Capability> {
        &self.capability
    }

    fn label(&self) -> &'static str {
        match self.kind {
            NodeKind::Service => "Service",
            NodeKind::Tool => "Tool",
            _ => "Skill",
        }
    }
}

impl Node for CapabilityNode {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn execute<'a>(&'a self, state: &'a mut SharedState) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut ctx = state.context.clone();
            ctx.entry("query")
                .or_insert_with(|| json!(state.current_query));

            match self.capability.perform(ctx).await {
                Ok(result) => {
                    debug!(node_id = %self.info.id, domain = %self.capability.domain(), "Capability executed");
                    state.set_result(&self.info.id, result);
                    state.push_message(
                        &self.info.id,
                        format!("{} {} executed", self.label(), self.info.name),
                    );
                }
                Err(e) => {
                    warn!(node_id = %self.info.id, error = %e, "Capability failed");
                    state.record_failure(&self.info.id, &e);
                }
            }
            Ok(())
        })
    }

    fn config(&self) -> ContextMap {
        let mut map = ContextMap::new();
        map.insert("domain".into(), json!(self.capability.domain()));
        map.insert(
            "delegation_keywords".into(),
            json!(self.capability.delegation_keywords()),
        );
        map
    }
}
