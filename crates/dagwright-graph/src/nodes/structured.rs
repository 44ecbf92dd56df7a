use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::{info, warn};

use dagwright_core::error::Result;
use dagwright_core::hash::digest16;
use dagwright_core::traits::{validate_architecture, Capability};
use dagwright_core::types::{ContextMap, NodeKind};
use dagwright_core::version::{NodeVersion, PolicyDecision, UpgradePolicy};

use crate::node::{Node, NodeInfo};
use crate::state::SharedState;

/// Characters of a result quoted in the execution message.
const MESSAGE_PREVIEW_CHARS: usize = 100;

/// A capability unit pinned to a version and an upgrade policy.
///
/// `node_hash` is computed once from `(id, type tag, version, domain,
/// architecture)`. Changing any of those means building a new node.
#[derive(Clone)]
pub struct VersionedNode {
    info: NodeInfo,
    kind: NodeKind,
    capability: Arc<dyn Capability>,
    version: NodeVersion,
    policy: UpgradePolicy,
    node_hash: String,
}

impl VersionedNode {
    /// Fails when the capability's architecture lacks a required section.
    pub fn new(
        info: NodeInfo,
        kind: NodeKind,
        capability: Arc<dyn Capability>,
        version: NodeVersion,
        policy: UpgradePolicy,
    ) -> Result<Self> {
        validate_architecture(capability.as_ref())?;
        let node_hash = compute_node_hash(&info.id, kind, &version, capability.as_ref())?;
        Ok(Self {
            info,
            kind,
            capability,
            version,
            policy,
            node_hash,
        })
    }

    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn capability(&self) -> &Arc<dyn Capability> {
        &self.capability
    }

    pub fn domain(&self) -> &str {
        self.capability.domain()
    }

    pub fn version(&self) -> NodeVersion {
        self.version
    }

    pub fn policy(&self) -> UpgradePolicy {
        self.policy
    }

    pub fn node_hash(&self) -> &str {
        &self.node_hash
    }

    pub fn can_upgrade_to(&self, target: &NodeVersion) -> bool {
        self.policy.can_upgrade(&self.version, target)
    }

    pub fn upgrade_decision(&self, target: &NodeVersion) -> PolicyDecision {
        self.policy.evaluate(&self.version, target)
    }

    /// Replacement node with the same id, name and policy. The description
    /// follows the new capability.
    pub fn with_capability(
        &self,
        capability: Arc<dyn Capability>,
        version: NodeVersion,
    ) -> Result<Self> {
        let mut info = self.info.clone();
        let description = capability.description();
        info.description = (!description.is_empty()).then(|| description.to_string());
        Self::new(info, self.kind, capability, version, self.policy)
    }

    /// Replacement node at `version` keeping everything else.
    pub fn at_version(&self, version: NodeVersion) -> Result<Self> {
        Self::new(
            self.info.clone(),
            self.kind,
            Arc::clone(&self.capability),
            version,
            self.policy,
        )
    }
}

fn compute_node_hash(
    id: &str,
    kind: NodeKind,
    version: &NodeVersion,
    capability: &dyn Capability,
) -> Result<String> {
    digest16(&json!({
        "node_id": id,
        "node_type": kind.as_str(),
        "version": version.to_string(),
        "domain": capability.domain(),
        "architecture": capability.architecture(),
    }))
}

/// Graph node running a versioned capability through its two-phase
/// `analyze` → `perform` protocol.
#[derive(Clone)]
pub struct StructuredSupportAgentNode {
    inner: VersionedNode,
}

impl StructuredSupportAgentNode {
    pub fn new(
        info: NodeInfo,
        capability: Arc<dyn Capability>,
        version: NodeVersion,
        policy: UpgradePolicy,
    ) -> Result<Self> {
        let inner = VersionedNode::new(
            info,
            NodeKind::StructuredSupportAgent,
            capability,
            version,
            policy,
        )?;
        Ok(Self { inner })
    }

    pub fn versioned(&self) -> &VersionedNode {
        &self.inner
    }

    pub fn upgraded(&self, capability: Arc<dyn Capability>, version: NodeVersion) -> Result<Self> {
        Ok(Self {
            inner: self.inner.with_capability(capability, version)?,
        })
    }

    pub fn rolled_back(&self, version: NodeVersion) -> Result<Self> {
        Ok(Self {
            inner: self.inner.at_version(version)?,
        })
    }

    async fn run(&self, state: &mut SharedState) -> Result<Value> {
        let node = &self.inner;
        state.context.insert("node_version".into(), json!(node.version.to_string()));
        state.context.insert("node_id".into(), json!(node.info.id));
        state.context.insert("node_hash".into(), json!(node.node_hash));

        let enriched = node
            .capability
            .analyze(&state.current_query, state.context.clone())
            .await?;
        node.capability.perform(enriched).await
    }
}

impl Node for StructuredSupportAgentNode {
    fn info(&self) -> &NodeInfo {
        &self.inner.info
    }

    fn kind(&self) -> NodeKind {
        self.inner.kind
    }

    fn execute<'a>(&'a self, state: &'a mut SharedState) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let node = &self.inner;
            match self.run(state).await {
                Ok(result) => {
                    let rendered = match &result {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    let preview: String = rendered.chars().take(MESSAGE_PREVIEW_CHARS).collect();
                    info!(
                        node_id = %node.info.id,
                        version = %node.version,
                        node_hash = %node.node_hash,
                        "Structured agent executed"
                    );
                    state.set_result(&node.info.id, result);
                    state.push_message(
                        &node.info.id,
                        format!(
                            "Structured agent {} v{} executed: {preview}...",
                            node.info.name, node.version
                        ),
                    );
                }
                Err(e) => {
                    warn!(node_id = %node.info.id, version = %node.version, error = %e, "Structured agent failed");
                    state.record_failure(&node.info.id, &e);
                }
            }
            state.metadata.insert(
                format!("{}_execution", node.info.id),
                json!({
                    "version": node.version.to_string(),
                    "domain": node.domain(),
                    "architecture": node.capability.architecture(),
                    "node_hash": node.node_hash,
                }),
            );
            Ok(())
        })
    }

    fn config(&self) -> ContextMap {
        let node = &self.inner;
        let mut map = ContextMap::new();
        map.insert("version".into(), json!(node.version.to_string()));
        map.insert("upgrade_policy".into(), json!(node.policy.as_str()));
        map.insert("node_hash".into(), json!(node.node_hash));
        map.insert(
            "support_agent_config".into(),
            json!({
                "domain": node.domain(),
                "architecture": node.capability.architecture(),
                "delegation_keywords": node.capability.delegation_keywords(),
                "task_patterns": node.capability.task_patterns(),
            }),
        );
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagwright_test_utils::{governance, MockCapability};

    fn agent(version: &str) -> StructuredSupportAgentNode {
        StructuredSupportAgentNode::new(
            NodeInfo::new("governance_agent", "Governance Agent"),
            governance().shared(),
            version.parse().unwrap(),
            UpgradePolicy::Compatible,
        )
        .unwrap()
    }

    #[test]
    fn hash_is_pure_function_of_content() {
        let a = agent("1.0.0");
        let b = agent("1.0.0");
        assert_eq!(a.versioned().node_hash(), b.versioned().node_hash());
        assert_eq!(a.versioned().node_hash().len(), 16);

        let newer = a.rolled_back("1.1.0".parse().unwrap()).unwrap();
        assert_ne!(newer.versioned().node_hash(), a.versioned().node_hash());
        let back = newer.rolled_back("1.0.0".parse().unwrap()).unwrap();
        assert_eq!(back.versioned().node_hash(), a.versioned().node_hash());
    }

    #[test]
    fn architecture_change_changes_hash() {
        let a = agent("1.0.0");
        let changed = a
            .upgraded(
                MockCapability::new("governance")
                    .architecture_entry("capabilities", &["vote_tally"])
                    .shared(),
                "1.0.0".parse().unwrap(),
            )
            .unwrap();
        assert_ne!(changed.versioned().node_hash(), a.versioned().node_hash());
    }

    #[test]
    fn missing_architecture_section_is_config_error() {
        let result = StructuredSupportAgentNode::new(
            NodeInfo::new("x_agent", "X"),
            MockCapability::new("x").without_section("decision_points").shared(),
            NodeVersion::INITIAL,
            UpgradePolicy::Compatible,
        );
        let err = result.err().unwrap().to_string();
        assert!(err.contains("decision_points"));
    }

    #[tokio::test]
    async fn execute_runs_two_phase_protocol() {
        let node = agent("1.0.0");
        let mut state = SharedState::new("analyze governance proposal");
        node.execute(&mut state).await.unwrap();

        assert_eq!(state.context_str("node_version"), Some("1.0.0"));
        assert_eq!(state.context_str("node_id"), Some("governance_agent"));
        assert_eq!(
            state.results["governance_agent"],
            "governance handled: analyze governance proposal"
        );
        let meta = &state.metadata["governance_agent_execution"];
        assert_eq!(meta["version"], "1.0.0");
        assert_eq!(meta["domain"], "governance");
        assert_eq!(meta["node_hash"], node.versioned().node_hash());
        assert!(state.messages[0]
            .content
            .starts_with("Structured agent Governance Agent v1.0.0 executed: governance handled"));
    }

    #[tokio::test]
    async fn perform_failure_is_isolated() {
        let node = StructuredSupportAgentNode::new(
            NodeInfo::new("trading_agent", "Trading Agent"),
            MockCapability::new("trading").failing("slippage").shared(),
            NodeVersion::INITIAL,
            UpgradePolicy::Any,
        )
        .unwrap();
        let mut state = SharedState::new("swap");
        node.execute(&mut state).await.unwrap();
        assert!(state.failed("trading_agent"));
        assert!(state.metadata.contains_key("trading_agent_execution"));
    }

    #[test]
    fn describe_exposes_version_fields() {
        let config = agent("1.2.3").describe();
        assert_eq!(config["node_type"], "structured_support_agent");
        assert_eq!(config["version"], "1.2.3");
        assert_eq!(config["upgrade_policy"], "compatible");
        assert_eq!(config["support_agent_config"]["domain"], "governance");
    }
}
