use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::json;
use tracing::{debug, info, warn};

use dagwright_core::error::{DagwrightError, Result};
use dagwright_core::traits::Capability;
use dagwright_core::types::{ContextMap, GraphEvent, RunId};
use dagwright_core::version::{NodeVersion, UpgradePolicy};
use dagwright_graph::manager::{branches_for, title_case};
use dagwright_graph::nodes::{DelegationRuleSet, StructuredRouterNode, StructuredSupportAgentNode};
use dagwright_graph::{Graph, GraphComponents, GraphNode, NodeInfo, SharedState};

use crate::audit::{AuditSnapshot, NodeStatus, RejectReason, UpgradeOutcome, UpgradeValidation};
use crate::registry::NodeRegistry;

pub const STRUCTURED_ROUTER_ID: &str = "structured_router";

/// Node id for a capability domain.
pub fn agent_id(domain: &str) -> String {
    format!("{domain}_agent")
}

/// Owns a graph of versioned capability nodes and the domain registry that
/// points into it.
///
/// Upgrades and rollbacks hold the registry write lock for their whole
/// check-then-replace sequence, so two of them never interleave. The graph
/// swaps its compiled plan atomically; runs already in flight finish on the
/// plan they started with.
pub struct VersionedGraphManager {
    graph: Arc<Graph>,
    registry: RwLock<NodeRegistry>,
    delegation_hash: String,
    dag_version: String,
}

impl VersionedGraphManager {
    /// Build prompt → (data source) → structured router → one
    /// `{domain}_agent` node per skill, every agent at 1.0.0 under `policy`.
    ///
    /// Services and tools are not versioned and are ignored here, as are the
    /// extra `routing` rules: delegation comes only from the skills themselves.
    /// Two skills with the same domain are a configuration error.
    pub fn build(
        components: &GraphComponents,
        policy: UpgradePolicy,
        dag_version: impl Into<String>,
    ) -> Result<Self> {
        let mut capabilities: BTreeMap<String, Arc<dyn Capability>> = BTreeMap::new();
        for skill in &components.skills {
            let domain = skill.domain().to_string();
            if capabilities.insert(domain.clone(), Arc::clone(skill)).is_some() {
                return Err(DagwrightError::Config(format!(
                    "capability domain '{domain}' registered twice"
                )));
            }
        }

        let graph = components.empty_graph();
        let before_router = components.add_intake(&graph)?;

        let rules = DelegationRuleSet::from_capabilities(capabilities.values(), agent_id);
        let router = StructuredRouterNode::new(
            NodeInfo::new(STRUCTURED_ROUTER_ID, "Structured Router")
                .with_description("Deterministic router with hash-based delegation"),
            rules,
        )?;
        let delegation_hash = router.delegation_hash().to_string();
        let targets: Vec<String> = router
            .rules()
            .targets()
            .into_iter()
            .map(String::from)
            .collect();
        graph.add_node(router)?;
        graph.add_edge(before_router, STRUCTURED_ROUTER_ID)?;

        let mut registry = NodeRegistry::new();
        for (domain, capability) in &capabilities {
            let description = match capability.description() {
                "" => format!("Structured support agent for {domain}"),
                d => d.to_string(),
            };
            let node = Arc::new(StructuredSupportAgentNode::new(
                NodeInfo::new(agent_id(domain), format!("{} Agent", title_case(domain)))
                    .with_description(description),
                Arc::clone(capability),
                NodeVersion::INITIAL,
                policy,
            )?);
            graph.add_node(GraphNode::StructuredAgent(Arc::clone(&node)))?;
            registry.insert(domain.clone(), node);
        }

        let target_refs: Vec<&str> = targets.iter().map(String::as_str).collect();
        let branches = branches_for(&graph, &target_refs)?;
        if !branches.is_empty() {
            graph.add_conditional_edge(STRUCTURED_ROUTER_ID, branches)?;
        }

        info!(
            graph = %graph.name(),
            agents = registry.len(),
            delegation_hash = %delegation_hash,
            policy = %policy,
            "Versioned graph created"
        );

        Ok(Self {
            graph: Arc::new(graph),
            registry: RwLock::new(registry),
            delegation_hash,
            dag_version: dag_version.into(),
        })
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn delegation_hash(&self) -> &str {
        &self.delegation_hash
    }

    pub fn dag_version(&self) -> &str {
        &self.dag_version
    }

    fn registry(&self) -> Result<RwLockReadGuard<'_, NodeRegistry>> {
        self.registry.read().map_err(|_| DagwrightError::LockPoisoned)
    }

    fn registry_mut(&self) -> Result<RwLockWriteGuard<'_, NodeRegistry>> {
        self.registry.write().map_err(|_| DagwrightError::LockPoisoned)
    }

    /// Registered domains in sorted order.
    pub fn domains(&self) -> Result<Vec<String>> {
        Ok(self.registry()?.domains().map(String::from).collect())
    }

    pub fn node(&self, domain: &str) -> Result<Option<Arc<StructuredSupportAgentNode>>> {
        Ok(self.registry()?.get(domain).cloned())
    }

    // -- Upgrade / rollback ---------------------------------------------

    /// Replace the node for `domain` with `capability` at `version`.
    ///
    /// Unless `force` is set the node's upgrade policy must allow the move.
    /// Every check runs before the graph is touched, so a rejected upgrade
    /// leaves graph and registry exactly as they were.
    pub fn upgrade_node(
        &self,
        domain: &str,
        capability: Arc<dyn Capability>,
        version: NodeVersion,
        force: bool,
    ) -> Result<UpgradeOutcome> {
        let mut registry = self.registry_mut()?;
        let Some(current) = registry.get(domain).cloned() else {
            return Ok(reject(domain, RejectReason::DomainNotFound {
                domain: domain.to_string(),
            }));
        };
        if capability.domain() != domain {
            return Ok(reject(domain, RejectReason::DomainMismatch {
                expected: domain.to_string(),
                found: capability.domain().to_string(),
            }));
        }

        let versioned = current.versioned();
        let from = versioned.version();
        if !force {
            let decision = versioned.upgrade_decision(&version);
            if !decision.allowed {
                return Ok(reject(domain, RejectReason::PolicyViolation {
                    message: decision.reason,
                }));
            }
        } else if !versioned.can_upgrade_to(&version) {
            warn!(domain, from = %from, to = %version, "Forcing upgrade past policy");
        }

        let replacement = Arc::new(current.upgraded(capability, version)?);
        let outcome = self.install(&mut registry, domain, replacement)?;
        if let UpgradeOutcome::Applied { node_id, node_hash, .. } = &outcome {
            info!(domain, node_id = %node_id, from = %from, to = %version, node_hash = %node_hash, "Node upgraded");
            self.publish(GraphEvent::NodeUpgraded {
                node_id: node_id.clone(),
                from: from.to_string(),
                to: version.to_string(),
                node_hash: node_hash.clone(),
            });
        }
        Ok(outcome)
    }

    /// Replace the node for `domain` with the same capability at an older
    /// (or equal) `version`. The upgrade policy is not consulted.
    pub fn rollback_node(&self, domain: &str, version: NodeVersion) -> Result<UpgradeOutcome> {
        let mut registry = self.registry_mut()?;
        let Some(current) = registry.get(domain).cloned() else {
            return Ok(reject(domain, RejectReason::DomainNotFound {
                domain: domain.to_string(),
            }));
        };
        let from = current.versioned().version();
        if version.newer_than(&from) {
            return Ok(reject(domain, RejectReason::NotARollback {
                current: from,
                target: version,
            }));
        }

        let replacement = Arc::new(current.rolled_back(version)?);
        let outcome = self.install(&mut registry, domain, replacement)?;
        if let UpgradeOutcome::Applied { node_id, node_hash, .. } = &outcome {
            info!(domain, node_id = %node_id, from = %from, to = %version, node_hash = %node_hash, "Node rolled back");
            self.publish(GraphEvent::NodeRolledBack {
                node_id: node_id.clone(),
                from: from.to_string(),
                to: version.to_string(),
                node_hash: node_hash.clone(),
            });
        }
        Ok(outcome)
    }

    /// Swap `replacement` into the graph, then into the registry.
    fn install(
        &self,
        registry: &mut NodeRegistry,
        domain: &str,
        replacement: Arc<StructuredSupportAgentNode>,
    ) -> Result<UpgradeOutcome> {
        let previous = self
            .graph
            .replace_node(GraphNode::StructuredAgent(Arc::clone(&replacement)))?;
        debug!(domain, replaced = %previous.id(), "Graph node replaced");

        let versioned = replacement.versioned();
        let outcome = UpgradeOutcome::Applied {
            node_id: versioned.id().to_string(),
            from: previous
                .as_structured_agent()
                .map(|n| n.versioned().version())
                .unwrap_or(versioned.version()),
            to: versioned.version(),
            node_hash: versioned.node_hash().to_string(),
        };
        registry.insert(domain, replacement);
        Ok(outcome)
    }

    /// Pre-flight an upgrade without changing anything.
    pub fn validate_upgrade(&self, domain: &str, version: NodeVersion) -> Result<UpgradeValidation> {
        let registry = self.registry()?;
        let Some(node) = registry.get(domain) else {
            return Ok(UpgradeValidation::not_found());
        };
        let versioned = node.versioned();
        let decision = versioned.upgrade_decision(&version);
        Ok(UpgradeValidation {
            valid: decision.allowed,
            reason: decision.reason,
            current_version: Some(versioned.version()),
            target_version: Some(version),
            upgrade_policy: Some(versioned.policy()),
        })
    }

    fn publish(&self, event: GraphEvent) {
        if let Some(bus) = self.graph.events() {
            bus.publish(event);
        }
    }

    // -- Status / export ------------------------------------------------

    /// Deterministic snapshot of the graph and every versioned node in it.
    pub fn get_status(&self) -> Result<AuditSnapshot> {
        let mut structured_nodes = BTreeMap::new();
        let nodes = self.graph.nodes()?;
        for node in &nodes {
            match node {
                GraphNode::StructuredAgent(agent) => {
                    let v = agent.versioned();
                    structured_nodes.insert(
                        v.id().to_string(),
                        NodeStatus {
                            name: v.info().name.clone(),
                            domain: v.domain().to_string(),
                            version: v.version(),
                            node_hash: v.node_hash().to_string(),
                            upgrade_policy: v.policy(),
                        },
                    );
                }
                GraphNode::Prompt(_)
                | GraphNode::Router(_)
                | GraphNode::DataSource(_)
                | GraphNode::Capability(_)
                | GraphNode::StructuredRouter(_)
                | GraphNode::Custom(_) => {}
            }
        }

        Ok(AuditSnapshot {
            dag_name: self.graph.name().to_string(),
            dag_version: self.dag_version.clone(),
            total_nodes: nodes.len(),
            structured_nodes,
            delegation_hash: self.delegation_hash.clone(),
            edges: self.graph.edges()?,
            conditional_edges: self.graph.conditional_edges()?.into_keys().collect(),
        })
    }

    /// Status for a single domain, `None` when it is not registered.
    pub fn node_status(&self, domain: &str) -> Result<Option<NodeStatus>> {
        let registry = self.registry()?;
        Ok(registry.get(domain).map(|node| {
            let v = node.versioned();
            NodeStatus {
                name: v.info().name.clone(),
                domain: v.domain().to_string(),
                version: v.version(),
                node_hash: v.node_hash().to_string(),
                upgrade_policy: v.policy(),
            }
        }))
    }

    /// Canonical JSON of [`get_status`](Self::get_status).
    pub fn export_for_audit(&self) -> Result<String> {
        self.get_status()?.to_canonical_json()
    }

    // -- Execution ------------------------------------------------------

    pub async fn execute(&self, query: &str, context: ContextMap) -> Result<SharedState> {
        self.execute_run(&RunId::new(), query, context).await
    }

    pub async fn execute_run(
        &self,
        run_id: &RunId,
        query: &str,
        context: ContextMap,
    ) -> Result<SharedState> {
        let state = SharedState::new(query)
            .with_context(context)
            .with_metadata("dag_name", json!(self.graph.name()))
            .with_metadata("dag_version", json!(self.dag_version))
            .with_metadata("delegation_hash", json!(self.delegation_hash));
        self.graph.execute_run(run_id, state).await
    }
}

fn reject(domain: &str, reason: RejectReason) -> UpgradeOutcome {
    warn!(domain, reason = %reason, "Node replacement rejected");
    UpgradeOutcome::Rejected { reason }
}
